//! # 会话渲染视图
//!
//! 前端（CLI 或其他界面）只读取这个结构，不直接接触会话内部。

use serde::Serialize;

use crate::image_handler::ImageMetadata;
use crate::palette::Swatch;

use super::{Coordinate, Phase, Session};

/// 可序列化的会话快照。
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub state: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ImageMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct_colors: Option<usize>,
    pub palette: Vec<Swatch>,
    pub picked: Vec<Swatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_coordinate: Option<Coordinate>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        let Some(active) = session.active() else {
            return Self {
                state: session.phase(),
                metadata: None,
                distinct_colors: None,
                palette: Vec::new(),
                picked: Vec::new(),
                last_coordinate: None,
            };
        };

        Self {
            state: session.phase(),
            metadata: Some(active.metadata().clone()),
            distinct_colors: Some(active.samples().distinct()),
            palette: active.palette().colors().iter().copied().map(Swatch::from).collect(),
            picked: active.picked().iter().copied().map(Swatch::from).collect(),
            last_coordinate: active.last_coordinate(),
        }
    }
}

impl Session {
    pub fn view(&self) -> SessionView {
        SessionView::from(self)
    }
}
