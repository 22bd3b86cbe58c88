//! # 会话命令与结果

use std::fmt;
use std::sync::Arc;

use image::Rgb;
use serde::Serialize;

use crate::image_handler::RasterImage;
use crate::palette::{PaletteOptions, Swatch};

/// 图片像素坐标，要求 `0 <= x < width`、`0 <= y < height`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Coordinate {
    pub x: u32,
    pub y: u32,
}

impl Coordinate {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// 可编辑的色块列表。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwatchTarget {
    /// 主色调色板
    Palette,
    /// 用户取色列表
    Picked,
}

impl fmt::Display for SwatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Palette => f.write_str("palette"),
            Self::Picked => f.write_str("picked"),
        }
    }
}

/// 驱动会话状态机的离散命令。
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// 载入新图片；与当前图片内容相同时不做任何事。
    ///
    /// 判断只看像素。同一张图换个来源重新载入（例如先 data URI 后上传文件）
    /// 同样是空操作，元数据中的 `Filename` 与 `Image Format` 仍是第一次载入时的值。
    LoadImage {
        raster: Arc<RasterImage>,
        options: PaletteOptions,
    },
    /// 在坐标处取色；与上一次处理的坐标相同时不做任何事。
    PickPixel(Coordinate),
    /// 替换某个色块的颜色，不会触发重新聚类。
    EditSwatch {
        target: SwatchTarget,
        index: usize,
        color: Rgb<u8>,
    },
    /// 丢弃当前会话。
    Reset,
}

/// 命令执行结果，供前端决定是否需要刷新。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// 新图片已载入，样本与主色已重新计算。
    Loaded,
    /// 命令是重复触发，会话未变化。
    Unchanged,
    /// 已追加一个取色结果。
    Picked { color: Swatch },
    /// 色块已编辑；`refresh` 为真表示颜色确实变化、需要重新渲染。
    SwatchEdited { refresh: bool },
    /// 会话已清空。
    Reset,
}
