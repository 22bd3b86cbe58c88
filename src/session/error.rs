//! # 会话错误模型

use crate::palette::PaletteError;

use super::SwatchTarget;

/// 会话命令执行失败的原因。失败的命令不会修改会话。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("尚未加载图片")]
    NoImageLoaded,

    #[error("坐标越界：({x}, {y}) 不在 {width}x{height} 范围内")]
    CoordinateOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    #[error("色块不存在：{target} 第 {index} 项（共 {len} 项）")]
    SwatchOutOfRange {
        target: SwatchTarget,
        index: usize,
        len: usize,
    },

    #[error(transparent)]
    Palette(#[from] PaletteError),

    #[error("会话状态不可用：{0}")]
    Unavailable(String),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoImageLoaded => "E_NO_IMAGE",
            Self::CoordinateOutOfBounds { .. } => "E_COORDINATE_OUT_OF_BOUNDS",
            Self::SwatchOutOfRange { .. } => "E_SWATCH_OUT_OF_RANGE",
            Self::Palette(inner) => inner.code(),
            Self::Unavailable(_) => "E_SESSION_UNAVAILABLE",
        }
    }
}
