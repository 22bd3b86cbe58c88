//! # 调色板错误模型

/// 调色板与颜色解析错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaletteError {
    /// 不同颜色数少于请求的聚类数（严格策略），或根本没有像素。
    #[error("颜色数量不足：仅有 {distinct} 种不同颜色，无法聚成 {requested} 类")]
    InsufficientData { distinct: usize, requested: usize },

    /// 颜色字符串不是 `#RRGGBB`。
    #[error("颜色格式错误：{0}")]
    ColorParse(String),
}

impl PaletteError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "E_INSUFFICIENT_DATA",
            Self::ColorParse(_) => "E_COLOR_PARSE",
        }
    }
}
