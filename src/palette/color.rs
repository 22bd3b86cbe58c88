//! # 颜色表示与十六进制转换

use image::Rgb;
use serde::Serialize;

use super::PaletteError;

/// 输出给前端的色块：同时给出 RGB 与十六进制表示。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Swatch {
    pub rgb: [u8; 3],
    pub hex: String,
}

impl From<Rgb<u8>> for Swatch {
    fn from(color: Rgb<u8>) -> Self {
        Self {
            rgb: color.0,
            hex: rgb_to_hex(color),
        }
    }
}

/// RGB 转 `#rrggbb`（小写）。
///
/// # 示例
/// ```rust
/// use image::Rgb;
/// use image_analysis::palette::rgb_to_hex;
///
/// assert_eq!(rgb_to_hex(Rgb([255, 0, 16])), "#ff0010");
/// ```
pub fn rgb_to_hex(color: Rgb<u8>) -> String {
    let [r, g, b] = color.0;
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// 解析 `#RRGGBB`（大小写均可，忽略首尾空白）。
pub fn hex_to_rgb(value: &str) -> Result<Rgb<u8>, PaletteError> {
    let trimmed = value.trim();
    let hex = trimmed
        .strip_prefix('#')
        .ok_or_else(|| PaletteError::ColorParse(format!("缺少 # 前缀：{}", trimmed)))?;

    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PaletteError::ColorParse(format!("需要 6 位十六进制：{}", trimmed)));
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .map_err(|e| PaletteError::ColorParse(format!("{}：{}", trimmed, e)))
    };

    Ok(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
}
