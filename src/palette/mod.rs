//! # 调色板模块（palette）
//!
//! ## 设计思路
//!
//! 负责“像素 → 颜色样本 → 主色”的全部计算，不持有任何状态：
//!
//! - `samples`：单次遍历统计每种颜色的像素数
//! - `kmeans`：按像素数加权的 k-means，输出固定长度的主色
//! - `color`：`#RRGGBB` 与 RGB 的互转、输出用的色块结构
//!
//! 同一张图的样本与主色只在换图时由会话层重新计算。

mod color;
mod error;
mod kmeans;
mod samples;

pub use color::{Swatch, hex_to_rgb, rgb_to_hex};
pub use error::PaletteError;
pub use kmeans::{DEFAULT_CLUSTERS, Palette, PaletteOptions, ShortfallPolicy, compute_palette};
pub use samples::{ColorSample, ColorSamples, extract_color_samples};
