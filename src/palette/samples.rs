//! # 颜色采样
//!
//! 单次遍历第一帧像素，统计每种 RGB 颜色的出现次数（忽略 alpha）。

use std::collections::HashMap;

use image::Rgb;

use crate::image_handler::RasterImage;

/// 图中出现过的一种颜色及其像素数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorSample {
    pub color: Rgb<u8>,
    pub count: u64,
}

/// 一张图的全部颜色样本。
///
/// 按出现次数降序、颜色升序排列，保证相同输入得到相同顺序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorSamples {
    samples: Vec<ColorSample>,
    total: u64,
}

impl ColorSamples {
    /// 由（颜色，次数）构建；同色条目会合并，零次数条目会被丢弃。
    pub fn from_counts(counts: impl IntoIterator<Item = (Rgb<u8>, u64)>) -> Self {
        let mut merged: HashMap<[u8; 3], u64> = HashMap::new();
        for (color, count) in counts {
            if count > 0 {
                *merged.entry(color.0).or_insert(0) += count;
            }
        }

        let mut samples: Vec<ColorSample> = merged
            .into_iter()
            .map(|(rgb, count)| ColorSample {
                color: Rgb(rgb),
                count,
            })
            .collect();
        samples.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.color.0.cmp(&b.color.0)));

        let total = samples.iter().map(|sample| sample.count).sum();
        Self { samples, total }
    }

    pub fn samples(&self) -> &[ColorSample] {
        &self.samples
    }

    /// 不同颜色的数量。
    pub fn distinct(&self) -> usize {
        self.samples.len()
    }

    /// 像素总数（所有次数之和）。
    pub fn total_pixels(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn count_of(&self, color: Rgb<u8>) -> u64 {
        self.samples
            .iter()
            .find(|sample| sample.color == color)
            .map(|sample| sample.count)
            .unwrap_or(0)
    }
}

/// 提取图片第一帧的全部颜色样本，次数之和等于 `width * height`。
pub fn extract_color_samples(raster: &RasterImage) -> ColorSamples {
    let mut counts: HashMap<[u8; 3], u64> = HashMap::new();
    for pixel in raster.pixels().pixels() {
        let [r, g, b, _] = pixel.0;
        *counts.entry([r, g, b]).or_insert(0) += 1;
    }

    log::debug!(
        "🎨 颜色采样完成 - 像素: {} 不同颜色: {}",
        raster.width() as u64 * raster.height() as u64,
        counts.len()
    );

    ColorSamples::from_counts(counts.into_iter().map(|(rgb, count)| (Rgb(rgb), count)))
}
