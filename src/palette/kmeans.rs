//! # 主色聚类
//!
//! ## 设计思路
//!
//! 在 RGB 空间对颜色样本做加权 k-means（权重为像素出现次数），
//! 目标是最小化簇内平方欧氏距离。
//!
//! ## 实现思路
//!
//! - k-means++ 选初始中心，随机数由 `options.seed` 播种，相同输入得到相同结果。
//! - 重复 `n_init` 次，保留惯性（加权平方误差和）最小的一次。
//! - 空簇用“离所属中心最远的样本”重新播种。
//! - 中心四舍五入并钳制到 [0, 255]，按簇权重降序输出。
//! - 不同颜色数 ≤ k 时直接使用原色，不足部分按策略补齐或报错。

use image::Rgb;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{ColorSamples, PaletteError};

/// 默认主色数量。
pub const DEFAULT_CLUSTERS: usize = 5;

/// 颜色数不足 k 时的处理策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortfallPolicy {
    /// 每种颜色独立成簇，再重复出现次数最少的颜色补齐到 k 个。
    #[default]
    Pad,
    /// 直接返回 `InsufficientData`。
    Strict,
}

/// 聚类参数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaletteOptions {
    pub clusters: usize,
    pub seed: u64,
    pub max_iter: usize,
    pub n_init: usize,
    pub tolerance: f64,
    pub shortfall: ShortfallPolicy,
}

impl Default for PaletteOptions {
    fn default() -> Self {
        Self {
            clusters: DEFAULT_CLUSTERS,
            seed: 0,
            max_iter: 300,
            n_init: 4,
            tolerance: 1e-4,
            shortfall: ShortfallPolicy::Pad,
        }
    }
}

impl PaletteOptions {
    /// 仅修改聚类数，其余沿用默认值。
    pub fn with_clusters(clusters: usize) -> Self {
        Self {
            clusters,
            ..Self::default()
        }
    }
}

/// 主色调色板：长度固定为计算时的 k，编辑只替换条目，不改变长度。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Rgb<u8>>,
}

impl Palette {
    pub fn colors(&self) -> &[Rgb<u8>] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Rgb<u8>> {
        self.colors.get(index).copied()
    }

    /// 替换指定位置的颜色，返回旧值；越界返回 `None`。
    pub(crate) fn replace(&mut self, index: usize, color: Rgb<u8>) -> Option<Rgb<u8>> {
        let slot = self.colors.get_mut(index)?;
        Some(std::mem::replace(slot, color))
    }
}

/// 计算主色调色板。
///
/// # 示例
/// ```rust
/// use image::Rgb;
/// use image_analysis::palette::{ColorSamples, PaletteOptions, compute_palette};
///
/// let samples = ColorSamples::from_counts([(Rgb([255, 0, 0]), 2), (Rgb([0, 0, 255]), 1)]);
/// let palette = compute_palette(&samples, &PaletteOptions::with_clusters(2))?;
/// assert_eq!(palette.colors(), &[Rgb([255, 0, 0]), Rgb([0, 0, 255])]);
/// # Ok::<(), image_analysis::palette::PaletteError>(())
/// ```
pub fn compute_palette(samples: &ColorSamples, options: &PaletteOptions) -> Result<Palette, PaletteError> {
    let k = options.clusters;
    let distinct = samples.distinct();

    if k == 0 || distinct == 0 {
        return Err(PaletteError::InsufficientData {
            distinct,
            requested: k,
        });
    }

    if distinct <= k {
        if distinct < k && options.shortfall == ShortfallPolicy::Strict {
            return Err(PaletteError::InsufficientData {
                distinct,
                requested: k,
            });
        }
        return Ok(exact_palette(samples, k));
    }

    let points: Vec<[f64; 3]> = samples
        .samples()
        .iter()
        .map(|sample| {
            let [r, g, b] = sample.color.0;
            [r as f64, g as f64, b as f64]
        })
        .collect();
    let weights: Vec<f64> = samples.samples().iter().map(|sample| sample.count as f64).collect();

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut best: Option<Clustering> = None;

    for _ in 0..options.n_init.max(1) {
        let initial = seed_plus_plus(&points, &weights, k, &mut rng);
        let clustering = lloyd(&points, &weights, initial, options.max_iter, options.tolerance);

        let better = best
            .as_ref()
            .map_or(true, |current| clustering.inertia < current.inertia);
        if better {
            best = Some(clustering);
        }
    }

    let Some(best) = best else {
        return Err(PaletteError::InsufficientData {
            distinct,
            requested: k,
        });
    };

    log::debug!(
        "🎯 聚类完成 - 样本: {} k: {} 迭代: {} 惯性: {:.2}",
        distinct,
        k,
        best.iterations,
        best.inertia
    );

    Ok(Palette {
        colors: best.into_ordered_colors(),
    })
}

/// 样本不多于 k 种：原色直接作为中心，按出现次数降序，不足时重复最少见的颜色。
fn exact_palette(samples: &ColorSamples, k: usize) -> Palette {
    let mut colors: Vec<Rgb<u8>> = samples.samples().iter().map(|sample| sample.color).collect();
    if let Some(&least) = colors.last() {
        colors.resize(k, least);
    }
    Palette { colors }
}

struct Clustering {
    centroids: Vec<[f64; 3]>,
    cluster_weights: Vec<f64>,
    inertia: f64,
    iterations: usize,
}

impl Clustering {
    fn into_ordered_colors(self) -> Vec<Rgb<u8>> {
        let mut ranked: Vec<(f64, Rgb<u8>)> = self
            .cluster_weights
            .into_iter()
            .zip(self.centroids.iter().map(|c| to_rgb(*c)))
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.0.cmp(&b.1.0)));
        ranked.into_iter().map(|(_, color)| color).collect()
    }
}

fn to_rgb(centroid: [f64; 3]) -> Rgb<u8> {
    let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;
    Rgb([channel(centroid[0]), channel(centroid[1]), channel(centroid[2])])
}

fn distance_sq(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn nearest(point: &[f64; 3], centroids: &[[f64; 3]]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, centroid) in centroids.iter().enumerate() {
        let d = distance_sq(point, centroid);
        if d < best.1 {
            best = (idx, d);
        }
    }
    best
}

/// 按权重抽一个下标；总权重为 0 时返回 `None`。
fn weighted_pick(scores: &[f64], rng: &mut StdRng) -> Option<usize> {
    let total: f64 = scores.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }

    let target = rng.random::<f64>() * total;
    let mut acc = 0.0;
    for (idx, score) in scores.iter().enumerate() {
        acc += score;
        if *score > 0.0 && acc > target {
            return Some(idx);
        }
    }
    scores.iter().rposition(|score| *score > 0.0)
}

/// k-means++：首个中心按权重抽取，之后按 `权重 × 到最近中心距离²` 抽取。
fn seed_plus_plus(points: &[[f64; 3]], weights: &[f64], k: usize, rng: &mut StdRng) -> Vec<[f64; 3]> {
    let mut centroids = Vec::with_capacity(k);
    let first = weighted_pick(weights, rng).unwrap_or(0);
    centroids.push(points[first]);

    let mut closest: Vec<f64> = points.iter().map(|p| distance_sq(p, &points[first])).collect();

    while centroids.len() < k {
        let scores: Vec<f64> = closest.iter().zip(weights).map(|(d, w)| d * w).collect();
        // 所有样本都已与中心重合时（调用前已保证不会发生），退回第一个未覆盖的样本
        let next = weighted_pick(&scores, rng)
            .or_else(|| closest.iter().position(|d| *d > 0.0))
            .unwrap_or(0);

        let chosen = points[next];
        centroids.push(chosen);
        for (d, p) in closest.iter_mut().zip(points) {
            *d = d.min(distance_sq(p, &chosen));
        }
    }

    centroids
}

fn lloyd(
    points: &[[f64; 3]],
    weights: &[f64],
    mut centroids: Vec<[f64; 3]>,
    max_iter: usize,
    tolerance: f64,
) -> Clustering {
    let k = centroids.len();
    let mut labels = vec![0usize; points.len()];
    let mut distances = vec![0.0f64; points.len()];
    let mut iterations = 0;

    for _ in 0..max_iter.max(1) {
        iterations += 1;
        assign(points, &centroids, &mut labels, &mut distances);

        let mut sums = vec![[0.0f64; 3]; k];
        let mut mass = vec![0.0f64; k];
        for ((point, weight), label) in points.iter().zip(weights).zip(&labels) {
            for c in 0..3 {
                sums[*label][c] += point[c] * weight;
            }
            mass[*label] += weight;
        }

        let mut next = centroids.clone();
        let mut reseeded: Vec<usize> = Vec::new();
        for cluster in 0..k {
            if mass[cluster] > 0.0 {
                next[cluster] = [
                    sums[cluster][0] / mass[cluster],
                    sums[cluster][1] / mass[cluster],
                    sums[cluster][2] / mass[cluster],
                ];
            } else if let Some(far) = farthest_unused(&distances, &reseeded) {
                next[cluster] = points[far];
                reseeded.push(far);
            }
        }

        let shift: f64 = centroids
            .iter()
            .zip(&next)
            .map(|(old, new)| distance_sq(old, new))
            .sum();
        centroids = next;

        if shift <= tolerance {
            break;
        }
    }

    assign(points, &centroids, &mut labels, &mut distances);
    let mut cluster_weights = vec![0.0f64; k];
    let mut inertia = 0.0;
    for ((label, distance), weight) in labels.iter().zip(&distances).zip(weights) {
        cluster_weights[*label] += weight;
        inertia += distance * weight;
    }

    Clustering {
        centroids,
        cluster_weights,
        inertia,
        iterations,
    }
}

fn assign(points: &[[f64; 3]], centroids: &[[f64; 3]], labels: &mut [usize], distances: &mut [f64]) {
    for ((point, label), distance) in points.iter().zip(labels.iter_mut()).zip(distances.iter_mut()) {
        let (idx, d) = nearest(point, centroids);
        *label = idx;
        *distance = d;
    }
}

fn farthest_unused(distances: &[f64], used: &[usize]) -> Option<usize> {
    distances
        .iter()
        .enumerate()
        .filter(|(idx, d)| **d > 0.0 && !used.contains(idx))
        .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(idx, _)| idx)
}
