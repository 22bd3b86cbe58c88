//! # 会话状态机
//!
//! ## 实现思路
//!
//! `Session::apply` 只读取当前会话并返回新会话，调用方在成功后整体替换，
//! 失败时旧会话原样保留。样本、元数据与原图通过 `Arc` 共享，取色与编辑
//! 只克隆调色板和取色列表这两个很小的向量。

use std::sync::Arc;
use std::time::Instant;

use image::Rgb;
use serde::Serialize;

use crate::image_handler::{ImageMetadata, RasterImage, extract_metadata};
use crate::palette::{ColorSamples, Palette, PaletteOptions, compute_palette, extract_color_samples};

use super::{Coordinate, Outcome, SessionCommand, SessionError, SwatchTarget};

/// 会话所处阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// 还没有图片
    Empty,
    /// 图片已载入，尚未取色或编辑
    Loaded,
    /// 至少发生过一次取色或编辑
    Editing,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loaded => "loaded",
            Self::Editing => "editing",
        }
    }
}

/// 当前图片及其派生数据。
#[derive(Debug, Clone)]
pub struct ActiveImage {
    raster: Arc<RasterImage>,
    metadata: Arc<ImageMetadata>,
    samples: Arc<ColorSamples>,
    palette: Palette,
    picked: Vec<Rgb<u8>>,
    last_coordinate: Option<Coordinate>,
    editing: bool,
}

impl ActiveImage {
    fn analyze(raster: Arc<RasterImage>, options: &PaletteOptions) -> Result<Self, SessionError> {
        let started = Instant::now();
        let samples = extract_color_samples(&raster);
        let palette = compute_palette(&samples, options)?;
        let metadata = extract_metadata(&raster);

        log::info!(
            "✅ 图片分析完成 - 尺寸: {}x{} 颜色数: {} 主色: {} 元数据字段: {} 耗时: {:?}",
            raster.width(),
            raster.height(),
            samples.distinct(),
            palette.len(),
            metadata.len(),
            started.elapsed()
        );

        Ok(Self {
            raster,
            metadata: Arc::new(metadata),
            samples: Arc::new(samples),
            palette,
            picked: Vec::new(),
            last_coordinate: None,
            editing: false,
        })
    }

    pub fn raster(&self) -> &Arc<RasterImage> {
        &self.raster
    }

    pub fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    pub fn samples(&self) -> &ColorSamples {
        &self.samples
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn picked(&self) -> &[Rgb<u8>] {
        &self.picked
    }

    pub fn last_coordinate(&self) -> Option<Coordinate> {
        self.last_coordinate
    }

    fn holds_same_image(&self, raster: &Arc<RasterImage>) -> bool {
        Arc::ptr_eq(&self.raster, raster) || self.raster.same_content(raster)
    }
}

/// 一个取色会话。`Default` 即空会话。
#[derive(Debug, Clone, Default)]
pub struct Session {
    active: Option<ActiveImage>,
}

/// 命令执行后的新会话与结果。
#[derive(Debug, Clone)]
pub struct Transition {
    pub session: Session,
    pub outcome: Outcome,
}

impl Transition {
    fn new(session: Session, outcome: Outcome) -> Self {
        Self { session, outcome }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        match &self.active {
            None => Phase::Empty,
            Some(active) if active.editing => Phase::Editing,
            Some(_) => Phase::Loaded,
        }
    }

    pub fn active(&self) -> Option<&ActiveImage> {
        self.active.as_ref()
    }

    pub fn palette(&self) -> Option<&Palette> {
        self.active.as_ref().map(|active| &active.palette)
    }

    /// 取色列表；空会话返回空切片。
    pub fn picked(&self) -> &[Rgb<u8>] {
        self.active.as_ref().map(|active| active.picked.as_slice()).unwrap_or(&[])
    }

    /// 执行一条命令。`self` 不会被修改。
    pub fn apply(&self, command: SessionCommand) -> Result<Transition, SessionError> {
        match command {
            SessionCommand::LoadImage { raster, options } => self.load_image(raster, &options),
            SessionCommand::PickPixel(coordinate) => self.pick_pixel(coordinate),
            SessionCommand::EditSwatch { target, index, color } => self.edit_swatch(target, index, color),
            SessionCommand::Reset => Ok(Transition::new(Session::default(), Outcome::Reset)),
        }
    }

    fn load_image(&self, raster: Arc<RasterImage>, options: &PaletteOptions) -> Result<Transition, SessionError> {
        if let Some(active) = &self.active {
            if active.holds_same_image(&raster) {
                log::debug!("🔁 重复载入同一张图片，会话保持不变");
                return Ok(Transition::new(self.clone(), Outcome::Unchanged));
            }
        }

        let active = ActiveImage::analyze(raster, options)?;
        Ok(Transition::new(Session { active: Some(active) }, Outcome::Loaded))
    }

    fn pick_pixel(&self, coordinate: Coordinate) -> Result<Transition, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NoImageLoaded)?;

        let (width, height) = active.raster.dimensions();
        let color = active
            .raster
            .rgb_at(coordinate.x, coordinate.y)
            .ok_or(SessionError::CoordinateOutOfBounds {
                x: coordinate.x,
                y: coordinate.y,
                width,
                height,
            })?;

        if active.last_coordinate == Some(coordinate) {
            return Ok(Transition::new(self.clone(), Outcome::Unchanged));
        }

        let mut next = active.clone();
        next.picked.push(color);
        next.last_coordinate = Some(coordinate);
        next.editing = true;

        log::debug!("🎯 取色 ({}, {}) -> {:?}", coordinate.x, coordinate.y, color.0);

        Ok(Transition::new(
            Session { active: Some(next) },
            Outcome::Picked { color: color.into() },
        ))
    }

    fn edit_swatch(&self, target: SwatchTarget, index: usize, color: Rgb<u8>) -> Result<Transition, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NoImageLoaded)?;
        let mut next = active.clone();

        let previous = match target {
            SwatchTarget::Palette => next.palette.replace(index, color),
            SwatchTarget::Picked => next
                .picked
                .get_mut(index)
                .map(|slot| std::mem::replace(slot, color)),
        };
        let previous = previous.ok_or(SessionError::SwatchOutOfRange {
            target,
            index,
            len: match target {
                SwatchTarget::Palette => active.palette.len(),
                SwatchTarget::Picked => active.picked.len(),
            },
        })?;

        next.editing = true;
        let refresh = previous != color;

        Ok(Transition::new(
            Session { active: Some(next) },
            Outcome::SwatchEdited { refresh },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::ShortfallPolicy;
    use image::{Rgba, RgbaImage};
    use proptest::prelude::*;

    fn scenario_raster() -> Arc<RasterImage> {
        let mut pixels = RgbaImage::new(2, 2);
        pixels.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        pixels.put_pixel(1, 0, Rgba([255, 0, 0, 255]));
        pixels.put_pixel(0, 1, Rgba([0, 255, 0, 255]));
        pixels.put_pixel(1, 1, Rgba([0, 0, 255, 255]));
        Arc::new(RasterImage::from_pixels(pixels))
    }

    fn loaded(raster: Arc<RasterImage>) -> Session {
        Session::new()
            .apply(SessionCommand::LoadImage {
                raster,
                options: PaletteOptions::with_clusters(3),
            })
            .unwrap()
            .session
    }

    #[test]
    fn load_moves_empty_session_to_loaded() {
        let transition = Session::new()
            .apply(SessionCommand::LoadImage {
                raster: scenario_raster(),
                options: PaletteOptions::with_clusters(3),
            })
            .unwrap();

        assert_eq!(transition.outcome, Outcome::Loaded);
        assert_eq!(transition.session.phase(), Phase::Loaded);
        let active = transition.session.active().unwrap();
        assert_eq!(active.samples().count_of(Rgb([255, 0, 0])), 2);
        assert_eq!(active.palette().len(), 3);
        assert!(active.palette().colors().contains(&Rgb([255, 0, 0])));
        assert!(active.metadata().get("Image Width").is_some());
    }

    #[test]
    fn pick_appends_color_and_enters_editing() {
        let session = loaded(scenario_raster());
        let transition = session.apply(SessionCommand::PickPixel(Coordinate::new(1, 1))).unwrap();

        assert_eq!(
            transition.outcome,
            Outcome::Picked {
                color: Rgb([0, 0, 255]).into()
            }
        );
        assert_eq!(transition.session.phase(), Phase::Editing);
        assert_eq!(transition.session.picked(), &[Rgb([0, 0, 255])]);
        // 原会话不受影响
        assert!(session.picked().is_empty());
        assert_eq!(session.phase(), Phase::Loaded);
    }

    #[test]
    fn repeated_pick_at_same_coordinate_is_ignored() {
        let session = loaded(scenario_raster());
        let once = session.apply(SessionCommand::PickPixel(Coordinate::new(0, 1))).unwrap().session;
        let twice = once.apply(SessionCommand::PickPixel(Coordinate::new(0, 1))).unwrap();

        assert_eq!(twice.outcome, Outcome::Unchanged);
        assert_eq!(twice.session.picked(), &[Rgb([0, 255, 0])]);

        // 换个坐标后再回到原坐标，会再次取色
        let other = twice.session.apply(SessionCommand::PickPixel(Coordinate::new(0, 0))).unwrap().session;
        let back = other.apply(SessionCommand::PickPixel(Coordinate::new(0, 1))).unwrap().session;
        assert_eq!(back.picked().len(), 3);
    }

    #[test]
    fn pick_requires_loaded_image() {
        let err = Session::new()
            .apply(SessionCommand::PickPixel(Coordinate::new(0, 0)))
            .unwrap_err();
        assert_eq!(err, SessionError::NoImageLoaded);
    }

    #[test]
    fn pick_outside_image_is_rejected() {
        let session = loaded(scenario_raster());
        let err = session
            .apply(SessionCommand::PickPixel(Coordinate::new(2, 0)))
            .unwrap_err();

        assert_eq!(
            err,
            SessionError::CoordinateOutOfBounds {
                x: 2,
                y: 0,
                width: 2,
                height: 2
            }
        );
        assert_eq!(err.code(), "E_COORDINATE_OUT_OF_BOUNDS");
    }

    #[test]
    fn reloading_same_content_keeps_picks() {
        let raster = scenario_raster();
        let session = loaded(raster.clone());
        let picked = session.apply(SessionCommand::PickPixel(Coordinate::new(1, 1))).unwrap().session;

        // 内容相同但不是同一个 Arc
        let copy = Arc::new(RasterImage::from_pixels(raster.pixels().clone()));
        let reload = picked
            .apply(SessionCommand::LoadImage {
                raster: copy,
                options: PaletteOptions::with_clusters(3),
            })
            .unwrap();

        assert_eq!(reload.outcome, Outcome::Unchanged);
        assert_eq!(reload.session.picked(), &[Rgb([0, 0, 255])]);
        assert_eq!(reload.session.phase(), Phase::Editing);
    }

    #[test]
    fn same_pixels_from_another_source_keep_first_metadata() {
        let raster = scenario_raster();
        let session = loaded(raster.clone());

        let renamed = Arc::new(RasterImage::new(
            raster.pixels().clone(),
            Some(image::ImageFormat::Png),
            image::ColorType::Rgba8,
            1,
            Some("upload.png".to_string()),
            Vec::new(),
        ));
        let reload = session
            .apply(SessionCommand::LoadImage {
                raster: renamed,
                options: PaletteOptions::with_clusters(3),
            })
            .unwrap();

        assert_eq!(reload.outcome, Outcome::Unchanged);
        let metadata = reload.session.active().unwrap().metadata();
        assert_eq!(metadata.get("Filename"), Some(&serde_json::Value::Null));
        assert_eq!(metadata.get("Image Format"), Some(&serde_json::Value::Null));
    }

    #[test]
    fn loading_different_image_clears_picks() {
        let session = loaded(scenario_raster());
        let picked = session.apply(SessionCommand::PickPixel(Coordinate::new(0, 0))).unwrap().session;

        let other = Arc::new(RasterImage::from_pixels(RgbaImage::from_pixel(3, 3, Rgba([7, 7, 7, 255]))));
        let reload = picked
            .apply(SessionCommand::LoadImage {
                raster: other,
                options: PaletteOptions::default(),
            })
            .unwrap();

        assert_eq!(reload.outcome, Outcome::Loaded);
        assert_eq!(reload.session.phase(), Phase::Loaded);
        assert!(reload.session.picked().is_empty());
        assert_eq!(reload.session.palette().unwrap().len(), 5);
    }

    #[test]
    fn failed_load_leaves_session_untouched() {
        let session = loaded(scenario_raster());
        let strict = PaletteOptions {
            shortfall: ShortfallPolicy::Strict,
            ..PaletteOptions::default()
        };
        let two_colors = {
            let mut pixels = RgbaImage::from_pixel(2, 1, Rgba([1, 1, 1, 255]));
            pixels.put_pixel(1, 0, Rgba([2, 2, 2, 255]));
            Arc::new(RasterImage::from_pixels(pixels))
        };

        let err = session
            .apply(SessionCommand::LoadImage {
                raster: two_colors,
                options: strict,
            })
            .unwrap_err();

        assert!(matches!(err, SessionError::Palette(_)));
        assert_eq!(session.phase(), Phase::Loaded);
        assert_eq!(session.palette().unwrap().len(), 3);
    }

    #[test]
    fn edit_palette_swatch_reports_refresh_only_on_change() {
        let session = loaded(scenario_raster());
        let original = session.palette().unwrap().get(0).unwrap();

        let same = session
            .apply(SessionCommand::EditSwatch {
                target: SwatchTarget::Palette,
                index: 0,
                color: original,
            })
            .unwrap();
        assert_eq!(same.outcome, Outcome::SwatchEdited { refresh: false });

        let changed = same
            .session
            .apply(SessionCommand::EditSwatch {
                target: SwatchTarget::Palette,
                index: 0,
                color: Rgb([1, 2, 3]),
            })
            .unwrap();
        assert_eq!(changed.outcome, Outcome::SwatchEdited { refresh: true });
        assert_eq!(changed.session.palette().unwrap().get(0), Some(Rgb([1, 2, 3])));
        assert_eq!(changed.session.palette().unwrap().len(), 3);
        assert_eq!(changed.session.phase(), Phase::Editing);
    }

    #[test]
    fn edit_picked_swatch_and_out_of_range() {
        let session = loaded(scenario_raster());
        let err = session
            .apply(SessionCommand::EditSwatch {
                target: SwatchTarget::Picked,
                index: 0,
                color: Rgb([0, 0, 0]),
            })
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::SwatchOutOfRange {
                target: SwatchTarget::Picked,
                index: 0,
                len: 0
            }
        );

        let picked = session.apply(SessionCommand::PickPixel(Coordinate::new(1, 1))).unwrap().session;
        let edited = picked
            .apply(SessionCommand::EditSwatch {
                target: SwatchTarget::Picked,
                index: 0,
                color: Rgb([9, 9, 9]),
            })
            .unwrap();
        assert_eq!(edited.session.picked(), &[Rgb([9, 9, 9])]);
    }

    #[test]
    fn reset_returns_to_empty() {
        let session = loaded(scenario_raster());
        let transition = session.apply(SessionCommand::Reset).unwrap();

        assert_eq!(transition.outcome, Outcome::Reset);
        assert_eq!(transition.session.phase(), Phase::Empty);
        assert!(transition.session.palette().is_none());
    }

    proptest! {
        #[test]
        fn duplicate_picks_append_once(x in 0u32..2, y in 0u32..2, repeats in 1usize..6) {
            let mut session = loaded(scenario_raster());
            for _ in 0..repeats {
                session = session.apply(SessionCommand::PickPixel(Coordinate::new(x, y))).unwrap().session;
            }
            prop_assert_eq!(session.picked().len(), 1);
        }
    }
}
