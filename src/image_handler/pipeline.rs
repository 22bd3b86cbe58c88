//! # 解码流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → RGBA 栅格”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素/内存上限快速拒绝
//! 3. 解码第一帧
//! 4. 统计帧数（GIF / APNG / WebP 动画）
//! 5. 转换 RGBA，并校验字节长度一致性

use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, ImageFormat, ImageReader};
use std::io::Cursor;

use super::source::{RasterImage, RawImageData};
use super::{ImageConfig, ImageError, ImageHandler};

impl ImageHandler {
    /// 将原始字节解码为栅格图像。
    pub(crate) fn decode_raster(
        &self,
        raw: RawImageData,
        config: &ImageConfig,
    ) -> Result<RasterImage, ImageError> {
        let format: ImageFormat = image::guess_format(&raw.bytes)
            .map_err(|e| ImageError::UnsupportedFormat(format!("不支持的图片格式：{}", e)))?;

        let (header_width, header_height) = Self::inspect_dimensions_from_memory(&raw.bytes)?;
        Self::validate_pixel_limits(config, header_width, header_height)?;
        Self::validate_decoded_memory_limits(config, header_width, header_height)?;

        let decoded = image::load_from_memory_with_format(&raw.bytes, format)
            .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

        let color_type = decoded.color();
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| ImageError::ResourceLimit("图片尺寸导致内存溢出风险".to_string()))?;

        if rgba.as_raw().len() != expected_len {
            return Err(ImageError::Decode("解码后像素数据长度异常".to_string()));
        }
        if width == 0 || height == 0 {
            return Err(ImageError::Decode("图片尺寸为 0".to_string()));
        }

        let frame_count = Self::count_frames(&raw.bytes, format);

        log::info!(
            "✅ 图片解码成功 - 来源: {} 格式: {:?} 尺寸: {}x{} 帧数: {}",
            raw.source_hint,
            format,
            width,
            height,
            frame_count
        );

        Ok(RasterImage::new(
            rgba,
            Some(format),
            color_type,
            frame_count,
            raw.filename,
            raw.bytes,
        ))
    }

    /// 仅通过内存中的图片头信息读取宽高。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::InvalidFormat(format!("无法识别图片格式：{}", e)))?
            .into_dimensions()
            .map_err(|e| ImageError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
    }

    fn validate_pixel_limits(config: &ImageConfig, width: u32, height: u32) -> Result<(), ImageError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > config.max_decoded_pixels {
            return Err(ImageError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    fn validate_decoded_memory_limits(
        config: &ImageConfig,
        width: u32,
        height: u32,
    ) -> Result<(), ImageError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| ImageError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > config.max_decoded_bytes {
            return Err(ImageError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    /// 统计动画帧数；无法识别或读取失败时按单帧处理。
    fn count_frames(bytes: &[u8], format: ImageFormat) -> u32 {
        let counted = match format {
            ImageFormat::Gif => GifDecoder::new(Cursor::new(bytes))
                .map(|decoder| Self::count_ok_frames(decoder.into_frames())),
            ImageFormat::Png => PngDecoder::new(Cursor::new(bytes)).and_then(|decoder| {
                if decoder.is_apng()? {
                    Ok(Self::count_ok_frames(decoder.apng()?.into_frames()))
                } else {
                    Ok(1)
                }
            }),
            ImageFormat::WebP => WebPDecoder::new(Cursor::new(bytes)).map(|decoder| {
                if decoder.has_animation() {
                    Self::count_ok_frames(decoder.into_frames())
                } else {
                    1
                }
            }),
            _ => Ok(1),
        };

        match counted {
            Ok(count) => count.max(1),
            Err(err) => {
                log::warn!("⚠️ 读取动画帧失败，按单帧处理：{}", err);
                1
            }
        }
    }

    fn count_ok_frames(frames: image::Frames<'_>) -> u32 {
        frames.take_while(|frame| frame.is_ok()).count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_handler::test_support::create_png_bytes;
    use image::ColorType;

    fn raw(bytes: Vec<u8>) -> RawImageData {
        RawImageData {
            bytes,
            source_hint: "test",
            filename: Some("test.png".to_string()),
        }
    }

    #[test]
    fn decode_raster_reads_png_structure() {
        let handler = ImageHandler::new(ImageConfig::default());
        let raster = handler
            .decode_raster(raw(create_png_bytes(4, 3)), &ImageConfig::default())
            .expect("decode should succeed");

        assert_eq!(raster.dimensions(), (4, 3));
        assert_eq!(raster.format(), Some(ImageFormat::Png));
        assert_eq!(raster.color_type(), ColorType::Rgba8);
        assert_eq!(raster.frame_count(), 1);
        assert!(!raster.is_animated());
        assert_eq!(raster.filename(), Some("test.png"));
    }

    #[test]
    fn decode_raster_rejects_too_many_pixels() {
        let mut config = ImageConfig::default();
        config.max_decoded_pixels = 100;

        let handler = ImageHandler::new(config.clone());
        let result = handler.decode_raster(raw(create_png_bytes(20, 20)), &config);

        assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
    }

    #[test]
    fn decode_raster_rejects_unknown_bytes() {
        let handler = ImageHandler::new(ImageConfig::default());
        let result = handler.decode_raster(raw(b"definitely not an image".to_vec()), &ImageConfig::default());

        assert!(matches!(result, Err(ImageError::UnsupportedFormat(_))));
    }
}
