//! # 元数据提取模块
//!
//! ## 设计思路
//!
//! 从已解码的 `RasterImage` 读取结构字段（尺寸、格式、颜色模式、动画帧），
//! 再从原始编码字节中读取 EXIF 标签。
//! EXIF 只是附加信息：整块损坏时跳过并记录日志，单个标签无法转成文本时写入占位值，
//! 永远不会让整条链路失败。
//!
//! ## 实现思路
//!
//! - 结构字段固定在前，顺序稳定，便于前端直接展示。
//! - 标签名优先使用可读名称，未知标签回落到数字 ID。
//! - 字节类标签（BYTE / UNDEFINED / ASCII）解码为文本。

use std::io::Cursor;

use exif::{Exif, Field, In, Value};
use image::{ColorType, ImageFormat};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Value as JsonValue, json};

use super::RasterImage;

/// 无法转成文本的标签值占位符。
pub const UNREADABLE_TAG: &str = "<unreadable>";

/// 有序的“字段名 → 值”映射。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMetadata {
    entries: Vec<(String, JsonValue)>,
}

impl ImageMetadata {
    /// 按字段名读取；同名字段只保留第一次写入的值。
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, key: impl Into<String>, value: JsonValue) {
        let key = key.into();
        if self.get(&key).is_none() {
            self.entries.push((key, value));
        }
    }
}

impl Serialize for ImageMetadata {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// 读取图片元数据。
///
/// # 示例
/// ```rust
/// use image::{Rgba, RgbaImage};
/// use image_analysis::image_handler::{RasterImage, extract_metadata};
///
/// let raster = RasterImage::from_pixels(RgbaImage::from_pixel(3, 2, Rgba([0, 0, 0, 255])));
/// let meta = extract_metadata(&raster);
/// assert_eq!(meta.get("Image Width"), Some(&serde_json::json!(3)));
/// ```
pub fn extract_metadata(raster: &RasterImage) -> ImageMetadata {
    let mut meta = ImageMetadata::default();
    let (width, height) = raster.dimensions();

    meta.insert("Filename", json!(raster.filename()));
    meta.insert("Image Size", json!([width, height]));
    meta.insert("Image Height", json!(height));
    meta.insert("Image Width", json!(width));
    meta.insert("Image Format", json!(raster.format().map(format_name)));
    meta.insert("Image Mode", json!(color_mode_name(raster.color_type())));
    meta.insert("Image is Animated", json!(raster.is_animated()));
    meta.insert("Frames in Image", json!(raster.frame_count()));

    if let Some(exif) = read_exif(raster.encoded()) {
        for (key, value) in exif_entries(&exif) {
            meta.insert(key, json!(value));
        }
    }

    meta
}

fn read_exif(encoded: &[u8]) -> Option<Exif> {
    if encoded.is_empty() {
        return None;
    }

    match exif::Reader::new().read_from_container(&mut Cursor::new(encoded)) {
        Ok(exif) => Some(exif),
        Err(exif::Error::NotFound(_)) => None,
        Err(err) => {
            log::warn!("⚠️ EXIF 数据损坏，已跳过：{}", err);
            None
        }
    }
}

/// 将 EXIF 字段转换为（标签名，文本值）列表。
fn exif_entries(exif: &Exif) -> Vec<(String, String)> {
    exif.fields()
        .map(|field| {
            let name = tag_name(field);
            let value = field_text(exif, field);
            (name, value)
        })
        .collect()
}

fn tag_name(field: &Field) -> String {
    let base = if field.tag.description().is_some() {
        field.tag.to_string()
    } else {
        field.tag.number().to_string()
    };

    if field.ifd_num == In::PRIMARY {
        base
    } else {
        format!("{} (IFD{})", base, field.ifd_num.index())
    }
}

fn field_text(exif: &Exif, field: &Field) -> String {
    match &field.value {
        Value::Ascii(parts) => {
            let texts: Option<Vec<String>> = parts.iter().map(|part| bytes_to_text(part)).collect();
            texts
                .map(|texts| texts.join(", "))
                .unwrap_or_else(|| UNREADABLE_TAG.to_string())
        }
        Value::Byte(bytes) | Value::Undefined(bytes, _) => {
            bytes_to_text(bytes).unwrap_or_else(|| UNREADABLE_TAG.to_string())
        }
        _ => field.display_value().with_unit(exif).to_string(),
    }
}

/// 字节转文本：去掉末尾 NUL，非 UTF-8 返回 `None`。
fn bytes_to_text(bytes: &[u8]) -> Option<String> {
    let trimmed = match bytes.iter().rposition(|b| *b != 0) {
        Some(last) => &bytes[..=last],
        None => &[],
    };
    std::str::from_utf8(trimmed).ok().map(|text| text.to_string())
}

fn format_name(format: ImageFormat) -> String {
    format!("{:?}", format).to_uppercase()
}

/// 颜色类型转为常见的模式名（L / LA / RGB / RGBA ...）。
fn color_mode_name(color_type: ColorType) -> String {
    match color_type {
        ColorType::L8 => "L".to_string(),
        ColorType::La8 => "LA".to_string(),
        ColorType::Rgb8 => "RGB".to_string(),
        ColorType::Rgba8 => "RGBA".to_string(),
        ColorType::L16 => "I;16".to_string(),
        ColorType::La16 => "LA;16".to_string(),
        ColorType::Rgb16 => "RGB;16".to_string(),
        ColorType::Rgba16 => "RGBA;16".to_string(),
        ColorType::Rgb32F => "RGB;F".to_string(),
        ColorType::Rgba32F => "RGBA;F".to_string(),
        other => format!("{:?}", other),
    }
}
