//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `ImageSource` 表示外部来源语义
//! - `RawImageData` 表示已加载但未解码的字节
//! - `RasterImage` 表示解码完成、可供取色与聚类使用的像素网格

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use image::{ColorType, ImageFormat, Rgb, RgbaImage};

/// 图片输入来源。
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// 上传的字节流，`mime` 为前端声明的类型（仅允许 PNG/JPEG）。
    Upload {
        bytes: Vec<u8>,
        mime: String,
        filename: Option<String>,
    },
    /// 网络地址来源（HTTP/HTTPS）。
    Url(String),
    /// Base64（支持 Data URL 与纯 Base64 字符串）。
    Base64(String),
}

impl ImageSource {
    /// 缓存键：仅 URL 与 Base64 来源参与缓存，上传内容每次都重新解码。
    pub(crate) fn cache_key(&self) -> Option<String> {
        match self {
            Self::Upload { .. } => None,
            Self::Url(url) => Some(format!("url:{}", url.trim())),
            Self::Base64(data) => Some(format!("b64:{}", data.trim())),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Upload { .. } => "upload",
            Self::Url(_) => "url",
            Self::Base64(_) => "base64",
        }
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
    /// 文件名（上传名或 URL 末段），Data URL 没有文件名。
    pub(crate) filename: Option<String>,
}

/// 解码后的栅格图像。
///
/// 只保留第一帧像素；多帧信息以帧数与动画标记的形式保存。
/// 一经创建不可变，通过 `Arc` 在缓存与会话之间共享。
#[derive(Debug, Clone)]
pub struct RasterImage {
    pixels: RgbaImage,
    format: Option<ImageFormat>,
    color_type: ColorType,
    frame_count: u32,
    is_animated: bool,
    filename: Option<String>,
    encoded: Vec<u8>,
    fingerprint: u64,
}

impl RasterImage {
    pub(crate) fn new(
        pixels: RgbaImage,
        format: Option<ImageFormat>,
        color_type: ColorType,
        frame_count: u32,
        filename: Option<String>,
        encoded: Vec<u8>,
    ) -> Self {
        let fingerprint = Self::fingerprint_of(&pixels);
        let frame_count = frame_count.max(1);

        Self {
            pixels,
            format,
            color_type,
            frame_count,
            is_animated: frame_count > 1,
            filename,
            encoded,
            fingerprint,
        }
    }

    /// 直接由内存像素构建（无编码字节、无格式信息）。
    ///
    /// # 示例
    /// ```rust
    /// use image::{Rgba, RgbaImage};
    /// use image_analysis::image_handler::RasterImage;
    ///
    /// let raster = RasterImage::from_pixels(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])));
    /// assert_eq!(raster.dimensions(), (2, 2));
    /// ```
    pub fn from_pixels(pixels: RgbaImage) -> Self {
        Self::new(pixels, None, ColorType::Rgba8, 1, None, Vec::new())
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// 第一帧的 RGBA 像素。
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    /// 源图的原始颜色类型（解码前）。
    pub fn color_type(&self) -> ColorType {
        self.color_type
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn is_animated(&self) -> bool {
        self.is_animated
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// 原始编码字节（用于读取 EXIF 等内嵌标签）。
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    /// 读取指定坐标的 RGB 颜色，越界返回 `None`。
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<Rgb<u8>> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let [r, g, b, _] = self.pixels.get_pixel(x, y).0;
        Some(Rgb([r, g, b]))
    }

    /// 判断两张图是否内容相同：先比指纹与尺寸，再逐像素确认。
    pub fn same_content(&self, other: &RasterImage) -> bool {
        self.fingerprint == other.fingerprint
            && self.dimensions() == other.dimensions()
            && self.pixels.as_raw() == other.pixels.as_raw()
    }

    fn fingerprint_of(pixels: &RgbaImage) -> u64 {
        let mut hasher = DefaultHasher::new();
        pixels.dimensions().hash(&mut hasher);
        pixels.as_raw().hash(&mut hasher);
        hasher.finish()
    }
}
