//! # 配置模块
//!
//! ## 设计思路
//!
//! 将加载链路所有“可调策略”集中到 `ImageConfig`，保证运行时行为可观测、可调整、可测试。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的配置。
//! - 支持 `serde` 反序列化，缺省字段回落到默认值（见 `settings` 模块）。
//! - `validate` 在配置生效前统一做范围校验。

use serde::{Deserialize, Serialize};

use super::ImageError;

/// 图片加载配置。
///
/// 字段覆盖了下载、Base64 解析与解码三个阶段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// 下载/读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 网络下载总超时时间（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时时间（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时时间（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 最大重定向次数，避免无限跳转或恶意链路。
    pub max_redirects: usize,
    /// 是否允许访问内网或本地地址（默认关闭，防 SSRF）。
    pub allow_private_network: bool,
    /// 是否对域名执行 DNS 解析后再做内网 IP 拦截。
    pub resolve_dns_for_url_safety: bool,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_redirects: 5,
            allow_private_network: false,
            resolve_dns_for_url_safety: true,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
        }
    }
}

impl ImageConfig {
    /// 校验配置取值范围。
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.max_file_size == 0 {
            return Err(ImageError::InvalidFormat("max_file_size 必须大于 0".to_string()));
        }
        if !(1..=600).contains(&self.download_timeout) {
            return Err(ImageError::InvalidFormat("download_timeout 必须在 1~600 秒之间".to_string()));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(ImageError::InvalidFormat("connect_timeout 必须在 1~120 秒之间".to_string()));
        }
        if !(500..=120_000).contains(&self.stream_first_byte_timeout_ms) {
            return Err(ImageError::InvalidFormat(
                "stream_first_byte_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if !(500..=120_000).contains(&self.stream_chunk_timeout_ms) {
            return Err(ImageError::InvalidFormat(
                "stream_chunk_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if self.max_redirects > 20 {
            return Err(ImageError::InvalidFormat("max_redirects 不能超过 20".to_string()));
        }
        if self.max_decoded_pixels == 0 {
            return Err(ImageError::InvalidFormat("max_decoded_pixels 必须大于 0".to_string()));
        }
        if self.max_decoded_bytes < 1024 * 1024 {
            return Err(ImageError::InvalidFormat("max_decoded_bytes 不能小于 1MB".to_string()));
        }

        Ok(())
    }
}
