//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理不同来源（上传 / URL / Base64）的原始字节加载，并在“尽可能早”的阶段执行输入校验。
//! 目标是尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - 上传：声明类型（仅 PNG/JPEG）+ 体积 + 文件签名校验。
//! - URL：协议 + 主机安全 + 内容类型 + 体积校验 + 流式下载，整体受总超时约束。
//! - Base64：格式解析 + 解码前体积估算 + 签名校验。
//! - 网络错误统一映射到 `ImageError`，便于上层处理。

use base64::{Engine as _, engine::general_purpose};
use rand::Rng;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tokio::net::lookup_host;

use super::source::RawImageData;
use super::{ImageConfig, ImageError, ImageHandler, ImageSource};

const STREAM_SIGNATURE_PROBE_BYTES: usize = 4096;
const NETWORK_RETRY_MAX_ATTEMPTS: u8 = 3;
const NETWORK_RETRY_BASE_DELAY_MS: u64 = 180;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;
const UPLOAD_MIME_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/jpg"];
const UPLOAD_SIGNATURES: [&str; 2] = ["image/png", "image/jpeg"];

impl ImageHandler {
    /// 按来源加载原始字节。
    pub(super) async fn load_raw(
        &self,
        source: &ImageSource,
        config: &ImageConfig,
    ) -> Result<RawImageData, ImageError> {
        match source {
            ImageSource::Upload {
                bytes,
                mime,
                filename,
            } => Self::load_from_upload(bytes, mime, filename.clone(), config),
            ImageSource::Url(url) => self.load_from_url(url, config).await,
            ImageSource::Base64(data) => Self::load_from_base64(data, config),
        }
    }

    /// 校验上传的字节流。
    fn load_from_upload(
        bytes: &[u8],
        mime: &str,
        filename: Option<String>,
        config: &ImageConfig,
    ) -> Result<RawImageData, ImageError> {
        log::info!("📤 开始处理上传图片 - 类型: {} 大小: {} bytes", mime, bytes.len());

        let declared = mime.trim().to_ascii_lowercase();
        if !UPLOAD_MIME_TYPES.contains(&declared.as_str()) {
            return Err(ImageError::UnsupportedFormat(format!(
                "上传仅支持 PNG/JPEG，收到：{}",
                mime
            )));
        }

        if bytes.len() as u64 > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "上传文件过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
        Self::validate_upload_signature(bytes)?;

        Ok(RawImageData {
            bytes: bytes.to_vec(),
            source_hint: "upload",
            filename,
        })
    }

    /// 从 URL 加载图片原始字节，整个下载过程受 `download_timeout` 约束。
    async fn load_from_url(
        &self,
        url: &str,
        config: &ImageConfig,
    ) -> Result<RawImageData, ImageError> {
        log::info!("🌐 开始下载图片 - URL: {}", Self::redact_url_for_log(url));

        Self::validate_url_safety(url, config).await?;

        let budget = Duration::from_secs(config.download_timeout);
        let bytes = tokio::time::timeout(budget, self.download_with_validation(url, config))
            .await
            .map_err(|_| {
                ImageError::Timeout(format!("下载超时（{}秒）", config.download_timeout))
            })??;
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "url",
            filename: Self::filename_from_url(url),
        })
    }

    /// 从 Base64 字符串加载图片原始字节。
    fn load_from_base64(data: &str, config: &ImageConfig) -> Result<RawImageData, ImageError> {
        log::info!("📝 开始处理 base64 图片");

        let bytes = Self::parse_base64_with_limit(data, config.max_file_size)?;

        if bytes.len() as u64 > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "Base64 解码后体积过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "base64",
            filename: None,
        })
    }

    /// 读取本地文件并包装为上传来源（命令行前端使用）。
    ///
    /// 声明类型由文件签名推断，后续仍按上传规则校验。
    pub fn read_upload_file(path: &Path, config: &ImageConfig) -> Result<ImageSource, ImageError> {
        log::info!("📁 开始读取本地图片 - 路径: {}", path.display());

        if !path.exists() {
            return Err(ImageError::FileSystem(format!("文件不存在：{}", path.display())));
        }

        let metadata = std::fs::metadata(path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取文件信息：{}", e)))?;

        if metadata.len() > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = std::fs::read(path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取图片文件：{}", e)))?;
        let mime = infer::get(&bytes)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        Ok(ImageSource::Upload {
            bytes,
            mime,
            filename,
        })
    }

    /// 执行带校验的网络下载。
    ///
    /// 手动处理重定向，每一跳都重新做安全校验；使用流式读取控制内存峰值。
    async fn download_with_validation(
        &self,
        url: &str,
        config: &ImageConfig,
    ) -> Result<Vec<u8>, ImageError> {
        let mut current_url = reqwest::Url::parse(url)
            .map_err(|e| ImageError::InvalidFormat(format!("URL 格式错误：{}", e)))?;
        let client = Self::build_http_client(config)?;

        for redirect_count in 0..=config.max_redirects {
            let response = self.send_with_retry(&client, &current_url, config).await?;

            if response.status().is_redirection() {
                if redirect_count >= config.max_redirects {
                    return Err(ImageError::Network(format!(
                        "重定向次数超过限制（{}）",
                        config.max_redirects
                    )));
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .ok_or_else(|| ImageError::Network("重定向响应缺少 Location 头".to_string()))?;

                let location_str = location
                    .to_str()
                    .map_err(|e| ImageError::InvalidFormat(format!("重定向地址无效：{}", e)))?;

                let next_url = current_url
                    .join(location_str)
                    .map_err(|e| ImageError::InvalidFormat(format!("重定向 URL 解析失败：{}", e)))?;

                Self::validate_url_safety(next_url.as_str(), config).await?;

                log::debug!("↪️ 跳转到: {}", Self::redact_url_for_log(next_url.as_str()));
                current_url = next_url;
                continue;
            }

            if !response.status().is_success() {
                return Err(ImageError::Network(format!(
                    "HTTP {}: {}",
                    response.status().as_u16(),
                    Self::status_message(response.status().as_u16())
                )));
            }

            if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE) {
                if let Ok(ct_str) = ct.to_str() {
                    if !Self::is_image_content_type(ct_str) {
                        return Err(ImageError::InvalidFormat(format!("不是图片类型：{}", ct_str)));
                    }
                }
            }

            let total_len = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|cl| cl.to_str().ok())
                .and_then(|cl| cl.parse::<u64>().ok());

            if let Some(size) = total_len {
                if size > config.max_file_size {
                    return Err(ImageError::ResourceLimit(format!(
                        "文件过大：{:.2} MB（限制：{:.2} MB）",
                        size as f64 / 1024.0 / 1024.0,
                        config.max_file_size as f64 / 1024.0 / 1024.0
                    )));
                }
            }

            return Self::read_body_with_limits(response, total_len, config).await;
        }

        Err(ImageError::Network("下载流程异常结束".to_string()))
    }

    /// 发送请求；连接类错误与可重试状态码按指数退避重试。
    async fn send_with_retry(
        &self,
        client: &reqwest::Client,
        url: &reqwest::Url,
        config: &ImageConfig,
    ) -> Result<reqwest::Response, ImageError> {
        let mut attempt: u8 = 1;
        loop {
            match client
                .get(url.clone())
                .header(reqwest::header::ACCEPT, "image/png,image/jpeg,image/*;q=0.8")
                .send()
                .await
            {
                Ok(resp) => {
                    if attempt < NETWORK_RETRY_MAX_ATTEMPTS
                        && Self::is_retryable_http_status(resp.status())
                    {
                        let delay_ms = Self::compute_retry_delay_with_jitter(attempt);
                        log::warn!(
                            "⚠️ HTTP {}（第 {}/{} 次，可重试）；{}ms 后重试",
                            resp.status().as_u16(),
                            attempt,
                            NETWORK_RETRY_MAX_ATTEMPTS,
                            delay_ms
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        attempt = attempt.saturating_add(1);
                        continue;
                    }

                    return Ok(resp);
                }
                Err(err) => {
                    if attempt >= NETWORK_RETRY_MAX_ATTEMPTS || !(err.is_timeout() || err.is_connect()) {
                        return Err(Self::map_reqwest_error(err, url.as_str(), config));
                    }

                    let delay_ms = Self::compute_retry_delay_with_jitter(attempt);
                    log::warn!(
                        "⚠️ 网络请求失败（第 {}/{} 次，可重试）：{}；{}ms 后重试",
                        attempt,
                        NETWORK_RETRY_MAX_ATTEMPTS,
                        Self::sanitize_error_message_with_redacted_url(&err.to_string(), url.as_str()),
                        delay_ms
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// 分块读取响应体：首包/分块各自超时，累计体积超限立即失败。
    async fn read_body_with_limits(
        mut response: reqwest::Response,
        total_len: Option<u64>,
        config: &ImageConfig,
    ) -> Result<Vec<u8>, ImageError> {
        let initial_capacity = total_len
            .map(|len| len.min(config.max_file_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut total: u64 = 0;
        let mut signature_validated = false;
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(config.stream_first_byte_timeout_ms)
            };

            let next_chunk_result = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        ImageError::Timeout("下载数据流读取超时".to_string())
                    } else {
                        ImageError::Timeout("下载首包超时".to_string())
                    }
                })?;

            let Some(chunk) = next_chunk_result
                .map_err(|e| ImageError::Network(format!("下载失败：{}", e)))?
            else {
                break;
            };

            received_first_chunk = true;

            total = total.saturating_add(chunk.len() as u64);
            if total > config.max_file_size {
                return Err(ImageError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);

            if !signature_validated {
                signature_validated =
                    Self::validate_stream_signature_probe(&buffer, STREAM_SIGNATURE_PROBE_BYTES)?;
            }
        }

        log::debug!("✅ 下载完成 - {} bytes", total);
        Ok(buffer)
    }

    fn build_http_client(config: &ImageConfig) -> Result<reqwest::Client, ImageError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ImageError::Network(format!("无法创建 HTTP 客户端：{}", e)))
    }

    fn compute_retry_delay_with_jitter(attempt: u8) -> u64 {
        let base = NETWORK_RETRY_BASE_DELAY_MS
            .saturating_mul(1_u64 << (attempt.saturating_sub(1) as u32));
        let jitter_bound = (base / 2).max(1);
        base.saturating_add(rand::rng().random_range(0..=jitter_bound))
    }

    fn is_retryable_http_status(status: reqwest::StatusCode) -> bool {
        status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
    }

    fn is_image_content_type(content_type: &str) -> bool {
        content_type
            .split(';')
            .next()
            .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false)
    }

    /// 去掉 query 与 fragment，避免日志泄露令牌。
    pub(crate) fn redact_url_for_log(url: &str) -> String {
        let Ok(parsed) = reqwest::Url::parse(url) else {
            return "<invalid-url>".to_string();
        };

        let host = parsed.host_str().unwrap_or("<unknown-host>");
        let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

        format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
    }

    fn filename_from_url(url: &str) -> Option<String> {
        let parsed = reqwest::Url::parse(url).ok()?;
        parsed
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .last()
            .map(|segment| segment.to_string())
    }

    /// 校验 URL 安全性。
    ///
    /// 默认阻止本地/内网目标，防止 SSRF 风险。
    async fn validate_url_safety(url: &str, config: &ImageConfig) -> Result<(), ImageError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ImageError::InvalidFormat(format!("URL 格式错误：{}", e)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ImageError::InvalidFormat("仅支持 HTTP/HTTPS".to_string()));
        }

        if config.allow_private_network {
            return Ok(());
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ImageError::InvalidFormat("URL 缺少主机地址".to_string()))?;

        if Self::is_local_hostname(host) {
            return Err(ImageError::InvalidFormat(format!("禁止访问本地网络地址：{}", host)));
        }

        let literal = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = literal.parse::<IpAddr>() {
            if Self::is_private_or_local_ip(ip) {
                return Err(ImageError::InvalidFormat(format!("禁止访问内网 IP：{}", ip)));
            }

            return Ok(());
        }

        if config.resolve_dns_for_url_safety {
            let port = parsed
                .port_or_known_default()
                .ok_or_else(|| ImageError::InvalidFormat("URL 缺少端口信息".to_string()))?;

            let addrs = lookup_host((host, port))
                .await
                .map_err(|e| ImageError::Network(format!("URL 主机解析失败：{}", e)))?;

            let mut resolved_any = false;
            for addr in addrs {
                if Self::is_private_or_local_ip(addr.ip()) {
                    return Err(ImageError::InvalidFormat(format!(
                        "URL 解析结果命中内网地址：{}",
                        addr.ip()
                    )));
                }
                resolved_any = true;
            }

            if !resolved_any {
                return Err(ImageError::Network("URL 未解析到有效地址".to_string()));
            }
        }

        Ok(())
    }

    fn is_local_hostname(host: &str) -> bool {
        host.eq_ignore_ascii_case("localhost")
            || host.eq_ignore_ascii_case("localhost.")
            || host.ends_with(".local")
    }

    /// 判断 IP 是否属于本地/内网/链路本地等受限范围。
    fn is_private_or_local_ip(ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => {
                if v4.is_private()
                    || v4.is_loopback()
                    || v4.is_link_local()
                    || v4.is_broadcast()
                    || v4.is_documentation()
                    || v4.is_unspecified()
                    || v4.is_multicast()
                {
                    return true;
                }

                let octets = v4.octets();
                // 100.64.0.0/10 运营商级 NAT
                octets[0] == 0 || (octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000)
            }
            IpAddr::V6(v6) => {
                v6.is_loopback()
                    || v6.is_unspecified()
                    || v6.is_unique_local()
                    || v6.is_unicast_link_local()
                    || v6.is_multicast()
            }
        }
    }

    fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, ImageError> {
        let len = base64_data.trim().len() as u64;
        let groups = len
            .checked_add(3)
            .ok_or_else(|| ImageError::ResourceLimit("Base64 输入长度溢出".to_string()))?
            / 4;

        groups
            .checked_mul(3)
            .ok_or_else(|| ImageError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
    }

    /// 解析 Base64 输入（支持 `data:image/...;base64,` 前缀与纯 Base64）。
    pub(crate) fn parse_base64_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, ImageError> {
        let normalized = data.trim();

        let payload = if normalized.starts_with("data:") {
            if !normalized.starts_with("data:image/") {
                return Err(ImageError::UnsupportedFormat("Data URL 不是图片类型".to_string()));
            }
            let base64_start = normalized
                .find(";base64,")
                .ok_or_else(|| ImageError::InvalidFormat("缺少 base64 标记".to_string()))?;
            &normalized[base64_start + ";base64,".len()..]
        } else {
            normalized
        };

        let estimated_len = Self::estimate_base64_decoded_upper_bound_len(payload)?;
        if estimated_len > max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated_len as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| ImageError::Decode(format!("Base64 解码失败：{}", e)))
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(e: reqwest::Error, url: &str, config: &ImageConfig) -> ImageError {
        let err_msg = Self::sanitize_error_message_with_redacted_url(&e.to_string(), url);

        if e.is_timeout() {
            ImageError::Timeout(format!("下载超时（{}秒）", config.download_timeout))
        } else if e.is_connect() {
            ImageError::Network(format!("无法连接：{}", err_msg))
        } else {
            ImageError::Network(format!("请求失败：{}", err_msg))
        }
    }

    fn sanitize_error_message_with_redacted_url(error_msg: &str, url: &str) -> String {
        error_msg.replace(url, &Self::redact_url_for_log(url))
    }

    fn status_message(code: u16) -> &'static str {
        match code {
            404 => "未找到",
            403 => "访问被拒绝",
            500..=599 => "服务器错误",
            _ => "请求失败",
        }
    }

    /// 通过文件签名（magic bytes）校验输入是否为图片。
    fn validate_image_signature(bytes: &[u8]) -> Result<(), ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::InvalidFormat("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| ImageError::InvalidFormat("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(ImageError::InvalidFormat(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }

    /// 上传内容的实际签名也必须是 PNG/JPEG，声明类型不可信。
    fn validate_upload_signature(bytes: &[u8]) -> Result<(), ImageError> {
        Self::validate_image_signature(bytes)?;

        let detected = infer::get(bytes)
            .map(|kind| kind.mime_type())
            .unwrap_or("unknown");
        if !UPLOAD_SIGNATURES.contains(&detected) {
            return Err(ImageError::UnsupportedFormat(format!(
                "上传仅支持 PNG/JPEG，实际内容为：{}",
                detected
            )));
        }

        Ok(())
    }

    /// 流式下载阶段的签名探测：尽早识别并拒绝非图片内容。
    ///
    /// 返回值：
    /// - `Ok(true)`：已识别为图片
    /// - `Ok(false)`：当前字节不足以判断，继续下载
    /// - `Err(...)`：已识别为非图片，或达到探测上限仍无法识别
    fn validate_stream_signature_probe(bytes: &[u8], probe_limit: usize) -> Result<bool, ImageError> {
        if bytes.is_empty() {
            return Ok(false);
        }

        if let Some(kind) = infer::get(bytes) {
            if kind.matcher_type() != infer::MatcherType::Image {
                return Err(ImageError::InvalidFormat(format!(
                    "下载内容不是图片类型：{}",
                    kind.mime_type()
                )));
            }
            return Ok(true);
        }

        if bytes.len() >= probe_limit {
            return Err(ImageError::InvalidFormat(format!(
                "下载前 {} 字节内无法识别图片类型",
                probe_limit
            )));
        }

        Ok(false)
    }
}
