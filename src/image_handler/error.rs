//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载图片加载链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//! 对外语义上，这里的任一分支都属于“加载失败”（LoadError）。

/// 图片加载统一错误类型。
///
/// 该类型会在应用层被上转为 `AppError`，最终输出给前端。
#[derive(Debug, Clone, thiserror::Error)]
pub enum ImageError {
    #[error("网络错误：{0}")]
    Network(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("不支持的图片类型：{0}")]
    UnsupportedFormat(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),
}

impl ImageError {
    /// 稳定错误码，供前端按类型展示。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::UnsupportedFormat(_) => "E_UNSUPPORTED_FORMAT",
            Self::FileSystem(_) => "E_FILE",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
        }
    }

    /// 出错所处阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::Timeout(_) => "download",
            Self::FileSystem(_) => "read",
            Self::InvalidFormat(_) | Self::UnsupportedFormat(_) => "validate",
            Self::Decode(_) | Self::ResourceLimit(_) => "decode",
        }
    }
}

