//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，汇总图片加载、调色板、会话三层的错误，
//! 再加上配置与文件 I/O。服务层与 CLI 统一返回 `Result<T, AppError>`，
//! 前端通过 `Serialize` 获得结构化的错误信息（code / stage / message）。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为各模块错误提供 `From` 转换，`?` 即可向上传递。
//! - `kind()` 给出面向用户的错误大类（LoadError、ColorParseError 等）。

use serde::Serialize;
use serde::ser::SerializeStruct;

use crate::image_handler::ImageError;
use crate::palette::PaletteError;
use crate::session::SessionError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 图片加载流水线错误（下载 / 读取 / 校验 / 解码）
    #[error("{0}")]
    Image(#[from] ImageError),

    /// 会话命令被拒绝
    #[error("{0}")]
    Session(#[from] SessionError),

    /// 调色板计算或颜色解析失败
    #[error("{0}")]
    Palette(#[from] PaletteError),

    /// 文件或标准输入输出的 I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置文件缺失、格式错误或取值越界
    #[error("配置错误: {0}")]
    Config(String),

    /// 无法识别的交互命令
    #[error("命令错误: {0}")]
    Command(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Image(inner) => inner.code(),
            Self::Session(inner) => inner.code(),
            Self::Palette(inner) => inner.code(),
            Self::Io(_) => "E_IO",
            Self::Config(_) => "E_CONFIG",
            Self::Command(_) => "E_COMMAND",
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Image(inner) => inner.stage(),
            Self::Session(SessionError::Palette(_)) | Self::Palette(_) => "palette",
            Self::Session(_) => "session",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
            Self::Command(_) => "command",
        }
    }

    /// 面向用户的错误大类。
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Image(_) => "LoadError",
            Self::Session(SessionError::Palette(inner)) | Self::Palette(inner) => palette_kind(inner),
            Self::Session(SessionError::CoordinateOutOfBounds { .. }) => "CoordinateOutOfBoundsError",
            Self::Session(_) => "SessionError",
            Self::Io(_) => "IoError",
            Self::Config(_) => "ConfigError",
            Self::Command(_) => "CommandError",
        }
    }
}

fn palette_kind(error: &PaletteError) -> &'static str {
    match error {
        PaletteError::InsufficientData { .. } => "InsufficientDataError",
        PaletteError::ColorParse(_) => "ColorParseError",
    }
}

/// 序列化为 `{ kind, code, stage, message }`。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("AppError", 4)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("stage", self.stage())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_errors_keep_code_and_stage() {
        let err = AppError::from(ImageError::Network("连接失败".to_string()));
        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["kind"], "LoadError");
        assert_eq!(json["code"], "E_NETWORK");
        assert_eq!(json["stage"], "download");
        assert_eq!(json["message"], err.to_string());
    }

    #[test]
    fn palette_errors_nested_in_session_are_classified() {
        let err = AppError::from(SessionError::Palette(PaletteError::InsufficientData {
            distinct: 2,
            requested: 5,
        }));

        assert_eq!(err.kind(), "InsufficientDataError");
        assert_eq!(err.code(), "E_INSUFFICIENT_DATA");
        assert_eq!(err.stage(), "palette");
    }

    #[test]
    fn coordinate_errors_are_classified() {
        let err = AppError::from(SessionError::CoordinateOutOfBounds {
            x: 5,
            y: 0,
            width: 2,
            height: 2,
        });

        assert_eq!(err.kind(), "CoordinateOutOfBoundsError");
        assert_eq!(err.stage(), "session");
        assert!(err.to_string().contains("(5, 0)"));
    }

    #[test]
    fn color_parse_error_kind() {
        let err = AppError::from(PaletteError::ColorParse("xyz".to_string()));
        assert_eq!(err.kind(), "ColorParseError");
    }

    #[test]
    fn io_errors_are_not_reported_as_config() {
        let err = AppError::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout closed"));
        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["kind"], "IoError");
        assert_eq!(json["code"], "E_IO");
        assert_eq!(json["stage"], "io");
    }
}
