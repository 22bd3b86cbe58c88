//! # 交互命令层
//!
//! ## 设计思路
//!
//! 命令层只做“文本命令 → 服务调用 → JSON 行”的转换，不承载业务逻辑。
//! 每条命令固定输出一行 JSON：
//!
//! - 成功：`{"ok":true,"outcome":{...},"view":{...}}`
//! - 失败：`{"ok":false,"error":{"kind","code","stage","message"}}`

use std::path::PathBuf;
use std::str::FromStr;

use serde_json::{Value, json};

use crate::error::AppError;
use crate::service::AnalysisService;
use crate::session::SwatchTarget;

pub const HELP_LINES: &[&str] = &[
    "load-url <url>                  从网络地址载入图片",
    "load-file <path>                从本地文件载入图片（PNG / JPEG）",
    "load-data <data-uri>            从 base64 data URI 载入图片",
    "pick <x> <y>                    在像素坐标处取色",
    "edit palette|picked <i> <#hex>  修改主色或取色结果中的第 i 项",
    "show                            输出当前会话",
    "reset                           清空会话",
    "help                            显示本帮助",
    "quit                            退出",
];

/// 一条交互命令。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    LoadUrl(String),
    LoadFile(PathBuf),
    LoadData(String),
    Pick { x: u32, y: u32 },
    Edit { target: SwatchTarget, index: usize, hex: String },
    Show,
    Reset,
    Help,
    Quit,
}

impl FromStr for CliCommand {
    type Err = AppError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, rest) = line
            .split_once(char::is_whitespace)
            .map(|(name, rest)| (name, rest.trim()))
            .unwrap_or((line, ""));
        let args: Vec<&str> = rest.split_whitespace().collect();

        let command = match (name, args.as_slice()) {
            // 路径与 data URI 可能包含空格，取整段剩余文本
            ("load-url", [_]) => Self::LoadUrl(rest.to_string()),
            ("load-file", [_, ..]) => Self::LoadFile(PathBuf::from(rest)),
            ("load-data", [_, ..]) => Self::LoadData(rest.to_string()),
            ("pick", [x, y]) => Self::Pick {
                x: parse_number(x, "x")?,
                y: parse_number(y, "y")?,
            },
            ("edit", [target, index, hex]) => Self::Edit {
                target: parse_target(target)?,
                index: parse_number(index, "index")?,
                hex: hex.to_string(),
            },
            ("show", []) => Self::Show,
            ("reset", []) => Self::Reset,
            ("help", []) => Self::Help,
            ("quit" | "exit", []) => Self::Quit,
            _ => return Err(AppError::Command(format!("无法识别的命令：{}（输入 help 查看用法）", line))),
        };

        Ok(command)
    }
}

fn parse_number<T: FromStr>(value: &str, name: &str) -> Result<T, AppError> {
    value
        .parse()
        .map_err(|_| AppError::Command(format!("{} 不是有效的非负整数：{}", name, value)))
}

fn parse_target(value: &str) -> Result<SwatchTarget, AppError> {
    match value {
        "palette" => Ok(SwatchTarget::Palette),
        "picked" => Ok(SwatchTarget::Picked),
        other => Err(AppError::Command(format!("编辑目标必须是 palette 或 picked：{}", other))),
    }
}

/// 执行一条命令并返回成功时的 JSON 行内容。`Quit` 由调用方处理。
pub async fn execute(service: &AnalysisService, command: CliCommand) -> Result<Value, AppError> {
    let outcome = match command {
        CliCommand::LoadUrl(url) => Some(service.load_url(url).await?),
        CliCommand::LoadFile(path) => Some(service.load_file(&path).await?),
        CliCommand::LoadData(data) => Some(service.load_data_uri(data).await?),
        CliCommand::Pick { x, y } => Some(service.pick(x, y)?),
        CliCommand::Edit { target, index, hex } => Some(service.edit_swatch(target, index, &hex)?),
        CliCommand::Reset => Some(service.reset()?),
        CliCommand::Show | CliCommand::Quit => None,
        CliCommand::Help => return Ok(json!({ "ok": true, "help": HELP_LINES })),
    };

    let view = service.view()?;
    Ok(match outcome {
        Some(outcome) => json!({ "ok": true, "outcome": outcome, "view": view }),
        None => json!({ "ok": true, "view": view }),
    })
}

/// 将执行结果渲染为一行 JSON。
pub fn render(result: Result<Value, AppError>) -> String {
    let value = match result {
        Ok(value) => value,
        Err(err) => {
            log::warn!("⚠️ 命令失败 [{}] {}", err.code(), err);
            json!({ "ok": false, "error": err })
        }
    };
    value.to_string()
}
