//! # 图片分析工具：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              前端 (CLI: 参数 + 标准输入命令)              │
//! │                                                          │
//! │  cli ── CliCommand 解析 ── 每条命令输出一行 JSON          │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ Result<T, AppError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            后端 (Rust)                           │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  ├─ service ──── AnalysisService (会话锁 + 加载器)        │
//! │  │                                                       │
//! │  ├─ session ──── Empty → Loaded → Editing 状态机          │
//! │  │                                                       │
//! │  ├─ image_handler      上传 / URL / Base64 加载·解码·元数据│
//! │  ├─ palette            颜色采样 + 加权 k-means 主色       │
//! │  └─ settings           JSON 设置读取与校验                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，服务层与 CLI 的返回类型 |
//! | [`image_handler`] | 从上传字节 / URL / data URI 加载图片，解码并提取元数据 |
//! | [`palette`] | 统计颜色样本，聚类得到固定数量的主色，十六进制互转 |
//! | [`session`] | 取色会话状态机：载入、取色、编辑色块、重置 |
//! | [`service`] | 串行执行会话命令，网络加载不阻塞其它命令 |
//! | [`settings`] | 加载配置与聚类参数的读取、默认值与校验 |
//! | [`cli`] | 文本命令解析与 JSON 行输出 |

pub mod cli;
pub mod error;
pub mod image_handler;
pub mod palette;
pub mod service;
pub mod session;
pub mod settings;
