//! # 图片分析工具：命令行入口
//!
//! 本文件仅负责日志初始化、参数解析与标准输入命令循环。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use image_analysis::cli::{self, CliCommand};
use image_analysis::error::AppError;
use image_analysis::service::AnalysisService;
use image_analysis::settings::AppSettings;

/// 载入图片，查看元数据与主色，并交互式取色。
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON 设置文件（图片加载限制与聚类参数）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 启动时从网络地址载入图片
    #[arg(long, conflicts_with = "file")]
    url: Option<String>,

    /// 启动时从本地文件载入图片
    #[arg(long)]
    file: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("❌ 启动失败: {err}");
            println!("{}", cli::render(Err(err)));
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), AppError> {
    let settings = match &args.config {
        Some(path) => AppSettings::load_from_path(path)?,
        None => AppSettings::default(),
    };
    let service = AnalysisService::new(settings)?;
    let runtime = tokio::runtime::Runtime::new()?;

    let initial = args
        .url
        .map(CliCommand::LoadUrl)
        .or(args.file.map(CliCommand::LoadFile));

    let mut stdout = io::stdout().lock();
    if let Some(command) = initial {
        writeln!(stdout, "{}", cli::render(runtime.block_on(cli::execute(&service, command))))?;
    }

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let result = match line.parse::<CliCommand>() {
            Ok(CliCommand::Quit) => break,
            Ok(command) => runtime.block_on(cli::execute(&service, command)),
            Err(err) => Err(err),
        };
        writeln!(stdout, "{}", cli::render(result))?;
        stdout.flush()?;
    }

    log::info!("👋 会话结束");
    Ok(())
}
