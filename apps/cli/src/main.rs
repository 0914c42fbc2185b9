//! # WiTank CLI
//!
//! e-WiTank 履带车命令行工具。
//!
//! ```bash
//! # 在车辆热点上扫描控制器并保存地址
//! witank-cli scan --base 192.168.4.2 --secret 1234 --model controller --save
//!
//! # 单条命令与急停
//! witank-cli drive a maju --for-ms 500
//! witank-cli stop
//!
//! # 录制一段遥控路径，然后按路径回家
//! witank-cli record
//! witank-cli rth --path "SF:1000,PR:300"
//! ```
//!
//! 配置文件位于 `~/.config/witank/config.toml`，命令行参数优先。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod session;

use commands::config::{CliConfig, config_file};
use commands::{
    ConfigCommand, DriveCommand, RecordCommand, RthCommand, ScanCommand, StopCommand,
    WatchCommand,
};

/// WiTank CLI - 履带车命令行工具
#[derive(Parser, Debug)]
#[command(name = "witank-cli")]
#[command(about = "Command-line interface for e-WiTank vehicles", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/witank/config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 扫描 /24 网段寻找控制器或摄像头
    Scan {
        #[command(flatten)]
        args: ScanCommand,
    },

    /// 向单个通道发送一条命令
    Drive {
        #[command(flatten)]
        args: DriveCommand,
    },

    /// 两个通道同时停止
    Stop {
        #[command(flatten)]
        args: StopCommand,
    },

    /// 持续显示距离与安全等级
    Watch {
        #[command(flatten)]
        args: WatchCommand,
    },

    /// 从标准输入遥控并录制路径
    Record {
        #[command(flatten)]
        args: RecordCommand,
    },

    /// 按录制的路径回家
    Rth {
        #[command(flatten)]
        args: RthCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("witank_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let path = match cli.config {
        Some(path) => path,
        None => config_file()?,
    };

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&path),

        Commands::Scan { args } => {
            let config = CliConfig::load_from(&path)?;
            args.execute(config, &path).await
        },

        Commands::Drive { args } => args.execute(&CliConfig::load_from(&path)?).await,

        Commands::Stop { args } => args.execute(&CliConfig::load_from(&path)?).await,

        Commands::Watch { args } => args.execute(&CliConfig::load_from(&path)?).await,

        Commands::Record { args } => args.execute(&CliConfig::load_from(&path)?).await,

        Commands::Rth { args } => args.execute(&CliConfig::load_from(&path)?).await,
    }
}
