//! 设备扫描命令

use super::config::CliConfig;
use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use std::path::Path;
use std::sync::Arc;
use witank_driver::{DeviceScanner, ModelMatch, ReqwestTransport, ScanOutcome};

/// 目标型号
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModelArg {
    /// 摄像头模块（CAM）
    #[default]
    Camera,
    /// 电机控制器（RC）
    Controller,
    /// 任意型号
    Any,
}

impl From<ModelArg> for ModelMatch {
    fn from(model: ModelArg) -> Self {
        match model {
            ModelArg::Camera => ModelMatch::Camera,
            ModelArg::Controller => ModelMatch::Controller,
            ModelArg::Any => ModelMatch::Any,
        }
    }
}

/// 扫描命令参数
#[derive(Args, Debug)]
pub struct ScanCommand {
    /// 基地址（同网段任意 IP，通常为本机 IP）
    #[arg(long)]
    pub base: Option<String>,

    /// 探测密钥
    #[arg(long)]
    pub secret: Option<String>,

    /// 目标型号
    #[arg(long, value_enum, default_value_t = ModelArg::Camera)]
    pub model: ModelArg,

    /// 将找到的地址保存为默认控制器地址
    #[arg(long)]
    pub save: bool,
}

impl ScanCommand {
    pub async fn execute(self, mut config: CliConfig, path: &Path) -> Result<()> {
        let base = self
            .base
            .or_else(|| config.default.base_ip.clone())
            .context("未设置扫描基地址，请使用 --base 或 `witank-cli config set --base-ip <IP>`")?;
        let secret = self
            .secret
            .or_else(|| config.default.secret.clone())
            .context("未设置探测密钥，请使用 --secret 或 `witank-cli config set --secret <KEY>`")?;

        let transport = Arc::new(ReqwestTransport::new().context("创建 HTTP 客户端失败")?);
        let scanner = DeviceScanner::new(transport, config.scan);

        let mut progress = scanner.progress();
        let reporter = tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let p = *progress.borrow_and_update();
                eprint!("\r扫描中: {:>3.0}% ({}/{})", p.fraction() * 100.0, p.completed, p.total);
            }
        });

        println!("🔍 扫描 {base} 所在网段...");
        let matcher = ModelMatch::from(self.model);
        let outcome = tokio::select! {
            outcome = scanner.scan(&base, &secret, &matcher) => outcome?,
            _ = tokio::signal::ctrl_c() => {
                scanner.cancel();
                reporter.abort();
                eprintln!();
                bail!("扫描已取消");
            },
        };
        reporter.abort();
        eprintln!();

        let device = match outcome {
            ScanOutcome::Found(device) => device,
            ScanOutcome::NotFound => bail!("未找到匹配的设备"),
        };

        println!("✅ 找到设备: {}", device.host);
        println!("  型号: {}", device.model.as_deref().unwrap_or("(未知)"));
        println!("  标识: {}", device.identifier);

        if self.save {
            config.default.host = Some(device.host.clone());
            config.save_to(path)?;
            println!("💾 已保存为默认控制器地址");
        }
        Ok(())
    }
}
