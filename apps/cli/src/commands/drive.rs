//! 单条驱动命令与停车

use super::config::CliConfig;
use crate::session::{Session, TargetArgs};
use anyhow::Result;
use clap::Args;
use std::time::Duration;
use witank_driver::SendOutcome;
use witank_protocol::{DriveAction, DriveChannel};

fn parse_channel(s: &str) -> Result<DriveChannel, String> {
    DriveChannel::try_from(s).map_err(|e| e.to_string())
}

fn parse_action(s: &str) -> Result<DriveAction, String> {
    DriveAction::try_from(s).map_err(|e| e.to_string())
}

fn report(channel: DriveChannel, action: DriveAction, outcome: SendOutcome) {
    match outcome {
        SendOutcome::Dispatched => println!("➡️  {channel}/{action}"),
        SendOutcome::Rejected(reason) => println!("⛔ {channel}/{action} 被拒绝: {reason:?}"),
    }
}

/// 驱动命令参数
#[derive(Args, Debug)]
pub struct DriveCommand {
    /// 通道（a / b）
    #[arg(value_parser = parse_channel)]
    pub channel: DriveChannel,

    /// 动作（maju / mundur / stop）
    #[arg(value_parser = parse_action)]
    pub action: DriveAction,

    /// 保持指定毫秒后自动对该通道发送 stop
    #[arg(long)]
    pub for_ms: Option<u64>,

    #[command(flatten)]
    pub target: TargetArgs,
}

impl DriveCommand {
    pub async fn execute(&self, config: &CliConfig) -> Result<()> {
        let session = Session::open(&self.target, config)?;
        let dispatcher = &session.dispatcher;

        let outcome = dispatcher.send(&session.host, self.channel, self.action);
        report(self.channel, self.action, outcome);

        if let Some(ms) = self.for_ms {
            if outcome.is_dispatched() && !self.action.is_stop() {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                let stop = dispatcher.send(&session.host, self.channel, DriveAction::Stop);
                report(self.channel, DriveAction::Stop, stop);
            }
        }

        session.finish().await;
        Ok(())
    }
}

/// 停车命令参数
#[derive(Args, Debug)]
pub struct StopCommand {
    #[command(flatten)]
    pub target: TargetArgs,
}

impl StopCommand {
    pub async fn execute(&self, config: &CliConfig) -> Result<()> {
        let session = Session::open(&self.target, config)?;

        println!("🛑 两个通道停止...");
        let [a, b] = session.dispatcher.stop_both(&session.host);
        report(DriveChannel::A, DriveAction::Stop, a);
        report(DriveChannel::B, DriveAction::Stop, b);

        session.finish().await;
        let failures = session.dispatcher.metrics().snapshot().command_failures;
        if failures > 0 {
            println!("⚠️  {failures} 条命令发送失败");
        } else {
            println!("✅ 停车完成");
        }
        Ok(())
    }
}
