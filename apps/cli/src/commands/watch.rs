//! 距离监视命令

use super::config::CliConfig;
use crate::session::{Session, TargetArgs};
use anyhow::Result;
use clap::Args;
use tokio::time::MissedTickBehavior;
use witank_driver::ProximitySnapshot;

/// 监视命令参数
#[derive(Args, Debug)]
pub struct WatchCommand {
    /// 显示指定次数后退出（默认直到 Ctrl-C）
    #[arg(short, long)]
    pub count: Option<u64>,

    #[command(flatten)]
    pub target: TargetArgs,
}

fn format_snapshot(snapshot: &ProximitySnapshot) -> String {
    match snapshot.distance_cm {
        Some(cm) => format!("{cm:>4} cm  {}", snapshot.safety),
        None if snapshot.has_signal => format!("   - cm  {} (信号丢失)", snapshot.safety),
        None => "   - cm  (等待首个读数)".to_string(),
    }
}

impl WatchCommand {
    pub async fn execute(&self, config: &CliConfig) -> Result<()> {
        let session = Session::open(&self.target, config)?;
        let monitor = session.monitor();
        monitor.start_polling(&session.host);

        let mut ticker = tokio::time::interval(config.proximity.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shown = 0;

        println!("📡 监视 {}（Ctrl-C 退出）", session.host);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    println!("{}", format_snapshot(&monitor.snapshot()));
                    shown += 1;
                    if self.count.is_some_and(|count| shown >= count) {
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        monitor.stop_polling();
        let metrics = monitor.metrics().snapshot();
        println!(
            "读数 {} 次，失败 {} 次（{:.1}%）",
            metrics.distance_reads,
            metrics.distance_failures,
            metrics.distance_failure_rate()
        );
        Ok(())
    }
}
