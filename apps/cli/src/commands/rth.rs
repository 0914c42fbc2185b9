//! 回家命令
//!
//! 路径文本来自 `record` 的输出（如 `SF:1000,PR:300`）。执行期间按 Ctrl-C
//! 会取消任务并立即停车。

use super::config::CliConfig;
use crate::session::{Session, TargetArgs, TraceArgs};
use anyhow::{Context, Result, bail};
use clap::Args;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use witank_client::{RthEvent, RthExecutor, RthReport};
use witank_protocol::parse_path;

/// 回家命令参数
#[derive(Args, Debug)]
pub struct RthCommand {
    /// 路径文本（逗号分隔的 `<短码>:<毫秒>`）
    #[arg(long, conflicts_with = "file")]
    pub path: Option<String>,

    /// 从文件读取路径文本
    #[arg(long)]
    pub file: Option<PathBuf>,

    #[command(flatten)]
    pub trace: TraceArgs,

    #[command(flatten)]
    pub target: TargetArgs,
}

fn describe(event: &RthEvent) -> String {
    match event {
        RthEvent::Started { segments, rotate } => {
            let turn = if *rotate { "，先掉头" } else { "" };
            format!("🏠 开始回家: {segments} 段{turn}")
        },
        RthEvent::Rotation => "↩️  掉头".to_string(),
        RthEvent::SegmentStarted { index, segment } => format!("▶️  第 {} 段 {segment}", index + 1),
        RthEvent::SegmentCompleted { index } => format!("✔️  第 {} 段完成", index + 1),
        RthEvent::Interrupted { index, debt_ms } => {
            format!("⚠️  第 {} 段遇到障碍，跳过 {debt_ms} ms", index + 1)
        },
        RthEvent::Recovery { backed_off_ms } => format!("↘️  后退脱离 {backed_off_ms} ms"),
        RthEvent::Compensation { compensated_ms } => format!("↘️  补偿后退 {compensated_ms} ms"),
        RthEvent::Finished { cancelled: true } => "🛑 已取消".to_string(),
        RthEvent::Finished { cancelled: false } => "✅ 到达".to_string(),
    }
}

fn summarize(report: &RthReport) -> String {
    format!(
        "完成 {}/{} 段，中断 {} 次，时间债 {} ms（已补偿 {} ms，剩余 {} ms）",
        report.segments_completed,
        report.segments_planned,
        report.interruptions,
        report.debt_incurred_ms,
        report.compensated_ms,
        report.final_debt_ms
    )
}

impl RthCommand {
    fn path_text(&self) -> Result<String> {
        match (&self.path, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(file)) => fs::read_to_string(file)
                .with_context(|| format!("读取路径文件失败: {}", file.display())),
            (None, None) => bail!("需要 --path 或 --file"),
        }
    }

    pub async fn execute(&self, config: &CliConfig) -> Result<()> {
        let segments = parse_path(&self.path_text()?).context("路径格式错误")?;
        if segments.is_empty() {
            println!("路径为空，无需回家");
            return Ok(());
        }

        let session = Session::open(&self.target, config)?;
        let trace_dropped = session.trace_commands(&self.trace);
        let monitor = session.monitor();
        if let Err(e) = monitor.poll_once(&session.host).await {
            warn!("Initial distance read failed: {e}");
        }
        monitor.start_polling(&session.host);
        // 回家依靠自身的距离检查，锁定标志会吞掉恢复阶段的后退命令
        session.dispatcher.locks().clear();

        let (tx, rx) = crossbeam_channel::bounded(256);
        let printer = std::thread::spawn(move || {
            for event in rx {
                println!("{}", describe(&event));
            }
        });

        let executor = RthExecutor::new(
            Arc::clone(&session.dispatcher),
            Arc::clone(&monitor),
            config.rth,
        )
        .with_event_sink(tx);
        executor.execute(&session.host, &segments).await;

        let report = tokio::select! {
            report = executor.wait() => report,
            _ = tokio::signal::ctrl_c() => {
                executor.stop().await;
                None
            },
        };

        monitor.stop_polling();
        drop(executor);
        if printer.join().is_err() {
            warn!("Event printer thread panicked");
        }
        session.finish().await;
        Session::report_trace(trace_dropped.as_ref());

        if let Some(report) = report {
            println!("{}", summarize(&report));
        }
        Ok(())
    }
}
