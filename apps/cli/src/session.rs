//! 单次命令会话
//!
//! 每个子命令：解析目标地址 → 创建传输与分发器 → 执行 → 等待在途命令发送完毕。

use crate::commands::config::CliConfig;
use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;
use witank_driver::{
    AsyncCommandLog, CommandDispatcher, CommandEvent, ProximityMonitor, ReqwestTransport,
};

/// 目标控制器参数
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// 控制器地址（覆盖配置）
    #[arg(long)]
    pub host: Option<String>,
}

/// 命令行参数优先，其次是配置文件
pub fn resolve_host(target: &TargetArgs, config: &CliConfig) -> Result<String> {
    target
        .host
        .clone()
        .or_else(|| config.default.host.clone())
        .map(|host| host.trim().to_string())
        .filter(|host| !host.is_empty())
        .context("未设置控制器地址，请使用 --host 或 `witank-cli config set --host <IP>`")
}

/// 命令跟踪参数
#[derive(Args, Debug, Clone, Default)]
pub struct TraceArgs {
    /// 把每条放行/拒绝的驱动命令打印到 stderr
    #[arg(long)]
    pub trace_commands: bool,
}

fn format_command_event(event: &CommandEvent) -> String {
    let record = event.record();
    match event {
        CommandEvent::Dispatched(_) => format!("→ {}/{}", record.channel, record.action),
        CommandEvent::Rejected(_, reason) => {
            format!("✗ {}/{} ({reason:?})", record.channel, record.action)
        },
    }
}

pub struct Session {
    pub config: CliConfig,
    pub host: String,
    pub transport: Arc<ReqwestTransport>,
    pub dispatcher: Arc<CommandDispatcher<ReqwestTransport>>,
}

impl Session {
    pub fn open(target: &TargetArgs, config: &CliConfig) -> Result<Self> {
        let host = resolve_host(target, config)?;
        let transport = Arc::new(ReqwestTransport::new().context("创建 HTTP 客户端失败")?);
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&transport),
            config.dispatcher,
        ));
        Ok(Self {
            config: config.clone(),
            host,
            transport,
            dispatcher,
        })
    }

    /// 共享同一传输的距离监视器
    pub fn monitor(&self) -> Arc<ProximityMonitor<ReqwestTransport>> {
        Arc::new(ProximityMonitor::new(
            Arc::clone(&self.transport),
            self.config.proximity,
        ))
    }

    /// 注册命令日志钩子，由后台线程打印；返回丢弃计数
    ///
    /// 线程随分发器释放而退出。
    pub fn trace_commands(&self, trace: &TraceArgs) -> Option<Arc<AtomicU64>> {
        if !trace.trace_commands {
            return None;
        }
        let (log, rx) = AsyncCommandLog::new();
        let dropped = Arc::clone(log.dropped_events());
        self.dispatcher.add_hook(Arc::new(log));
        std::thread::spawn(move || {
            for event in rx {
                eprintln!("{}", format_command_event(&event));
            }
        });
        Some(dropped)
    }

    /// 跟踪队列溢出时告警
    pub fn report_trace(dropped: Option<&Arc<AtomicU64>>) {
        let dropped = dropped.map_or(0, |counter| counter.load(Ordering::Relaxed));
        if dropped > 0 {
            warn!("Command trace dropped {dropped} event(s)");
        }
    }

    /// 等待在途命令，超时只告警
    pub async fn finish(&self) {
        let limit = self.config.dispatcher.command_timeout();
        if !self.dispatcher.flush(limit).await {
            warn!(
                "{} command(s) still in flight after {limit:?}",
                self.dispatcher.in_flight()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_overrides_config() {
        let mut config = CliConfig::default();
        config.default.host = Some("192.168.4.1".to_string());

        let target = TargetArgs {
            host: Some(" 10.0.0.2 ".to_string()),
        };
        assert_eq!(resolve_host(&target, &config).unwrap(), "10.0.0.2");
        assert_eq!(
            resolve_host(&TargetArgs::default(), &config).unwrap(),
            "192.168.4.1"
        );
    }

    #[test]
    fn test_format_command_event() {
        use witank_driver::{CommandRecord, RejectReason};
        use witank_protocol::{DriveAction, DriveChannel};

        let record = CommandRecord {
            host: "192.168.4.1".to_string(),
            channel: DriveChannel::A,
            action: DriveAction::Forward,
            at: tokio::time::Instant::now(),
        };
        assert_eq!(
            format_command_event(&CommandEvent::Dispatched(record.clone())),
            "→ a/maju"
        );
        let rejected = CommandEvent::Rejected(record, RejectReason::HardForwardBlock);
        assert!(format_command_event(&rejected).contains("HardForwardBlock"));
    }

    #[test]
    fn test_missing_host_is_an_error() {
        let err = resolve_host(&TargetArgs::default(), &CliConfig::default()).unwrap_err();
        assert!(err.to_string().contains("--host"));
    }
}
