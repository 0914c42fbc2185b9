//! 驱动层运行指标
//!
//! 原子计数器，任何任务都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// 驱动层实时指标
#[derive(Debug, Default)]
pub struct DriverMetrics {
    /// 通过门控并交给后台发送的命令数
    pub commands_dispatched: AtomicU64,
    /// 被锁或去抖拒绝的命令数
    pub commands_rejected: AtomicU64,
    /// 发送失败的命令数（含超时）
    pub command_failures: AtomicU64,
    /// 其中超时的次数
    pub command_timeouts: AtomicU64,
    /// 成功的距离读取数
    pub distance_reads: AtomicU64,
    /// 失败的距离读取数（传输或解析）
    pub distance_failures: AtomicU64,
}

impl DriverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_dispatched: self.commands_dispatched.load(Ordering::Relaxed),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            command_failures: self.command_failures.load(Ordering::Relaxed),
            command_timeouts: self.command_timeouts.load(Ordering::Relaxed),
            distance_reads: self.distance_reads.load(Ordering::Relaxed),
            distance_failures: self.distance_failures.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.commands_dispatched.store(0, Ordering::Relaxed);
        self.commands_rejected.store(0, Ordering::Relaxed);
        self.command_failures.store(0, Ordering::Relaxed);
        self.command_timeouts.store(0, Ordering::Relaxed);
        self.distance_reads.store(0, Ordering::Relaxed);
        self.distance_failures.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub commands_dispatched: u64,
    pub commands_rejected: u64,
    pub command_failures: u64,
    pub command_timeouts: u64,
    pub distance_reads: u64,
    pub distance_failures: u64,
}

impl MetricsSnapshot {
    /// 距离读取失败率（百分比），没有任何读取时为 0.0
    pub fn distance_failure_rate(&self) -> f64 {
        let total = self.distance_reads + self.distance_failures;
        if total == 0 {
            return 0.0;
        }
        (self.distance_failures as f64 / total as f64) * 100.0
    }
}
