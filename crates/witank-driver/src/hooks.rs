//! 命令钩子（Command Hook）
//!
//! 在 dispatcher 放行或拒绝一条命令时触发回调，用于日志、录制和测试观测。
//!
//! 回调在 `send()` 的调用路径上同步执行，实现必须非阻塞；需要做重活的
//! 观察者请使用 [`AsyncCommandLog`]，它把记录推入有界 channel，由消费者
//! 在别的线程/任务中处理。
//!
//! # 使用示例
//!
//! ```rust
//! use witank_driver::hooks::{AsyncCommandLog, CommandHook, HookManager};
//! use std::sync::Arc;
//!
//! let mut hooks = HookManager::new();
//! let (log, rx) = AsyncCommandLog::new();
//! hooks.add_callback(Arc::new(log) as Arc<dyn CommandHook>);
//! assert_eq!(hooks.len(), 1);
//! drop(rx);
//! ```

use crate::locks::RejectReason;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use witank_protocol::{DriveAction, DriveChannel};

/// 一条命令的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub host: String,
    pub channel: DriveChannel,
    pub action: DriveAction,
    /// dispatcher 做出决定的时刻（tokio 时钟）
    pub at: Instant,
}

/// 命令回调 Trait
pub trait CommandHook: Send + Sync {
    /// 命令通过门控、已交给后台任务发送时调用
    fn on_command_dispatched(&self, record: &CommandRecord);

    /// 命令被锁或去抖拒绝时调用（可选）
    fn on_command_rejected(&self, record: &CommandRecord, reason: RejectReason) {
        let _ = (record, reason);
    }
}

/// 钩子管理器
///
/// 回调列表本身不做同步，dispatcher 用 `RwLock<HookManager>` 持有。
#[derive(Default)]
pub struct HookManager {
    callbacks: Vec<Arc<dyn CommandHook>>,
}

impl HookManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// 添加回调
    pub fn add_callback(&mut self, callback: Arc<dyn CommandHook>) {
        self.callbacks.push(callback);
    }

    pub fn trigger_dispatched(&self, record: &CommandRecord) {
        for callback in &self.callbacks {
            callback.on_command_dispatched(record);
        }
    }

    pub fn trigger_rejected(&self, record: &CommandRecord, reason: RejectReason) {
        for callback in &self.callbacks {
            callback.on_command_rejected(record, reason);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }
}

/// 命令日志的单条事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    Dispatched(CommandRecord),
    Rejected(CommandRecord, RejectReason),
}

impl CommandEvent {
    pub fn record(&self) -> &CommandRecord {
        match self {
            CommandEvent::Dispatched(record) => record,
            CommandEvent::Rejected(record, _) => record,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, CommandEvent::Dispatched(_))
    }
}

/// 异步命令日志（有界队列）
///
/// 队列满时丢弃事件并计数，绝不阻塞 dispatcher。
pub struct AsyncCommandLog {
    tx: Sender<CommandEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl AsyncCommandLog {
    /// 默认容量
    pub const DEFAULT_CAPACITY: usize = 4096;

    #[must_use]
    pub fn new() -> (Self, Receiver<CommandEvent>) {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Self, Receiver<CommandEvent>) {
        let (tx, rx) = bounded(capacity);
        let hook = Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        };
        (hook, rx)
    }

    /// 丢弃计数器（可 clone 后在别处监控）
    pub fn dropped_events(&self) -> &Arc<AtomicU64> {
        &self.dropped_events
    }

    fn push(&self, event: CommandEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl CommandHook for AsyncCommandLog {
    fn on_command_dispatched(&self, record: &CommandRecord) {
        self.push(CommandEvent::Dispatched(record.clone()));
    }

    fn on_command_rejected(&self, record: &CommandRecord, reason: RejectReason) {
        self.push(CommandEvent::Rejected(record.clone(), reason));
    }
}
