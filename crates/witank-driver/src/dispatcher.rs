//! 命令分发器
//!
//! 所有驱动命令到达执行器的唯一通道。职责：
//!
//! - 锁定门控（紧急锁 / 硬前进阻断 / 软前进阻断），见 [`LockState::gate`]
//! - 去抖：与上一条命令完全相同的 `(channel, action)` 在间隔内不重发
//! - fire-and-forget 发送：每条命令一个后台任务，失败只记录不上抛
//! - 自动停止看门狗：延迟执行 `stop_both`，重新布防会取消上一次
//!
//! 门控先于去抖检查，被锁拒绝的命令不会刷新去抖状态。

use crate::error::DriverError;
use crate::hooks::{CommandHook, CommandRecord, HookManager};
use crate::locks::{LockFlags, LockState, RejectReason};
use crate::metrics::DriverMetrics;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use witank_http::HttpTransport;
use witank_protocol::{DriveAction, DriveChannel, MotionClass, drive_url};

/// 分发器配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 正常去抖间隔（毫秒）
    pub debounce_ms: u64,
    /// 慢速模式下的去抖间隔（毫秒）
    pub slow_debounce_ms: u64,
    /// 单条命令的 HTTP 超时（毫秒）
    pub command_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 120,
            slow_debounce_ms: 180,
            command_timeout_ms: 1200,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.command_timeout_ms == 0 {
            return Err(DriverError::InvalidConfig(
                "command_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.slow_debounce_ms < self.debounce_ms {
            return Err(DriverError::InvalidConfig(format!(
                "slow_debounce_ms ({}) must not be shorter than debounce_ms ({})",
                self.slow_debounce_ms, self.debounce_ms
            )));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// `send()` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// 已交给后台任务发送（不代表执行器已收到）
    Dispatched,
    /// 被拒绝，未产生网络请求
    Rejected(RejectReason),
}

impl SendOutcome {
    pub fn is_dispatched(self) -> bool {
        matches!(self, SendOutcome::Dispatched)
    }
}

/// 上一条放行的命令
#[derive(Debug, Clone, Copy)]
struct LastCommand {
    channel: DriveChannel,
    action: DriveAction,
    at: Instant,
}

/// 命令分发器
///
/// 按 `Arc<CommandDispatcher<T>>` 在手动驾驶、安全联锁和 RTH 之间共享。
/// `send()` 是同步调用，但需要在 tokio 运行时内执行（后台发送任务由当前
/// 运行时承载）；运行时之外调用时命令会被记为失败并丢弃。
pub struct CommandDispatcher<T: HttpTransport> {
    transport: Arc<T>,
    config: DispatcherConfig,
    locks: LockFlags,
    last: Mutex<Option<LastCommand>>,
    auto_stop: Mutex<Option<JoinHandle<()>>>,
    hooks: RwLock<HookManager>,
    metrics: Arc<DriverMetrics>,
    /// 尚未完成的后台发送数
    in_flight: Arc<AtomicUsize>,
}

impl<T: HttpTransport> CommandDispatcher<T> {
    pub fn new(transport: Arc<T>, config: DispatcherConfig) -> Self {
        Self {
            transport,
            config,
            locks: LockFlags::new(),
            last: Mutex::new(None),
            auto_stop: Mutex::new(None),
            hooks: RwLock::new(HookManager::new()),
            metrics: Arc::new(DriverMetrics::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// 锁定标志（可由外部直接设置）
    pub fn locks(&self) -> &LockFlags {
        &self.locks
    }

    pub fn metrics(&self) -> &Arc<DriverMetrics> {
        &self.metrics
    }

    /// 注册命令回调
    pub fn add_hook(&self, hook: Arc<dyn CommandHook>) {
        self.hooks.write().add_callback(hook);
    }

    /// 当前锁定状态下某个运动分类是否会被放行
    pub fn admits_class(&self, class: MotionClass) -> bool {
        self.locks.snapshot().admits_class(class)
    }

    /// 当前生效的去抖间隔
    pub fn debounce_interval(&self) -> Duration {
        if self.locks.is_slow_mode() {
            Duration::from_millis(self.config.slow_debounce_ms)
        } else {
            Duration::from_millis(self.config.debounce_ms)
        }
    }

    /// 发送单通道命令
    ///
    /// 从不返回错误；网络失败在后台任务中记录后丢弃。
    pub fn send(&self, host: &str, channel: DriveChannel, action: DriveAction) -> SendOutcome {
        let now = Instant::now();
        let record = CommandRecord {
            host: host.to_string(),
            channel,
            action,
            at: now,
        };

        if let Some(reason) = self.check(channel, action, now) {
            self.metrics.commands_rejected.fetch_add(1, Ordering::Relaxed);
            debug!("Command {channel}/{action:?} rejected: {reason:?}");
            self.hooks.read().trigger_rejected(&record, reason);
            return SendOutcome::Rejected(reason);
        }

        self.metrics.commands_dispatched.fetch_add(1, Ordering::Relaxed);
        self.hooks.read().trigger_dispatched(&record);
        self.spawn_request(drive_url(host, channel, action));
        SendOutcome::Dispatched
    }

    /// 两个通道都发送 `stop`
    pub fn stop_both(&self, host: &str) -> [SendOutcome; 2] {
        [
            self.send(host, DriveChannel::A, DriveAction::Stop),
            self.send(host, DriveChannel::B, DriveAction::Stop),
        ]
    }

    /// 按运动分类同时驱动两个通道（`Idle` 即 `stop_both`）
    pub fn drive_class(&self, host: &str, class: MotionClass) -> [SendOutcome; 2] {
        let (a, b) = class.actions();
        [
            self.send(host, DriveChannel::A, a),
            self.send(host, DriveChannel::B, b),
        ]
    }

    /// 布防自动停止看门狗
    ///
    /// `delay` 后执行一次 `stop_both(host)`；再次调用会取消尚未触发的上一次。
    pub fn auto_stop(self: &Arc<Self>, host: &str, delay: Duration) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("auto_stop called outside a tokio runtime, watchdog not armed");
            return;
        };

        let this = Arc::clone(self);
        let host = host.to_string();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Auto-stop fired for {host}");
            this.stop_both(&host);
        });

        if let Some(previous) = self.auto_stop.lock().replace(task) {
            previous.abort();
        }
    }

    /// 撤销看门狗，返回是否有待触发的看门狗被撤销
    pub fn cancel_auto_stop(&self) -> bool {
        match self.auto_stop.lock().take() {
            Some(task) => {
                let pending = !task.is_finished();
                task.abort();
                pending
            },
            None => false,
        }
    }

    /// 尚未完成的后台发送数
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// 等待已放行的命令发送完毕，最多等待 `limit`
    ///
    /// 一次性命令行调用在退出运行时之前需要它。返回是否全部完成。
    pub async fn flush(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    /// 门控 + 去抖（同一临界区内检查并更新）
    fn check(&self, channel: DriveChannel, action: DriveAction, now: Instant) -> Option<RejectReason> {
        let locks: LockState = self.locks.snapshot();
        if let Some(reason) = locks.gate(action) {
            return Some(reason);
        }

        let interval = self.debounce_interval();
        let mut last = self.last.lock();
        if let Some(previous) = *last {
            let same_key = previous.channel == channel && previous.action == action;
            if same_key && now.duration_since(previous.at) < interval {
                return Some(RejectReason::Debounced);
            }
        }
        *last = Some(LastCommand {
            channel,
            action,
            at: now,
        });
        None
    }

    fn spawn_request(&self, url: String) {
        let Ok(runtime) = Handle::try_current() else {
            self.metrics.command_failures.fetch_add(1, Ordering::Relaxed);
            warn!("Command {url} dropped: no tokio runtime");
            return;
        };

        let transport = Arc::clone(&self.transport);
        let metrics = Arc::clone(&self.metrics);
        let in_flight = Arc::clone(&self.in_flight);
        let timeout = self.config.command_timeout();
        in_flight.fetch_add(1, Ordering::SeqCst);
        runtime.spawn(async move {
            let result = transport.get(&url, timeout).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            match result {
                Ok(_) => trace!("Command {url} delivered"),
                Err(e) => {
                    metrics.command_failures.fetch_add(1, Ordering::Relaxed);
                    if e.is_timeout() {
                        metrics.command_timeouts.fetch_add(1, Ordering::Relaxed);
                    }
                    debug!("Command {url} failed: {e}");
                },
            }
        });
    }
}
