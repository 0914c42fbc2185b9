//! 距离传感器轮询与安全分级
//!
//! [`ProximityMonitor`] 以固定间隔读取控制器的 `/distance`，把最新读数按两个
//! 阈值（`danger_cm < warning_cm`）分为 Safe / Warning / Danger 三级。
//!
//! # 失效安全
//!
//! - 从未收到有效读数：保持 Safe，距离为 `None`
//! - 收到过有效读数后读取失败：按 [`DropoutPolicy`] 处理（默认升级为 Danger），
//!   直到下一个有效读数到来
//!
//! # 并发模型
//!
//! 快照通过 `ArcSwap` 发布：单写者（轮询任务），读者无锁。
//! 安全等级变化另外通过 `tokio::sync::watch` 推送给订阅者。

use crate::error::DriverError;
use crate::metrics::DriverMetrics;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use witank_http::HttpTransport;
use witank_protocol::{SafetyState, distance_url, parse_distance};

/// 轮询间隔允许范围（毫秒）
pub const POLL_INTERVAL_RANGE_MS: std::ops::RangeInclusive<u64> = 80..=300;

/// 信号丢失时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropoutPolicy {
    /// 升级为 Danger（失效安全）
    #[default]
    EscalateToDanger,
    /// 保持上一次的安全等级
    HoldLast,
}

/// 距离监视器配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    pub poll_interval_ms: u64,
    pub read_timeout_ms: u64,
    /// 距离 ≤ 该值为 Danger
    pub danger_cm: u32,
    /// 距离 ≤ 该值为 Warning
    pub warning_cm: u32,
    /// 离开更严重等级时需要额外超出阈值的距离，0 表示不做滞回
    pub hysteresis_cm: u32,
    pub dropout: DropoutPolicy,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 300,
            read_timeout_ms: 1500,
            danger_cm: 2,
            warning_cm: 18,
            hysteresis_cm: 2,
            dropout: DropoutPolicy::EscalateToDanger,
        }
    }
}

impl ProximityConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if !POLL_INTERVAL_RANGE_MS.contains(&self.poll_interval_ms) {
            return Err(DriverError::InvalidConfig(format!(
                "poll_interval_ms must be within {}..={}, got {}",
                POLL_INTERVAL_RANGE_MS.start(),
                POLL_INTERVAL_RANGE_MS.end(),
                self.poll_interval_ms
            )));
        }
        if self.danger_cm >= self.warning_cm {
            return Err(DriverError::InvalidConfig(format!(
                "danger_cm ({}) must be below warning_cm ({})",
                self.danger_cm, self.warning_cm
            )));
        }
        if self.read_timeout_ms == 0 {
            return Err(DriverError::InvalidConfig(
                "read_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

fn level(distance_cm: u32, danger_cm: u32, warning_cm: u32) -> SafetyState {
    if distance_cm <= danger_cm {
        SafetyState::Danger
    } else if distance_cm <= warning_cm {
        SafetyState::Warning
    } else {
        SafetyState::Safe
    }
}

/// 带滞回的安全分级
///
/// 变得更严重时立即生效；变得更安全时，读数必须超过原等级的阈值
/// `hysteresis_cm` 以上才会降级。
pub fn classify(distance_cm: u32, previous: SafetyState, config: &ProximityConfig) -> SafetyState {
    let raw = level(distance_cm, config.danger_cm, config.warning_cm);
    if raw >= previous {
        return raw;
    }
    let sticky = level(
        distance_cm,
        config.danger_cm.saturating_add(config.hysteresis_cm),
        config.warning_cm.saturating_add(config.hysteresis_cm),
    );
    raw.max(sticky.min(previous))
}

/// 距离快照（作为整体原子发布）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProximitySnapshot {
    /// 当前读数；从未读到或信号丢失时为 `None`
    pub distance_cm: Option<u32>,
    pub safety: SafetyState,
    /// 是否收到过至少一个有效读数
    pub has_signal: bool,
    /// 最近一次有效读数的时间
    pub updated_at: Option<Instant>,
}

/// 障碍物传感器接口（RTH 执行器通过它读取距离）
pub trait ObstacleSensor: Send + Sync + 'static {
    /// 最新距离（厘米）
    fn distance_cm(&self) -> Option<u32>;

    fn is_danger(&self) -> bool;

    fn is_warning(&self) -> bool;

    /// Danger 阈值（厘米）
    fn danger_threshold_cm(&self) -> u32;
}

struct Poller {
    host: String,
    task: JoinHandle<()>,
}

/// 距离监视器
pub struct ProximityMonitor<T: HttpTransport> {
    transport: Arc<T>,
    config: ProximityConfig,
    snapshot: ArcSwap<ProximitySnapshot>,
    /// 串行化快照写入
    write_lock: Mutex<()>,
    state_tx: watch::Sender<SafetyState>,
    poller: Mutex<Option<Poller>>,
    metrics: Arc<DriverMetrics>,
}

impl<T: HttpTransport> ProximityMonitor<T> {
    pub fn new(transport: Arc<T>, config: ProximityConfig) -> Self {
        let (state_tx, _) = watch::channel(SafetyState::Safe);
        Self {
            transport,
            config,
            snapshot: ArcSwap::from_pointee(ProximitySnapshot::default()),
            write_lock: Mutex::new(()),
            state_tx,
            poller: Mutex::new(None),
            metrics: Arc::new(DriverMetrics::new()),
        }
    }

    pub fn config(&self) -> &ProximityConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<DriverMetrics> {
        &self.metrics
    }

    pub fn snapshot(&self) -> Arc<ProximitySnapshot> {
        self.snapshot.load_full()
    }

    pub fn distance(&self) -> Option<u32> {
        self.snapshot.load().distance_cm
    }

    pub fn safety_state(&self) -> SafetyState {
        self.snapshot.load().safety
    }

    pub fn is_danger(&self) -> bool {
        self.safety_state() == SafetyState::Danger
    }

    pub fn is_warning(&self) -> bool {
        self.safety_state() == SafetyState::Warning
    }

    /// 订阅安全等级变化
    pub fn subscribe(&self) -> watch::Receiver<SafetyState> {
        self.state_tx.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .as_ref()
            .is_some_and(|poller| !poller.task.is_finished())
    }

    /// 开始轮询
    ///
    /// 对同一 host 重复调用不会产生第二个轮询任务；换 host 时先停止旧任务。
    /// 轮询任务只持有 `Weak` 引用，监视器被释放后任务自行退出。
    pub fn start_polling(self: &Arc<Self>, host: &str) {
        let mut poller = self.poller.lock();
        if let Some(existing) = poller.as_ref() {
            if existing.host == host && !existing.task.is_finished() {
                debug!("Proximity polling already running for {host}");
                return;
            }
        }
        if let Some(previous) = poller.take() {
            previous.task.abort();
        }

        let weak = Arc::downgrade(self);
        let interval = self.config.poll_interval();
        let task_host = host.to_string();
        let Ok(runtime) = Handle::try_current() else {
            warn!("No tokio runtime, proximity polling for {host} not started");
            return;
        };
        let task = runtime.spawn(poll_loop(weak, task_host, interval));
        *poller = Some(Poller {
            host: host.to_string(),
            task,
        });
        info!("Proximity polling started for {host} every {interval:?}");
    }

    /// 停止轮询（幂等）
    pub fn stop_polling(&self) {
        if let Some(poller) = self.poller.lock().take() {
            poller.task.abort();
            info!("Proximity polling stopped for {}", poller.host);
        }
    }

    /// 执行一次读取并更新状态
    ///
    /// 读取失败时按失效安全规则更新状态，同时把错误返回给调用方。
    pub async fn poll_once(&self, host: &str) -> Result<u32, DriverError> {
        let url = distance_url(host);
        let result = match self.transport.get(&url, self.config.read_timeout()).await {
            Ok(body) => parse_distance(&body).map_err(DriverError::from),
            Err(e) => Err(DriverError::from(e)),
        };

        match &result {
            Ok(distance) => {
                self.metrics.distance_reads.fetch_add(1, Ordering::Relaxed);
                self.apply_reading(*distance);
            },
            Err(e) => {
                self.metrics.distance_failures.fetch_add(1, Ordering::Relaxed);
                debug!("Distance read from {host} failed: {e}");
                self.apply_dropout();
            },
        }
        result
    }

    fn apply_reading(&self, distance_cm: u32) {
        let _guard = self.write_lock.lock();
        let previous = self.snapshot.load();
        // 信号丢失后的首个读数直接按阈值重新分级，不对合成的等级做滞回
        let baseline = if previous.distance_cm.is_some() {
            previous.safety
        } else {
            SafetyState::Safe
        };
        let safety = classify(distance_cm, baseline, &self.config);
        self.snapshot.store(Arc::new(ProximitySnapshot {
            distance_cm: Some(distance_cm),
            safety,
            has_signal: true,
            updated_at: Some(Instant::now()),
        }));
        self.publish(previous.safety, safety, distance_cm);
    }

    fn apply_dropout(&self) {
        let _guard = self.write_lock.lock();
        let previous = self.snapshot.load();
        if !previous.has_signal {
            return;
        }

        let safety = match self.config.dropout {
            DropoutPolicy::EscalateToDanger => SafetyState::Danger,
            DropoutPolicy::HoldLast => previous.safety,
        };
        if safety != previous.safety {
            warn!("Distance signal lost, escalating {} -> {}", previous.safety, safety);
        }
        self.snapshot.store(Arc::new(ProximitySnapshot {
            distance_cm: None,
            safety,
            has_signal: true,
            updated_at: previous.updated_at,
        }));
        self.state_tx.send_if_modified(|current| {
            if *current == safety {
                return false;
            }
            *current = safety;
            true
        });
    }

    fn publish(&self, previous: SafetyState, safety: SafetyState, distance_cm: u32) {
        if previous != safety {
            info!("Safety state {previous} -> {safety} at {distance_cm} cm");
        }
        self.state_tx.send_if_modified(|current| {
            if *current == safety {
                return false;
            }
            *current = safety;
            true
        });
    }
}

impl<T: HttpTransport> Drop for ProximityMonitor<T> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.get_mut().take() {
            poller.task.abort();
        }
    }
}

impl<T: HttpTransport> ObstacleSensor for ProximityMonitor<T> {
    fn distance_cm(&self) -> Option<u32> {
        self.distance()
    }

    fn is_danger(&self) -> bool {
        ProximityMonitor::is_danger(self)
    }

    fn is_warning(&self) -> bool {
        ProximityMonitor::is_warning(self)
    }

    fn danger_threshold_cm(&self) -> u32 {
        self.config.danger_cm
    }
}

async fn poll_loop<T: HttpTransport>(
    monitor: Weak<ProximityMonitor<T>>,
    host: String,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(monitor) = monitor.upgrade() else {
            debug!("Proximity monitor dropped, poll loop exiting");
            return;
        };
        // 错误已在 poll_once 内部记录
        let _ = monitor.poll_once(&host).await;
    }
}
