//! RTH 执行器
//!
//! 同一时刻最多一个顶层任务：`execute()` 先取消并等待上一个任务结束，
//! 再启动新任务；`stop()` 取消当前任务并立即 `stop_both`。

use super::planner::{RthPlan, build_path};
use super::{RthConfig, RthEvent, RthReport};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use witank_driver::{CommandDispatcher, HttpTransport, ObstacleSensor};
use witank_protocol::{MotionClass, MotionSegment};

/// 单步执行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepReport {
    pub completed: bool,
    pub interrupted: bool,
    pub debt_ms: u64,
    pub cancelled: bool,
}

/// 任务被取消
#[derive(Debug, Clone, Copy)]
struct Cancelled;

/// 事件出口（有界 channel，满时丢弃并计数）
#[derive(Clone, Default)]
struct EventSink {
    tx: Option<Sender<RthEvent>>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    fn emit(&self, event: RthEvent) {
        if let Some(tx) = &self.tx {
            if tx.try_send(event).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// 回家执行器
pub struct RthExecutor<T: HttpTransport, S: ObstacleSensor> {
    dispatcher: Arc<CommandDispatcher<T>>,
    sensor: Arc<S>,
    config: RthConfig,
    events: EventSink,
    /// 当前任务的取消标志
    cancel: Mutex<Arc<AtomicBool>>,
    job: tokio::sync::Mutex<Option<JoinHandle<RthReport>>>,
    running: Arc<AtomicBool>,
    current: Arc<AtomicU8>,
    last_host: Mutex<Option<String>>,
}

impl<T: HttpTransport, S: ObstacleSensor> RthExecutor<T, S> {
    pub fn new(dispatcher: Arc<CommandDispatcher<T>>, sensor: Arc<S>, config: RthConfig) -> Self {
        Self {
            dispatcher,
            sensor,
            config,
            events: EventSink::default(),
            cancel: Mutex::new(Arc::new(AtomicBool::new(false))),
            job: tokio::sync::Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            current: Arc::new(AtomicU8::new(MotionClass::Idle.into())),
            last_host: Mutex::new(None),
        }
    }

    /// 设置事件出口
    ///
    /// 事件以 `try_send` 推送，channel 满时丢弃，可通过 `dropped_events()` 监控。
    pub fn with_event_sink(mut self, tx: Sender<RthEvent>) -> Self {
        self.events.tx = Some(tx);
        self
    }

    pub fn config(&self) -> &RthConfig {
        &self.config
    }

    pub fn dropped_events(&self) -> u64 {
        self.events.dropped.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 正在回放的运动分类（未运行时为 `Idle`）
    pub fn current_class(&self) -> MotionClass {
        MotionClass::try_from(self.current.load(Ordering::SeqCst)).unwrap_or(MotionClass::Idle)
    }

    /// 启动回家任务
    ///
    /// 空路径为空操作。返回时任务已在后台运行，可用 [`RthExecutor::wait`] 等待结果。
    pub async fn execute(&self, host: &str, segments: &[MotionSegment]) {
        if segments.is_empty() {
            debug!("RTH requested with an empty path, ignoring");
            return;
        }

        let plan = build_path(segments);
        let mut slot = self.take_over().await;
        let cancel = self.install_cancel_flag(host);

        let run = RthRun {
            dispatcher: Arc::clone(&self.dispatcher),
            sensor: Arc::clone(&self.sensor),
            config: self.config,
            host: host.to_string(),
            cancel,
            events: self.events.clone(),
            current: Arc::clone(&self.current),
        };
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);
        *slot = Some(tokio::spawn(async move {
            let report = run.run_path(plan).await;
            running.store(false, Ordering::SeqCst);
            report
        }));
    }

    /// 单独执行一个运动段（带中断与恢复，不掉头、不补偿）
    ///
    /// 在调用方的任务中执行；执行期间同样会被 `stop()` 或新的 `execute()` 取消。
    pub async fn execute_single_step(&self, host: &str, segment: MotionSegment) -> StepReport {
        let slot = self.take_over().await;
        let cancel = self.install_cancel_flag(host);

        let run = RthRun {
            dispatcher: Arc::clone(&self.dispatcher),
            sensor: Arc::clone(&self.sensor),
            config: self.config,
            host: host.to_string(),
            cancel,
            events: self.events.clone(),
            current: Arc::clone(&self.current),
        };

        self.running.store(true, Ordering::SeqCst);
        let mut report = RthReport::default();
        let result = run.run_segment(0, segment, &mut report).await;
        if result.is_err() {
            run.halt();
        }
        self.running.store(false, Ordering::SeqCst);
        drop(slot);

        StepReport {
            completed: report.segments_completed == 1,
            interrupted: report.interruptions > 0,
            debt_ms: report.debt_incurred_ms,
            cancelled: result.is_err(),
        }
    }

    /// 取消当前任务并立即停车（幂等）
    pub async fn stop(&self) {
        drop(self.take_over().await);

        let host = self.last_host.lock().clone();
        if let Some(host) = host {
            self.dispatcher.stop_both(&host);
        }
    }

    /// 等待当前任务结束并取得结果；没有任务时返回 `None`
    pub async fn wait(&self) -> Option<RthReport> {
        let mut slot = self.job.lock().await;
        let handle = slot.as_mut()?;
        let result = handle.await;
        *slot = None;
        match result {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("RTH job ended abnormally: {e}");
                None
            },
        }
    }

    /// 取消并等待上一个任务，返回持有的任务槽
    async fn take_over(&self) -> tokio::sync::MutexGuard<'_, Option<JoinHandle<RthReport>>> {
        // 先取消，让持有任务槽的 wait() 尽快返回
        self.cancel.lock().store(true, Ordering::SeqCst);
        let mut slot = self.job.lock().await;
        // 排队期间可能已有别的调用装入了新任务
        self.cancel.lock().store(true, Ordering::SeqCst);
        if let Some(previous) = slot.take() {
            debug!("Cancelling previous RTH job");
            if let Err(e) = previous.await {
                warn!("Previous RTH job ended abnormally: {e}");
            }
        }
        slot
    }

    fn install_cancel_flag(&self, host: &str) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        *self.cancel.lock() = Arc::clone(&flag);
        *self.last_host.lock() = Some(host.to_string());
        flag
    }
}

impl<T: HttpTransport, S: ObstacleSensor> Drop for RthExecutor<T, S> {
    fn drop(&mut self) {
        self.cancel.get_mut().store(true, Ordering::SeqCst);
    }
}

/// 一次执行的上下文（任务内独占）
struct RthRun<T: HttpTransport, S: ObstacleSensor> {
    dispatcher: Arc<CommandDispatcher<T>>,
    sensor: Arc<S>,
    config: RthConfig,
    host: String,
    cancel: Arc<AtomicBool>,
    events: EventSink,
    current: Arc<AtomicU8>,
}

impl<T: HttpTransport, S: ObstacleSensor> RthRun<T, S> {
    async fn run_path(self, plan: RthPlan) -> RthReport {
        let mut report = RthReport {
            segments_planned: plan.segments.len(),
            ..Default::default()
        };
        info!(
            "RTH started: {} segments, rotate={}",
            plan.segments.len(),
            plan.rotate
        );
        self.events.emit(RthEvent::Started {
            segments: plan.segments.len(),
            rotate: plan.rotate,
        });

        let result = self.run_plan(&plan, &mut report).await;

        // 任何结局都以 stop_both 收尾
        self.halt();
        report.cancelled = result.is_err();
        report.final_debt_ms = report
            .debt_incurred_ms
            .saturating_sub(report.compensated_ms);
        info!(
            "RTH finished: {}/{} segments, debt {} ms, cancelled={}",
            report.segments_completed,
            report.segments_planned,
            report.debt_incurred_ms,
            report.cancelled
        );
        self.events.emit(RthEvent::Finished {
            cancelled: report.cancelled,
        });
        report
    }

    async fn run_plan(&self, plan: &RthPlan, report: &mut RthReport) -> Result<(), Cancelled> {
        if plan.rotate {
            self.rotate_180().await?;
        }
        for (index, segment) in plan.segments.iter().enumerate() {
            self.run_segment(index, *segment, report).await?;
        }
        if report.debt_incurred_ms > report.compensated_ms {
            self.compensate(report).await?;
        }
        if plan.rotate {
            self.rotate_180().await?;
        }
        Ok(())
    }

    /// 执行一个运动段；前进段遇到 Danger 时中断、记债并恢复
    async fn run_segment(
        &self,
        index: usize,
        segment: MotionSegment,
        report: &mut RthReport,
    ) -> Result<(), Cancelled> {
        self.halt();
        self.sleep(self.config.hard_reset_settle_ms).await?;

        self.drive(segment.class);
        self.events.emit(RthEvent::SegmentStarted { index, segment });

        let slice = self.config.slice_ms;
        let mut elapsed = 0;
        while elapsed < segment.duration_ms {
            if segment.class.has_forward_intent() && self.sensor.is_danger() {
                let debt_ms = segment.duration_ms - elapsed;
                report.debt_incurred_ms += debt_ms;
                report.interruptions += 1;
                warn!(
                    "Obstacle during {} after {elapsed} ms, {debt_ms} ms of travel skipped",
                    segment.class
                );
                self.events.emit(RthEvent::Interrupted { index, debt_ms });
                return self.recover(debt_ms).await;
            }
            let step = slice.min(segment.duration_ms - elapsed);
            self.sleep(step).await?;
            elapsed += step;
        }

        self.halt();
        self.sleep(self.config.segment_settle_ms).await?;
        report.segments_completed += 1;
        self.events.emit(RthEvent::SegmentCompleted { index });
        Ok(())
    }

    /// 后退脱离：距离回到安全余量以上，或后退时长达到本次时间债为止
    async fn recover(&self, debt_ms: u64) -> Result<(), Cancelled> {
        self.halt();
        self.sleep(self.config.recovery_settle_ms).await?;

        let burst = self.config.recovery_burst_ms;
        let clearance_cm = self
            .sensor
            .danger_threshold_cm()
            .saturating_add(self.config.recovery_margin_cm);
        let mut backed_off = 0;
        while backed_off < debt_ms && self.within(clearance_cm) {
            let step = burst.min(debt_ms - backed_off);
            self.drive(MotionClass::StraightReverse);
            self.sleep(step).await?;
            backed_off += step;
        }
        debug!("Recovery backed off {backed_off} ms");
        self.events.emit(RthEvent::Recovery {
            backed_off_ms: backed_off,
        });

        self.halt();
        self.sleep(self.config.segment_settle_ms).await
    }

    /// 路径结束后按剩余时间债后退补偿，距离进入 Danger 或信号丢失即停
    async fn compensate(&self, report: &mut RthReport) -> Result<(), Cancelled> {
        let debt = report.debt_incurred_ms - report.compensated_ms;
        let burst = self.config.compensation_burst_ms;
        let danger_cm = self.sensor.danger_threshold_cm();
        let mut compensated = 0;
        while compensated < debt && self.beyond(danger_cm) {
            let step = burst.min(debt - compensated);
            self.drive(MotionClass::StraightReverse);
            self.sleep(step).await?;
            compensated += step;
            report.compensated_ms += step;
        }
        debug!("Compensated {compensated} of {debt} ms debt");
        self.events.emit(RthEvent::Compensation {
            compensated_ms: compensated,
        });

        self.halt();
        self.sleep(self.config.segment_settle_ms).await
    }

    /// 原地右转掉头，随后一次前进微推让履带回正
    async fn rotate_180(&self) -> Result<(), Cancelled> {
        self.events.emit(RthEvent::Rotation);
        self.drive(MotionClass::PivotRight);
        self.sleep(self.config.rotate_ms).await?;

        self.halt();
        self.sleep(self.config.rotate_settle_ms).await?;

        self.drive(MotionClass::StraightForward);
        self.sleep(self.config.nudge_ms).await?;

        self.halt();
        self.sleep(self.config.segment_settle_ms).await
    }

    fn drive(&self, class: MotionClass) {
        self.current.store(class.into(), Ordering::SeqCst);
        self.dispatcher.drive_class(&self.host, class);
    }

    fn halt(&self) {
        self.current.store(MotionClass::Idle.into(), Ordering::SeqCst);
        self.dispatcher.stop_both(&self.host);
    }

    /// 距离 ≤ `cm`（无读数视为否）
    fn within(&self, cm: u32) -> bool {
        self.sensor.distance_cm().is_some_and(|d| d <= cm)
    }

    /// 距离 > `cm`（无读数视为否）
    fn beyond(&self, cm: u32) -> bool {
        self.sensor.distance_cm().is_some_and(|d| d > cm)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// 按切片睡眠，每次挂起前后检查取消标志
    async fn sleep(&self, total_ms: u64) -> Result<(), Cancelled> {
        let slice = self.config.slice_ms.max(1);
        let mut remaining = total_ms;
        loop {
            if self.is_cancelled() {
                return Err(Cancelled);
            }
            if remaining == 0 {
                return Ok(());
            }
            let step = slice.min(remaining);
            tokio::time::sleep(Duration::from_millis(step)).await;
            remaining -= step;
        }
    }
}
