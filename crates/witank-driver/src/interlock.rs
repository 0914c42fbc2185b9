//! 安全联锁
//!
//! 把距离监视器的安全等级映射到分发器的锁定标志（见 [`LockState::for_safety`]），
//! 进入 Danger 时额外发送一次 `stop_both`。
//!
//! 仅用于手动驾驶；RTH 自己检查距离，启动 RTH 前应先 `disengage()` 并清除标志，
//! 否则紧急锁会拦下恢复阶段的后退命令。

use crate::dispatcher::CommandDispatcher;
use crate::locks::LockState;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use witank_http::HttpTransport;
use witank_protocol::SafetyState;

/// 安全联锁任务句柄
pub struct SafetyInterlock {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SafetyInterlock {
    /// 启动联锁任务
    ///
    /// 立即应用订阅时的当前等级，之后跟随每次变化。必须在 tokio 运行时内调用。
    pub fn engage<T: HttpTransport>(
        mut states: watch::Receiver<SafetyState>,
        dispatcher: Arc<CommandDispatcher<T>>,
        host: &str,
    ) -> Self {
        let host = host.to_string();
        let task = tokio::spawn(async move {
            let mut previous = SafetyState::Safe;
            let mut current = *states.borrow_and_update();
            loop {
                apply(&dispatcher, &host, previous, current);
                previous = current;
                if states.changed().await.is_err() {
                    debug!("Safety state channel closed, interlock exiting");
                    return;
                }
                current = *states.borrow_and_update();
            }
        });
        info!("Safety interlock engaged");
        Self {
            task: Mutex::new(Some(task)),
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|task| !task.is_finished())
    }

    /// 停止联锁任务（幂等）；不会清除已设置的锁定标志
    pub fn disengage(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!("Safety interlock disengaged");
        }
    }
}

impl Drop for SafetyInterlock {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

fn apply<T: HttpTransport>(
    dispatcher: &CommandDispatcher<T>,
    host: &str,
    previous: SafetyState,
    current: SafetyState,
) {
    dispatcher.locks().apply(LockState::for_safety(current));
    if current == SafetyState::Danger && previous != SafetyState::Danger {
        warn!("Obstacle in danger zone, stopping both tracks");
        dispatcher.stop_both(host);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatcherConfig;
    use std::time::Duration;
    use witank_http::MockTransport;
    use witank_protocol::{DriveAction, DriveChannel};

    const HOST: &str = "192.168.4.1";

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interlock_follows_safety_state() {
        let mock = MockTransport::accept_all().shared();
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&mock),
            DispatcherConfig::default(),
        ));
        let (tx, rx) = watch::channel(SafetyState::Safe);
        let interlock = SafetyInterlock::engage(rx, Arc::clone(&dispatcher), HOST);
        settle().await;
        assert!(interlock.is_engaged());
        assert_eq!(dispatcher.locks().snapshot(), LockState::default());

        tx.send_replace(SafetyState::Warning);
        settle().await;
        let locks = dispatcher.locks().snapshot();
        assert!(locks.soft_forward && locks.slow_mode && !locks.emergency);

        tx.send_replace(SafetyState::Danger);
        settle().await;
        let locks = dispatcher.locks().snapshot();
        assert!(locks.emergency && locks.hard_forward);
        assert_eq!(mock.count_suffix("/stop"), 2);

        // 仍在 Danger：不再重复 stop
        tx.send_replace(SafetyState::Danger);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(mock.count_suffix("/stop"), 2);
        assert!(!dispatcher.send(HOST, DriveChannel::A, DriveAction::Reverse).is_dispatched());

        tx.send_replace(SafetyState::Safe);
        settle().await;
        assert_eq!(dispatcher.locks().snapshot(), LockState::default());

        interlock.disengage();
        interlock.disengage();
        settle().await;
        assert!(!interlock.is_engaged());

        tx.send_replace(SafetyState::Danger);
        settle().await;
        assert!(!dispatcher.locks().snapshot().emergency);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engage_in_danger_stops_immediately() {
        let mock = MockTransport::accept_all().shared();
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&mock),
            DispatcherConfig::default(),
        ));
        let (_tx, rx) = watch::channel(SafetyState::Danger);
        let _interlock = SafetyInterlock::engage(rx, Arc::clone(&dispatcher), HOST);
        settle().await;

        assert!(dispatcher.locks().snapshot().emergency);
        assert_eq!(mock.count_suffix("/stop"), 2);
    }
}
