//! 手动遥控
//!
//! 一次按键/松键同时驱动录制器与分发器：
//!
//! - `press(channel, action)`：录制按下事件，发送该动作，撤销待触发的看门狗
//! - `release(channel)`：录制松开事件，发送该通道的 `stop`，并布防自动停止看门狗，
//!   防止 stop 命令在链路上丢失时车辆持续行驶

use crate::recorder::{MotionRecorder, RecorderConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use witank_driver::{CommandDispatcher, HttpTransport, SendOutcome};
use witank_protocol::{DriveAction, DriveChannel, MotionClass, MotionSegment};

/// 遥控配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleopConfig {
    /// 松键后自动停止看门狗的延迟（毫秒）
    pub auto_stop_ms: u64,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self { auto_stop_ms: 1500 }
    }
}

/// 遥控会话
pub struct Teleop<T: HttpTransport> {
    dispatcher: Arc<CommandDispatcher<T>>,
    recorder: Mutex<MotionRecorder>,
    host: String,
    config: TeleopConfig,
}

impl<T: HttpTransport> Teleop<T> {
    pub fn new(
        dispatcher: Arc<CommandDispatcher<T>>,
        host: impl Into<String>,
        recorder: RecorderConfig,
        config: TeleopConfig,
    ) -> Self {
        Self {
            dispatcher,
            recorder: Mutex::new(MotionRecorder::new(recorder)),
            host: host.into(),
            config,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher<T>> {
        &self.dispatcher
    }

    pub fn press(&self, channel: DriveChannel, action: DriveAction) -> SendOutcome {
        self.recorder.lock().on_channel_event(channel, action, true);
        self.dispatcher.cancel_auto_stop();
        self.dispatcher.send(&self.host, channel, action)
    }

    pub fn release(&self, channel: DriveChannel) -> SendOutcome {
        self.recorder
            .lock()
            .on_channel_event(channel, DriveAction::Stop, false);
        let outcome = self.dispatcher.send(&self.host, channel, DriveAction::Stop);
        self.dispatcher
            .auto_stop(&self.host, Duration::from_millis(self.config.auto_stop_ms));
        outcome
    }

    /// 松开两个通道并立即停车
    pub fn halt(&self) {
        {
            let mut recorder = self.recorder.lock();
            for channel in DriveChannel::ALL {
                recorder.on_channel_event(channel, DriveAction::Stop, false);
            }
        }
        self.dispatcher.cancel_auto_stop();
        self.dispatcher.stop_both(&self.host);
    }

    /// 当前按键组合的运动分类（只在录制中跟踪）
    pub fn current_class(&self) -> MotionClass {
        self.recorder.lock().current_class()
    }

    /// 当前锁定状态是否放行这个按键组合
    pub fn motion_admitted(&self) -> bool {
        self.dispatcher.admits_class(self.current_class())
    }

    pub fn start_record(&self) {
        self.recorder.lock().start_record();
    }

    pub fn stop_record(&self) -> Vec<MotionSegment> {
        self.recorder.lock().stop_record()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.lock().is_recording()
    }

    /// 已提交的运动段副本
    pub fn segments(&self) -> Vec<MotionSegment> {
        self.recorder.lock().segments().to_vec()
    }
}
