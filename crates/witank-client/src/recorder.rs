//! 路径录制
//!
//! 把两条履带的按下/松开事件转换成离散的运动段。
//!
//! 每个通道记住当前动作（默认 `Stop`）；按下设为对应动作，松开恢复 `Stop`。
//! 两个通道的动作组合决定当前运动分类；分类变化时关闭上一段：
//! 时长不低于噪声阈值的提交，短于阈值的视为抖动丢弃；新分类不是 `Idle`
//! 时开始计时。
//!
//! 录制器本身是纯状态机，不做任何 I/O；`*_at` 变体接受显式时间戳，
//! 便于确定性测试。

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use witank_protocol::{DriveAction, DriveChannel, MotionClass, MotionSegment};

/// 噪声阈值上限（毫秒）
pub const MAX_NOISE_THRESHOLD_MS: u64 = 5_000;

/// 录制配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// 短于该时长的运动段被丢弃（毫秒）
    pub noise_threshold_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            noise_threshold_ms: 120,
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.noise_threshold_ms > MAX_NOISE_THRESHOLD_MS {
            return Err(ClientError::InvalidConfig(format!(
                "noise_threshold_ms must not exceed {MAX_NOISE_THRESHOLD_MS}, got {}",
                self.noise_threshold_ms
            )));
        }
        Ok(())
    }
}

/// 运动段录制器
#[derive(Debug)]
pub struct MotionRecorder {
    config: RecorderConfig,
    recording: bool,
    channels: [DriveAction; 2],
    current: MotionClass,
    started_at: Option<Instant>,
    segments: Vec<MotionSegment>,
}

impl Default for MotionRecorder {
    fn default() -> Self {
        Self::new(RecorderConfig::default())
    }
}

impl MotionRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            recording: false,
            channels: [DriveAction::Stop; 2],
            current: MotionClass::Idle,
            started_at: None,
            segments: Vec::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// 已提交的运动段（录制中也可查看）
    pub fn segments(&self) -> &[MotionSegment] {
        &self.segments
    }

    /// 当前进行中的运动分类
    pub fn current_class(&self) -> MotionClass {
        self.current
    }

    pub fn start_record(&mut self) {
        self.start_record_at(Instant::now());
    }

    /// 开始录制：清空已有运动段，两个通道复位为 `Stop`
    pub fn start_record_at(&mut self, _now: Instant) {
        self.segments.clear();
        self.channels = [DriveAction::Stop; 2];
        self.current = MotionClass::Idle;
        self.started_at = None;
        self.recording = true;
        info!("Path recording started");
    }

    pub fn on_channel_event(&mut self, channel: DriveChannel, action: DriveAction, is_press: bool) {
        self.on_channel_event_at(channel, action, is_press, Instant::now());
    }

    /// 通道事件；未在录制时为空操作
    pub fn on_channel_event_at(
        &mut self,
        channel: DriveChannel,
        action: DriveAction,
        is_press: bool,
        now: Instant,
    ) {
        if !self.recording {
            return;
        }

        self.channels[channel.index()] = if is_press { action } else { DriveAction::Stop };
        let class = MotionClass::from_actions(self.channels[0], self.channels[1]);
        if class == self.current {
            return;
        }

        self.close_segment(now);
        self.current = class;
        self.started_at = if class.is_idle() { None } else { Some(now) };
    }

    pub fn stop_record(&mut self) -> Vec<MotionSegment> {
        self.stop_record_at(Instant::now())
    }

    /// 结束录制：强制关闭进行中的运动段，交出全部运动段
    pub fn stop_record_at(&mut self, now: Instant) -> Vec<MotionSegment> {
        if self.recording {
            self.close_segment(now);
            info!("Path recording stopped with {} segments", self.segments.len());
        }
        self.recording = false;
        self.current = MotionClass::Idle;
        self.started_at = None;
        self.channels = [DriveAction::Stop; 2];
        std::mem::take(&mut self.segments)
    }

    fn close_segment(&mut self, now: Instant) {
        if self.current.is_idle() {
            return;
        }
        let Some(started_at) = self.started_at else {
            return;
        };

        let elapsed = now.saturating_duration_since(started_at);
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if elapsed < Duration::from_millis(self.config.noise_threshold_ms) {
            debug!("Dropped {} after {duration_ms} ms as jitter", self.current);
            return;
        }

        let segment = MotionSegment::new(self.current, duration_ms);
        debug!("Committed segment {segment}");
        self.segments.push(segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use witank_protocol::DriveAction::{Forward, Reverse};
    use witank_protocol::DriveChannel::{A, B};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_config_validation() {
        assert!(RecorderConfig::default().validate().is_ok());
        let bad = RecorderConfig {
            noise_threshold_ms: MAX_NOISE_THRESHOLD_MS + 1,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_short_tap_is_filtered() {
        let t0 = Instant::now();
        let mut recorder = MotionRecorder::default();
        recorder.start_record_at(t0);

        recorder.on_channel_event_at(A, Forward, true, t0);
        recorder.on_channel_event_at(A, Forward, false, t0 + ms(119));

        assert!(recorder.stop_record_at(t0 + ms(500)).is_empty());
    }

    #[test]
    fn test_both_tracks_forward_yields_one_segment() {
        let t0 = Instant::now();
        let mut recorder = MotionRecorder::default();
        recorder.start_record_at(t0);

        // A 单独前进 30ms（抖动），随后 B 也按下并保持 500ms
        recorder.on_channel_event_at(A, Forward, true, t0);
        recorder.on_channel_event_at(B, Forward, true, t0 + ms(30));
        recorder.on_channel_event_at(A, Forward, false, t0 + ms(530));
        recorder.on_channel_event_at(B, Forward, false, t0 + ms(545));

        let segments = recorder.stop_record_at(t0 + ms(1000));
        assert_eq!(
            segments,
            vec![MotionSegment::new(MotionClass::StraightForward, 500)]
        );
    }

    #[test]
    fn test_class_transitions() {
        let t0 = Instant::now();
        let mut recorder = MotionRecorder::default();
        recorder.start_record_at(t0);

        recorder.on_channel_event_at(A, Forward, true, t0);
        recorder.on_channel_event_at(B, Reverse, true, t0 + ms(300));
        assert_eq!(recorder.current_class(), MotionClass::PivotRight);
        assert_eq!(
            recorder.segments(),
            &[MotionSegment::new(MotionClass::ForwardVeerRight, 300)]
        );

        recorder.on_channel_event_at(A, Forward, false, t0 + ms(700));
        assert_eq!(recorder.current_class(), MotionClass::ReverseVeerRight);

        let segments = recorder.stop_record_at(t0 + ms(1000));
        assert_eq!(
            segments,
            vec![
                MotionSegment::new(MotionClass::ForwardVeerRight, 300),
                MotionSegment::new(MotionClass::PivotRight, 400),
                MotionSegment::new(MotionClass::ReverseVeerRight, 300),
            ]
        );
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_repeated_press_is_noop() {
        let t0 = Instant::now();
        let mut recorder = MotionRecorder::default();
        recorder.start_record_at(t0);

        recorder.on_channel_event_at(A, Reverse, true, t0);
        recorder.on_channel_event_at(B, Reverse, true, t0);
        recorder.on_channel_event_at(B, Reverse, true, t0 + ms(200));
        recorder.on_channel_event_at(B, Reverse, false, t0 + ms(400));

        assert_eq!(
            recorder.segments(),
            &[MotionSegment::new(MotionClass::StraightReverse, 400)]
        );
    }

    #[test]
    fn test_events_ignored_while_not_recording() {
        let t0 = Instant::now();
        let mut recorder = MotionRecorder::default();

        recorder.on_channel_event_at(A, Forward, true, t0);
        recorder.on_channel_event_at(B, Forward, true, t0);
        assert_eq!(recorder.current_class(), MotionClass::Idle);
        assert!(recorder.stop_record_at(t0 + ms(1000)).is_empty());
    }

    #[test]
    fn test_restart_clears_previous_session() {
        let t0 = Instant::now();
        let mut recorder = MotionRecorder::default();
        recorder.start_record_at(t0);
        recorder.on_channel_event_at(A, Forward, true, t0);
        recorder.on_channel_event_at(B, Forward, true, t0);

        // 未松开就重新开始：上一段与通道状态一并清除
        recorder.start_record_at(t0 + ms(800));
        assert!(recorder.segments().is_empty());
        assert_eq!(recorder.current_class(), MotionClass::Idle);

        recorder.on_channel_event_at(B, Forward, true, t0 + ms(800));
        let segments = recorder.stop_record_at(t0 + ms(1000));
        assert_eq!(
            segments,
            vec![MotionSegment::new(MotionClass::ForwardVeerLeft, 200)]
        );
    }

    #[test]
    fn test_stop_record_closes_open_segment() {
        let t0 = Instant::now();
        let mut recorder = MotionRecorder::default();
        recorder.start_record_at(t0);
        recorder.on_channel_event_at(B, Reverse, true, t0 + ms(100));

        let segments = recorder.stop_record_at(t0 + ms(350));
        assert_eq!(
            segments,
            vec![MotionSegment::new(MotionClass::ReverseVeerRight, 250)]
        );
        // 交出后录制器不再持有
        assert!(recorder.stop_record_at(t0 + ms(400)).is_empty());
    }
}
