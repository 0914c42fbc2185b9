//! 自动回家（Return To Home）
//!
//! 把录制好的路径规划成回放序列（[`planner`]），再由 [`RthExecutor`] 通过
//! 命令分发器逐段执行，执行期间持续检查障碍物传感器：
//!
//! 1. 带前进意图的运动段遇到 Danger 立即中断，剩余时长记为“时间债”
//! 2. 中断后先后退脱离（恢复），然后继续下一段
//! 3. 路径结束后按时间债做后退补偿
//!
//! 所有延迟都按切片睡眠并检查取消标志；无论正常结束、中断还是取消，
//! 顶层任务最后都会发送 `stop_both`。

mod executor;
pub mod planner;

pub use executor::{RthExecutor, StepReport};
pub use planner::{RthPlan, build_path, has_reverse};

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use witank_protocol::MotionSegment;

/// RTH 时序配置（毫秒 / 厘米）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RthConfig {
    /// 运动段内的安全检查切片
    pub slice_ms: u64,
    /// 每段开始前 stop_both 后的稳定时间
    pub hard_reset_settle_ms: u64,
    /// 每段结束 stop_both 后的稳定时间
    pub segment_settle_ms: u64,
    /// 恢复开始 stop_both 后的稳定时间
    pub recovery_settle_ms: u64,
    /// 恢复阶段单次后退时长
    pub recovery_burst_ms: u64,
    /// 恢复阶段持续后退，直到距离超过 Danger 阈值加上该余量
    pub recovery_margin_cm: u32,
    /// 补偿阶段单次后退时长
    pub compensation_burst_ms: u64,
    /// 180° 掉头的原地右转时长（需按车辆标定）
    pub rotate_ms: u64,
    /// 掉头后的稳定时间
    pub rotate_settle_ms: u64,
    /// 掉头后前进微推的时长
    pub nudge_ms: u64,
}

impl Default for RthConfig {
    fn default() -> Self {
        Self {
            slice_ms: 20,
            hard_reset_settle_ms: 80,
            segment_settle_ms: 120,
            recovery_settle_ms: 60,
            recovery_burst_ms: 60,
            recovery_margin_cm: 8,
            compensation_burst_ms: 50,
            rotate_ms: 600,
            rotate_settle_ms: 80,
            nudge_ms: 10,
        }
    }
}

impl RthConfig {
    pub fn validate(&self) -> Result<(), ClientError> {
        for (name, value) in [
            ("slice_ms", self.slice_ms),
            ("recovery_burst_ms", self.recovery_burst_ms),
            ("compensation_burst_ms", self.compensation_burst_ms),
        ] {
            if value == 0 {
                return Err(ClientError::InvalidConfig(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        Ok(())
    }
}

/// 执行过程事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RthEvent {
    Started { segments: usize, rotate: bool },
    Rotation,
    SegmentStarted { index: usize, segment: MotionSegment },
    SegmentCompleted { index: usize },
    /// 前进段因 Danger 中断，`debt_ms` 为本次未走完的时长
    Interrupted { index: usize, debt_ms: u64 },
    Recovery { backed_off_ms: u64 },
    Compensation { compensated_ms: u64 },
    Finished { cancelled: bool },
}

/// 一次回家任务的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RthReport {
    pub segments_planned: usize,
    pub segments_completed: usize,
    pub interruptions: usize,
    /// 累计时间债
    pub debt_incurred_ms: u64,
    pub compensated_ms: u64,
    /// 未补偿的剩余时间债
    pub final_debt_ms: u64,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_validation() {
        let config = RthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.slice_ms, 20);
        assert_eq!(config.recovery_margin_cm, 8);

        let bad = RthConfig {
            slice_ms: 0,
            ..Default::default()
        };
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("slice_ms"));
    }

    #[test]
    fn test_config_from_partial_section() {
        let config: RthConfig = serde_json::from_str(r#"{"rotate_ms": 750}"#).unwrap();
        assert_eq!(config.rotate_ms, 750);
        assert_eq!(config.segment_settle_ms, 120);
    }
}
