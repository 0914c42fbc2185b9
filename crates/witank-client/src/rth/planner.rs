//! 回家路径规划
//!
//! - 录制路径中没有任何后退意图的运动段：倒序回放，每段做左右镜像，
//!   前后各做一次 180° 掉头
//! - 含有后退意图：按原顺序原样回放，不掉头

use witank_protocol::MotionSegment;

/// 回放计划
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RthPlan {
    pub segments: Vec<MotionSegment>,
    /// 路径前后是否需要 180° 掉头
    pub rotate: bool,
}

/// 是否有任何运动段带后退意图
pub fn has_reverse(segments: &[MotionSegment]) -> bool {
    segments.iter().any(|s| s.class.has_reverse_intent())
}

pub fn build_path(segments: &[MotionSegment]) -> RthPlan {
    if has_reverse(segments) {
        return RthPlan {
            segments: segments.to_vec(),
            rotate: false,
        };
    }
    RthPlan {
        segments: segments
            .iter()
            .rev()
            .map(|s| MotionSegment::new(s.class.invert(), s.duration_ms))
            .collect(),
        rotate: true,
    }
}
