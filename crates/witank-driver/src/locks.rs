//! 命令锁定标志
//!
//! Dispatcher 的四个门控标志，由外部（会话控制器或 [`SafetyInterlock`]）
//! 根据安全状态设置：
//!
//! - **emergency**: 紧急锁，除 `stop` 外全部拒绝
//! - **hard_forward**: 硬前进阻断，拒绝任何带前进意图的命令
//! - **soft_forward**: 软前进阻断，只拒绝纯直线前进
//! - **slow_mode**: 慢速模式，加宽去抖间隔
//!
//! # 线程安全
//!
//! 每个标志都是独立的原子变量，读写无需加锁。
//!
//! [`SafetyInterlock`]: crate::SafetyInterlock

use std::sync::atomic::{AtomicBool, Ordering};
use witank_protocol::{DriveAction, MotionClass, SafetyState};

/// 命令被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// 紧急锁生效（非 stop 命令）
    EmergencyLock,
    /// 硬前进阻断
    HardForwardBlock,
    /// 软前进阻断
    SoftForwardBlock,
    /// 去抖间隔内的重复命令
    Debounced,
}

/// 锁定标志快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockState {
    pub emergency: bool,
    pub hard_forward: bool,
    pub soft_forward: bool,
    pub slow_mode: bool,
}

impl LockState {
    /// 安全状态到锁定标志的映射
    ///
    /// - Danger: 紧急锁 + 硬前进阻断
    /// - Warning: 软前进阻断 + 慢速模式
    /// - Safe: 全部清除
    pub fn for_safety(state: SafetyState) -> Self {
        match state {
            SafetyState::Danger => Self {
                emergency: true,
                hard_forward: true,
                soft_forward: false,
                slow_mode: false,
            },
            SafetyState::Warning => Self {
                emergency: false,
                hard_forward: false,
                soft_forward: true,
                slow_mode: true,
            },
            SafetyState::Safe => Self::default(),
        }
    }

    /// 单通道动作的门控检查（不含去抖）
    ///
    /// 在单通道层面，“前进意图”与“纯前进”都对应 `Forward`；
    /// 两者的区别体现在运动分类层面，见 [`LockState::admits_class`]。
    pub fn gate(&self, action: DriveAction) -> Option<RejectReason> {
        if self.emergency && !action.is_stop() {
            return Some(RejectReason::EmergencyLock);
        }
        if self.hard_forward && action.is_forward() {
            return Some(RejectReason::HardForwardBlock);
        }
        if self.soft_forward && action == DriveAction::Forward {
            return Some(RejectReason::SoftForwardBlock);
        }
        None
    }

    /// 运动分类层面的门控检查
    ///
    /// 硬阻断拒绝所有带前进意图的分类（含前进偏转），软阻断只拒绝直线前进。
    pub fn admits_class(&self, class: MotionClass) -> bool {
        if self.emergency {
            return class.is_idle();
        }
        if self.hard_forward && class.has_forward_intent() {
            return false;
        }
        if self.soft_forward && class == MotionClass::StraightForward {
            return false;
        }
        true
    }
}

/// 锁定标志（原子版本，用于任务间共享）
#[derive(Debug, Default)]
pub struct LockFlags {
    emergency: AtomicBool,
    hard_forward: AtomicBool,
    soft_forward: AtomicBool,
    slow_mode: AtomicBool,
}

impl LockFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_emergency(&self, on: bool) {
        self.emergency.store(on, Ordering::SeqCst);
    }

    pub fn set_hard_forward(&self, on: bool) {
        self.hard_forward.store(on, Ordering::SeqCst);
    }

    pub fn set_soft_forward(&self, on: bool) {
        self.soft_forward.store(on, Ordering::SeqCst);
    }

    pub fn set_slow_mode(&self, on: bool) {
        self.slow_mode.store(on, Ordering::SeqCst);
    }

    pub fn is_slow_mode(&self) -> bool {
        self.slow_mode.load(Ordering::SeqCst)
    }

    /// 一次性写入全部标志
    pub fn apply(&self, state: LockState) {
        self.set_emergency(state.emergency);
        self.set_hard_forward(state.hard_forward);
        self.set_soft_forward(state.soft_forward);
        self.set_slow_mode(state.slow_mode);
    }

    /// 清除全部标志
    pub fn clear(&self) {
        self.apply(LockState::default());
    }

    /// 读取快照
    pub fn snapshot(&self) -> LockState {
        LockState {
            emergency: self.emergency.load(Ordering::SeqCst),
            hard_forward: self.hard_forward.load(Ordering::SeqCst),
            soft_forward: self.soft_forward.load(Ordering::SeqCst),
            slow_mode: self.slow_mode.load(Ordering::SeqCst),
        }
    }
}
