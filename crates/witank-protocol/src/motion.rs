//! 运动数据模型
//!
//! 定义通道、动作、运动分类（两条履带动作的组合）以及录制得到的运动段。

use crate::ProtocolError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// 通道与动作
// ============================================================================

/// 驱动通道（一条履带）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveChannel {
    /// 通道 A
    A,
    /// 通道 B
    B,
}

impl DriveChannel {
    /// 全部通道（按 A、B 顺序）
    pub const ALL: [DriveChannel; 2] = [DriveChannel::A, DriveChannel::B];

    /// URL 路径中使用的名称
    pub fn as_str(self) -> &'static str {
        match self {
            DriveChannel::A => "a",
            DriveChannel::B => "b",
        }
    }

    /// 数组索引（A = 0, B = 1）
    #[inline]
    pub fn index(self) -> usize {
        match self {
            DriveChannel::A => 0,
            DriveChannel::B => 1,
        }
    }
}

impl TryFrom<&str> for DriveChannel {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(DriveChannel::A),
            "b" => Ok(DriveChannel::B),
            _ => Err(ProtocolError::InvalidValue {
                field: "DriveChannel".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for DriveChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单通道动作
///
/// 控制器只接受这三种动作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DriveAction {
    /// 前进（`maju`）
    Forward,
    /// 后退（`mundur`）
    Reverse,
    /// 停止（`stop`）
    #[default]
    Stop,
}

impl DriveAction {
    /// URL 路径中使用的名称
    pub fn as_str(self) -> &'static str {
        match self {
            DriveAction::Forward => "maju",
            DriveAction::Reverse => "mundur",
            DriveAction::Stop => "stop",
        }
    }

    /// 是否带有前进意图
    #[inline]
    pub fn is_forward(self) -> bool {
        self == DriveAction::Forward
    }

    /// 是否为停止
    #[inline]
    pub fn is_stop(self) -> bool {
        self == DriveAction::Stop
    }
}

impl TryFrom<&str> for DriveAction {
    type Error = ProtocolError;

    /// 同时接受控制器线上名称与英文别名
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "maju" | "forward" | "fwd" => Ok(DriveAction::Forward),
            "mundur" | "reverse" | "rev" => Ok(DriveAction::Reverse),
            "stop" => Ok(DriveAction::Stop),
            _ => Err(ProtocolError::InvalidValue {
                field: "DriveAction".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for DriveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// 运动分类
// ============================================================================

/// 运动分类（两个通道动作组合的命名）
///
/// | A \ B   | Forward          | Reverse           | Stop              |
/// |---------|------------------|-------------------|-------------------|
/// | Forward | StraightForward  | PivotRight        | ForwardVeerRight  |
/// | Reverse | PivotLeft        | StraightReverse   | ReverseVeerLeft   |
/// | Stop    | ForwardVeerLeft  | ReverseVeerRight  | Idle              |
///
/// `#[repr(u8)]` 便于在原子变量中保存当前分类。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum MotionClass {
    /// 静止
    #[default]
    Idle = 0,
    /// 直线前进
    StraightForward = 1,
    /// 直线后退
    StraightReverse = 2,
    /// 原地左转
    PivotLeft = 3,
    /// 原地右转
    PivotRight = 4,
    /// 前进左偏
    ForwardVeerLeft = 5,
    /// 前进右偏
    ForwardVeerRight = 6,
    /// 后退左偏
    ReverseVeerLeft = 7,
    /// 后退右偏
    ReverseVeerRight = 8,
}

impl MotionClass {
    /// 全部分类
    pub const ALL: [MotionClass; 9] = [
        MotionClass::Idle,
        MotionClass::StraightForward,
        MotionClass::StraightReverse,
        MotionClass::PivotLeft,
        MotionClass::PivotRight,
        MotionClass::ForwardVeerLeft,
        MotionClass::ForwardVeerRight,
        MotionClass::ReverseVeerLeft,
        MotionClass::ReverseVeerRight,
    ];

    /// 由两个通道的动作查表得到分类
    pub fn from_actions(a: DriveAction, b: DriveAction) -> Self {
        use DriveAction::*;
        match (a, b) {
            (Forward, Forward) => MotionClass::StraightForward,
            (Reverse, Reverse) => MotionClass::StraightReverse,
            (Forward, Reverse) => MotionClass::PivotRight,
            (Reverse, Forward) => MotionClass::PivotLeft,
            (Forward, Stop) => MotionClass::ForwardVeerRight,
            (Stop, Forward) => MotionClass::ForwardVeerLeft,
            (Reverse, Stop) => MotionClass::ReverseVeerLeft,
            (Stop, Reverse) => MotionClass::ReverseVeerRight,
            (Stop, Stop) => MotionClass::Idle,
        }
    }

    /// 回放该分类时两个通道应发送的动作 `(A, B)`
    ///
    /// 与 [`MotionClass::from_actions`] 互逆。
    pub fn actions(self) -> (DriveAction, DriveAction) {
        use DriveAction::*;
        match self {
            MotionClass::StraightForward => (Forward, Forward),
            MotionClass::StraightReverse => (Reverse, Reverse),
            MotionClass::PivotRight => (Forward, Reverse),
            MotionClass::PivotLeft => (Reverse, Forward),
            MotionClass::ForwardVeerRight => (Forward, Stop),
            MotionClass::ForwardVeerLeft => (Stop, Forward),
            MotionClass::ReverseVeerLeft => (Reverse, Stop),
            MotionClass::ReverseVeerRight => (Stop, Reverse),
            MotionClass::Idle => (Stop, Stop),
        }
    }

    /// 转向镜像（对合映射：`x.invert().invert() == x`）
    ///
    /// 直线与静止保持不变，左右互换。
    pub fn invert(self) -> Self {
        match self {
            MotionClass::StraightForward => MotionClass::StraightForward,
            MotionClass::StraightReverse => MotionClass::StraightReverse,
            MotionClass::PivotLeft => MotionClass::PivotRight,
            MotionClass::PivotRight => MotionClass::PivotLeft,
            MotionClass::ForwardVeerLeft => MotionClass::ForwardVeerRight,
            MotionClass::ForwardVeerRight => MotionClass::ForwardVeerLeft,
            MotionClass::ReverseVeerLeft => MotionClass::ReverseVeerRight,
            MotionClass::ReverseVeerRight => MotionClass::ReverseVeerLeft,
            MotionClass::Idle => MotionClass::Idle,
        }
    }

    /// 是否带有前进意图（直线前进与前进偏转）
    pub fn has_forward_intent(self) -> bool {
        matches!(
            self,
            MotionClass::StraightForward
                | MotionClass::ForwardVeerLeft
                | MotionClass::ForwardVeerRight
        )
    }

    /// 是否带有后退意图（直线后退与后退偏转）
    pub fn has_reverse_intent(self) -> bool {
        matches!(
            self,
            MotionClass::StraightReverse
                | MotionClass::ReverseVeerLeft
                | MotionClass::ReverseVeerRight
        )
    }

    /// 是否为静止
    #[inline]
    pub fn is_idle(self) -> bool {
        self == MotionClass::Idle
    }

    /// 文本短码（用于路径文本格式）
    pub fn code(self) -> &'static str {
        match self {
            MotionClass::Idle => "ID",
            MotionClass::StraightForward => "SF",
            MotionClass::StraightReverse => "SR",
            MotionClass::PivotLeft => "PL",
            MotionClass::PivotRight => "PR",
            MotionClass::ForwardVeerLeft => "FVL",
            MotionClass::ForwardVeerRight => "FVR",
            MotionClass::ReverseVeerLeft => "RVL",
            MotionClass::ReverseVeerRight => "RVR",
        }
    }

    /// 由文本短码解析
    pub fn from_code(code: &str) -> Result<Self, ProtocolError> {
        let upper = code.trim().to_ascii_uppercase();
        MotionClass::ALL
            .into_iter()
            .find(|class| class.code() == upper)
            .ok_or_else(|| ProtocolError::InvalidValue {
                field: "MotionClass".to_string(),
                value: code.to_string(),
            })
    }
}

impl fmt::Display for MotionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// 运动段
// ============================================================================

/// 运动段：一种运动分类持续的时长
///
/// 录制器只提交时长不低于噪声阈值的非静止段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotionSegment {
    /// 运动分类
    pub class: MotionClass,
    /// 持续时长（毫秒）
    pub duration_ms: u64,
}

impl MotionSegment {
    pub fn new(class: MotionClass, duration_ms: u64) -> Self {
        Self { class, duration_ms }
    }

    /// 持续时长
    #[inline]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// 文本格式：`<短码>:<毫秒>`，例如 `SF:1000`
impl fmt::Display for MotionSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class.code(), self.duration_ms)
    }
}

impl FromStr for MotionSegment {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (code, millis) = s
            .split_once(':')
            .ok_or_else(|| ProtocolError::InvalidSegment(s.to_string()))?;
        let class = MotionClass::from_code(code)?;
        let duration_ms = millis
            .trim()
            .parse::<u64>()
            .map_err(|_| ProtocolError::InvalidSegment(s.to_string()))?;
        Ok(Self { class, duration_ms })
    }
}

/// 解析逗号分隔的路径文本（如 `SF:1000,PR:300`）
///
/// 空白段会被跳过，空字符串得到空路径。
pub fn parse_path(text: &str) -> Result<Vec<MotionSegment>, ProtocolError> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}

/// 将路径格式化为逗号分隔文本
pub fn format_path(segments: &[MotionSegment]) -> String {
    segments.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

// ============================================================================
// 安全状态
// ============================================================================

/// 距离传感器给出的安全分级
///
/// 变体顺序即严重程度（`Safe < Warning < Danger`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SafetyState {
    #[default]
    Safe,
    Warning,
    Danger,
}

impl fmt::Display for SafetyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SafetyState::Safe => "SAFE",
            SafetyState::Warning => "WARNING",
            SafetyState::Danger => "DANGER",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_action() -> impl Strategy<Value = DriveAction> {
        prop_oneof![
            Just(DriveAction::Forward),
            Just(DriveAction::Reverse),
            Just(DriveAction::Stop),
        ]
    }

    fn any_class() -> impl Strategy<Value = MotionClass> {
        (0u8..9).prop_map(|code| MotionClass::try_from(code).unwrap())
    }

    #[test]
    fn test_invert_fixed_points() {
        assert_eq!(MotionClass::Idle.invert(), MotionClass::Idle);
        assert_eq!(MotionClass::StraightForward.invert(), MotionClass::StraightForward);
        assert_eq!(MotionClass::StraightReverse.invert(), MotionClass::StraightReverse);
        assert_eq!(MotionClass::PivotLeft.invert(), MotionClass::PivotRight);
        assert_eq!(MotionClass::ForwardVeerLeft.invert(), MotionClass::ForwardVeerRight);
        assert_eq!(MotionClass::ReverseVeerRight.invert(), MotionClass::ReverseVeerLeft);
    }

    #[test]
    fn test_lookup_matches_controller_wiring() {
        use DriveAction::*;
        assert_eq!(MotionClass::from_actions(Forward, Stop), MotionClass::ForwardVeerRight);
        assert_eq!(MotionClass::from_actions(Stop, Forward), MotionClass::ForwardVeerLeft);
        assert_eq!(MotionClass::from_actions(Reverse, Stop), MotionClass::ReverseVeerLeft);
        assert_eq!(MotionClass::from_actions(Stop, Reverse), MotionClass::ReverseVeerRight);
        assert_eq!(MotionClass::from_actions(Forward, Reverse), MotionClass::PivotRight);
        assert_eq!(MotionClass::from_actions(Reverse, Forward), MotionClass::PivotLeft);
        assert_eq!(MotionClass::from_actions(Stop, Stop), MotionClass::Idle);
    }

    #[test]
    fn test_intent_partitions() {
        for class in MotionClass::ALL {
            assert!(
                !(class.has_forward_intent() && class.has_reverse_intent()),
                "{class:?} cannot be both"
            );
        }
        assert!(!MotionClass::PivotLeft.has_forward_intent());
        assert!(!MotionClass::PivotRight.has_reverse_intent());
        assert!(MotionClass::ForwardVeerLeft.has_forward_intent());
        assert!(MotionClass::ReverseVeerRight.has_reverse_intent());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(DriveChannel::A.as_str(), "a");
        assert_eq!(DriveAction::Forward.as_str(), "maju");
        assert_eq!(DriveAction::Reverse.as_str(), "mundur");
        assert_eq!(DriveAction::try_from("MAJU").unwrap(), DriveAction::Forward);
        assert_eq!(DriveAction::try_from("reverse").unwrap(), DriveAction::Reverse);
        assert!(DriveAction::try_from("jump").is_err());
        assert!(DriveChannel::try_from("c").is_err());
    }

    #[test]
    fn test_segment_text() {
        let seg: MotionSegment = "fvl:250".parse().unwrap();
        assert_eq!(seg, MotionSegment::new(MotionClass::ForwardVeerLeft, 250));
        assert_eq!(seg.to_string(), "FVL:250");

        assert!("SF".parse::<MotionSegment>().is_err());
        assert!("XX:10".parse::<MotionSegment>().is_err());
        assert!("SF:-1".parse::<MotionSegment>().is_err());

        let path = parse_path("SF:1000, PR:300,").unwrap();
        assert_eq!(
            path,
            vec![
                MotionSegment::new(MotionClass::StraightForward, 1000),
                MotionSegment::new(MotionClass::PivotRight, 300),
            ]
        );
        assert_eq!(format_path(&path), "SF:1000,PR:300");
        assert!(parse_path("").unwrap().is_empty());
    }

    #[test]
    fn test_safety_state_ordering() {
        assert!(SafetyState::Danger > SafetyState::Warning);
        assert!(SafetyState::Warning > SafetyState::Safe);
        assert_eq!(SafetyState::default(), SafetyState::Safe);
    }

    proptest! {
        #[test]
        fn prop_invert_is_involution(class in any_class()) {
            prop_assert_eq!(class.invert().invert(), class);
        }

        #[test]
        fn prop_invert_preserves_intent(class in any_class()) {
            prop_assert_eq!(class.invert().has_forward_intent(), class.has_forward_intent());
            prop_assert_eq!(class.invert().has_reverse_intent(), class.has_reverse_intent());
        }

        #[test]
        fn prop_lookup_roundtrips(a in any_action(), b in any_action()) {
            let class = MotionClass::from_actions(a, b);
            prop_assert_eq!(class.actions(), (a, b));
        }
    }
}
