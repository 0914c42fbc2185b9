//! # WiTank Client
//!
//! 面向应用的高层接口：
//! - [`recorder`]：按键事件 → 运动段（纯状态机）
//! - [`teleop`]：遥控会话，按键同时驱动录制器与分发器
//! - [`rth`]：回家路径规划与执行（中断、恢复、时间债补偿）
//!
//! 底层的命令分发、距离轮询和设备扫描见 `witank-driver`。

mod error;
pub mod recorder;
pub mod rth;
pub mod teleop;

pub use error::ClientError;
pub use recorder::{MotionRecorder, RecorderConfig};
pub use rth::{RthConfig, RthEvent, RthExecutor, RthPlan, RthReport, StepReport};
pub use teleop::{Teleop, TeleopConfig};
