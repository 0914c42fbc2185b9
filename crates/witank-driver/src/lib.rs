//! # WiTank Driver
//!
//! 驱动层，直接面对控制器的 HTTP 接口：
//! - 命令分发（锁定门控、去抖、fire-and-forget 发送、自动停止看门狗）
//! - 距离轮询与三级安全分级（ArcSwap 无锁读取）
//! - 安全联锁（安全等级 → 锁定标志）
//! - 子网设备扫描（信号量限流、首个匹配即停）
//! - 命令钩子：异步命令日志、自定义回调
//!
//! 网络失败不会以错误形式返回给调用方，而是体现在可观测状态上
//! （`SendOutcome`、`ProximitySnapshot`、`ScanOutcome`）。
//! 大多数用户应该使用 `witank-client` 提供的录制/回家接口。

pub mod dispatcher;
mod error;
pub mod hooks;
pub mod interlock;
pub mod locks;
pub mod metrics;
pub mod proximity;
pub mod scanner;

pub use dispatcher::{CommandDispatcher, DispatcherConfig, SendOutcome};
pub use error::DriverError;
pub use hooks::{AsyncCommandLog, CommandEvent, CommandHook, CommandRecord, HookManager};
pub use interlock::SafetyInterlock;
pub use locks::{LockFlags, LockState, RejectReason};
pub use metrics::{DriverMetrics, MetricsSnapshot};
pub use proximity::{
    DropoutPolicy, ObstacleSensor, ProximityConfig, ProximityMonitor, ProximitySnapshot, classify,
};
pub use scanner::{
    DeviceScanner, DiscoveredDevice, ModelMatch, ScanConfig, ScanOutcome, ScanProgress,
};

// 下游 crate 只需依赖 witank-driver
pub use witank_http::{HttpTransport, TransportError};
#[cfg(feature = "reqwest-backend")]
pub use witank_http::ReqwestTransport;
