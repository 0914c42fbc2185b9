//! 命令定义和实现

pub mod config;
pub mod drive;
pub mod record;
pub mod rth;
pub mod scan;
pub mod watch;

pub use config::ConfigCommand;
pub use drive::{DriveCommand, StopCommand};
pub use record::RecordCommand;
pub use rth::RthCommand;
pub use scan::ScanCommand;
pub use watch::WatchCommand;
