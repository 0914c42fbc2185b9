//! # WiTank Protocol
//!
//! 履带车控制协议定义（无网络依赖）
//!
//! ## 模块
//!
//! - `motion`: 通道/动作/运动分类/运动段等数据模型
//! - `wire`: 控制器 HTTP 接口的路径构建与响应解析
//!
//! ## 通道约定
//!
//! 车辆为差速驱动，左右两条履带分别对应通道 `a` 与 `b`，
//! 每个通道只接受三种动作：`maju`（前进）、`mundur`（后退）、`stop`。

pub mod motion;
pub mod wire;

// 重新导出常用类型
pub use motion::*;
pub use wire::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid value for field {field}: {value:?}")]
    InvalidValue { field: String, value: String },

    #[error("Malformed response body: {0}")]
    MalformedBody(String),

    #[error("Missing field in response: {0}")]
    MissingField(&'static str),

    #[error("Invalid segment text: {0:?}")]
    InvalidSegment(String),
}
