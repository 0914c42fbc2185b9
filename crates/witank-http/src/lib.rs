//! # WiTank HTTP Transport Layer
//!
//! 控制器链路的 HTTP 抽象层。上层（dispatcher / 距离轮询 / 设备扫描）只依赖
//! [`HttpTransport`] trait，不关心底层客户端实现：
//!
//! - `reqwest-backend`（默认）：基于 `reqwest::Client` 的真实网络后端
//! - `mock`：脚本化应答 + 请求日志，用于无硬件测试
//!
//! 所有请求都必须携带超时；超时与其它传输失败同样以 [`TransportError`] 返回。

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "reqwest-backend")]
mod reqwest_backend;

#[cfg(feature = "reqwest-backend")]
pub use reqwest_backend::ReqwestTransport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockReply, MockRequest, MockTransport};

/// 传输层统一错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timeout")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("Body read failed: {0}")]
    Body(String),
    #[error("Client error: {0}")]
    Client(String),
}

impl TransportError {
    /// 是否为超时（用于日志分级）
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

/// HTTP 传输抽象
///
/// 实现必须可跨任务共享（`Send + Sync`），每次调用独立、无状态。
/// 返回值为响应体文本；非 2xx 状态码视为错误。
pub trait HttpTransport: Send + Sync + 'static {
    /// GET 请求
    fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// 表单 POST 请求（`application/x-www-form-urlencoded`）
    fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        assert_eq!(TransportError::Timeout.to_string(), "Request timeout");
        assert_eq!(TransportError::Status(401).to_string(), "HTTP status 401");
        assert!(TransportError::Timeout.is_timeout());
        assert!(!TransportError::Connect("refused".into()).is_timeout());
    }
}
