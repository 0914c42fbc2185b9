//! 驱动层错误类型定义
//!
//! 注意：网络 I/O 失败不会通过这些错误返回给调用方（命令与轮询都是 fail-soft），
//! 这里只覆盖构造期/参数校验类错误以及显式的单次读取接口。

use thiserror::Error;
use witank_http::TransportError;
use witank_protocol::ProtocolError;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// HTTP 传输错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 无效输入（如非 IPv4 的基地址）
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 配置校验失败
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use witank_http::TransportError;
    use witank_protocol::ProtocolError;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::Transport(TransportError::Timeout);
        assert_eq!(err.to_string(), "Transport error: Request timeout");

        let err = DriverError::InvalidInput("base ip".to_string());
        assert!(err.to_string().contains("Invalid input") && err.to_string().contains("base ip"));

        let err = DriverError::InvalidConfig("danger_cm".to_string());
        assert!(err.to_string().starts_with("Invalid config"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: DriverError = ProtocolError::MissingField("distance").into();
        match err {
            DriverError::Protocol(ProtocolError::MissingField(field)) => {
                assert_eq!(field, "distance")
            },
            other => panic!("Expected Protocol variant, got {other:?}"),
        }
    }
}
