//! 客户端层错误类型

use thiserror::Error;
use witank_driver::DriverError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_display() {
        let err = ClientError::InvalidConfig("slice_ms".to_string());
        assert_eq!(err.to_string(), "Invalid config: slice_ms");

        let err: ClientError = DriverError::InvalidInput("base".to_string()).into();
        assert!(err.to_string().starts_with("Driver error: Invalid input"));
    }
}
