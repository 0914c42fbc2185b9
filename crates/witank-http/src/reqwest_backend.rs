//! reqwest 后端

use crate::{HttpTransport, TransportError};
use std::time::Duration;
use tracing::trace;

/// 基于 `reqwest::Client` 的传输实现
///
/// `reqwest::Client` 内部持有 `Arc<ClientInner>`，clone 代价很低，
/// 连接池在所有 clone 之间共享。
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// 创建新的传输实例
    ///
    /// 本地 WiFi 链路上的嵌入式服务器不支持 keep-alive 复用太多连接，
    /// 因此限制每个 host 的空闲连接数。
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// 使用已有的客户端
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if let Some(status) = err.status() {
        TransportError::Status(status.as_u16())
    } else if err.is_body() || err.is_decode() {
        TransportError::Body(err.to_string())
    } else {
        TransportError::Client(err.to_string())
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, TransportError> {
    let response = response.error_for_status().map_err(map_error)?;
    response.text().await.map_err(map_error)
}

impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<String, TransportError> {
        trace!("GET {url}");
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_error)?;
        read_body(response).await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<String, TransportError> {
        trace!("POST {url}");
        let response = self
            .client
            .post(url)
            .form(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_error)?;
        read_body(response).await
    }
}
