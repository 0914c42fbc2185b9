//! Mock 传输（无网络）
//!
//! 记录每一次请求，并由调用方提供的应答函数决定返回内容和延迟。
//! 延迟使用 `tokio::time::sleep`，配合 `#[tokio::test(start_paused = true)]`
//! 可以得到确定性的时序。

use crate::{HttpTransport, TransportError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// 被记录的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRequest {
    /// `GET` 或 `POST`
    pub method: &'static str,
    pub url: String,
    /// 表单字段（GET 为空）
    pub form: Vec<(String, String)>,
    /// 请求发出时刻（tokio 时钟）
    pub at: Instant,
}

/// 脚本化应答
#[derive(Debug, Clone)]
pub struct MockReply {
    pub result: Result<String, TransportError>,
    /// 应答前的延迟
    pub delay: Duration,
}

impl MockReply {
    /// 立即成功
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            result: Ok(body.into()),
            delay: Duration::ZERO,
        }
    }

    /// 立即失败
    pub fn err(error: TransportError) -> Self {
        Self {
            result: Err(error),
            delay: Duration::ZERO,
        }
    }

    /// 设置应答延迟
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Responder = Box<dyn Fn(&MockRequest) -> MockReply + Send + Sync>;

/// Mock 传输
pub struct MockTransport {
    responder: Responder,
    log: Mutex<Vec<MockRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    /// 使用应答函数创建
    pub fn new(responder: impl Fn(&MockRequest) -> MockReply + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            log: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// 所有请求都返回空的 200 响应
    pub fn accept_all() -> Self {
        Self::new(|_| MockReply::ok(""))
    }

    /// 包装为 `Arc`（上层组件按 `Arc<T>` 持有传输）
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 请求日志快照
    pub fn requests(&self) -> Vec<MockRequest> {
        self.log.lock().clone()
    }

    /// 请求 URL 列表（按发出顺序）
    pub fn urls(&self) -> Vec<String> {
        self.log.lock().iter().map(|r| r.url.clone()).collect()
    }

    /// 满足条件的请求数
    pub fn count(&self, predicate: impl Fn(&MockRequest) -> bool) -> usize {
        self.log.lock().iter().filter(|r| predicate(r)).count()
    }

    /// URL 以 `suffix` 结尾的请求数
    pub fn count_suffix(&self, suffix: &str) -> usize {
        self.count(|r| r.url.ends_with(suffix))
    }

    /// 清空请求日志
    pub fn clear(&self) {
        self.log.lock().clear();
    }

    /// 历史最大并发请求数
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn handle(&self, request: MockRequest) -> Result<String, TransportError> {
        let reply = (self.responder)(&request);
        self.log.lock().push(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply.result
    }
}

impl HttpTransport for MockTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<String, TransportError> {
        let request = MockRequest {
            method: "GET",
            url: url.to_string(),
            form: Vec::new(),
            at: Instant::now(),
        };
        self.handle(request).await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        _timeout: Duration,
    ) -> Result<String, TransportError> {
        let request = MockRequest {
            method: "POST",
            url: url.to_string(),
            form: form.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            at: Instant::now(),
        };
        self.handle(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_mock_records_and_replies() {
        let mock = MockTransport::new(|req| {
            if req.url.ends_with("/distance") {
                MockReply::ok(r#"{"distance":30}"#).after(Duration::from_millis(50))
            } else {
                MockReply::err(TransportError::Timeout)
            }
        });

        let start = Instant::now();
        let body = mock
            .get("http://h/distance", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(body, r#"{"distance":30}"#);
        assert_eq!(start.elapsed(), Duration::from_millis(50));

        let err = mock
            .post_form("http://h/", &[("password", "s3cret")], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout);

        let log = mock.requests();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].method, "POST");
        assert_eq!(log[1].form, vec![("password".to_string(), "s3cret".to_string())]);
        assert_eq!(mock.count_suffix("/distance"), 1);
        assert_eq!(mock.max_in_flight(), 1);
    }
}
