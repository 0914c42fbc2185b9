//! 子网设备扫描
//!
//! 在基地址所在的 /24 网段内，对除基地址以外的 253 个主机发送带密钥的探测
//! 请求，返回第一个应答匹配的设备。
//!
//! - 并发探测数由信号量限制（默认 20）
//! - 第一个匹配被记录后不再发出新的探测；已在途的探测跑完，结果丢弃
//! - 单个探测的失败（超时、拒绝连接、响应体异常）静默忽略
//! - 进度通过 `watch` 通道发布，仅供显示

use crate::error::DriverError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, trace};
use witank_http::HttpTransport;
use witank_protocol::{
    DiscoveryResponse, MODEL_CAMERA, MODEL_CONTROLLER, PROBE_SECRET_FIELD, probe_url,
};

/// 扫描配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 最大并发探测数
    pub concurrency: usize,
    /// 单个探测的超时（毫秒）
    pub probe_timeout_ms: u64,
    /// 整轮未找到时的额外重扫次数
    pub retries: u32,
    /// 两轮之间的间隔（毫秒）
    pub retry_delay_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            probe_timeout_ms: 2000,
            retries: 0,
            retry_delay_ms: 1000,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.concurrency == 0 {
            return Err(DriverError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.probe_timeout_ms == 0 {
            return Err(DriverError::InvalidConfig(
                "probe_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 应答匹配条件（`status` 必须为 `"ok"`）
#[derive(Clone, Default)]
pub enum ModelMatch {
    /// `model == "CAM"`
    #[default]
    Camera,
    /// `model == "RC"`
    Controller,
    /// 任意型号
    Any,
    /// 自定义条件
    Custom(Arc<dyn Fn(&DiscoveryResponse) -> bool + Send + Sync>),
}

impl ModelMatch {
    pub fn custom(predicate: impl Fn(&DiscoveryResponse) -> bool + Send + Sync + 'static) -> Self {
        ModelMatch::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, response: &DiscoveryResponse) -> bool {
        if !response.is_ok() {
            return false;
        }
        match self {
            ModelMatch::Camera => response.model_is(MODEL_CAMERA),
            ModelMatch::Controller => response.model_is(MODEL_CONTROLLER),
            ModelMatch::Any => true,
            ModelMatch::Custom(predicate) => predicate(response),
        }
    }
}

impl fmt::Debug for ModelMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelMatch::Camera => write!(f, "Camera"),
            ModelMatch::Controller => write!(f, "Controller"),
            ModelMatch::Any => write!(f, "Any"),
            ModelMatch::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// 被发现的设备
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub host: String,
    pub model: Option<String>,
    pub controller_id: Option<String>,
    pub cam_id: Option<String>,
    /// `cam_id`，否则 `controller_id`，否则探测用的密钥
    pub identifier: String,
}

/// 扫描结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Found(DiscoveredDevice),
    NotFound,
}

impl ScanOutcome {
    pub fn device(&self) -> Option<&DiscoveredDevice> {
        match self {
            ScanOutcome::Found(device) => Some(device),
            ScanOutcome::NotFound => None,
        }
    }
}

/// 扫描进度（当前这一轮）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanProgress {
    pub completed: usize,
    pub total: usize,
}

impl ScanProgress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f32 / self.total as f32
    }
}

/// 设备扫描器
pub struct DeviceScanner<T: HttpTransport> {
    transport: Arc<T>,
    config: ScanConfig,
    progress_tx: Arc<watch::Sender<ScanProgress>>,
    cancel: Arc<AtomicBool>,
}

impl<T: HttpTransport> DeviceScanner<T> {
    pub fn new(transport: Arc<T>, config: ScanConfig) -> Self {
        let (progress_tx, _) = watch::channel(ScanProgress::default());
        Self {
            transport,
            config,
            progress_tx: Arc::new(progress_tx),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// 订阅扫描进度
    pub fn progress(&self) -> watch::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// 请求取消扫描（不再发出新的探测）
    ///
    /// 在扫描开始前调用同样有效：下一次 `scan` 立即返回 `NotFound`。
    /// 扫描结束时清除取消标志。
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// 扫描 `base_ip` 所在的 /24 网段
    ///
    /// 只有基地址不是点分 IPv4 或配置无效时返回错误；网络失败一律体现为
    /// `NotFound`。
    pub async fn scan(
        &self,
        base_ip: &str,
        secret: &str,
        matcher: &ModelMatch,
    ) -> Result<ScanOutcome, DriverError> {
        self.config.validate()?;
        let base: Ipv4Addr = base_ip
            .trim()
            .parse()
            .map_err(|_| DriverError::InvalidInput(format!("not an IPv4 address: {base_ip:?}")))?;

        info!("Scanning {}.0/24 for {matcher:?}", subnet_prefix(base));
        let outcome = self.run_attempts(base, secret, matcher).await;
        self.cancel.store(false, Ordering::SeqCst);
        Ok(outcome)
    }

    async fn run_attempts(&self, base: Ipv4Addr, secret: &str, matcher: &ModelMatch) -> ScanOutcome {
        for attempt in 0..=self.config.retries {
            if attempt > 0 {
                debug!("Scan attempt {} of {}", attempt + 1, self.config.retries + 1);
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }
            if self.is_cancelled() {
                break;
            }
            if let Some(device) = self.sweep(base, secret, matcher).await {
                info!("Found {:?} at {} ({})", device.model, device.host, device.identifier);
                return ScanOutcome::Found(device);
            }
        }

        info!("Scan finished without a match");
        ScanOutcome::NotFound
    }

    async fn sweep(
        &self,
        base: Ipv4Addr,
        secret: &str,
        matcher: &ModelMatch,
    ) -> Option<DiscoveredDevice> {
        let candidates = candidates(base);
        let total = candidates.len();
        self.progress_tx.send_replace(ScanProgress { completed: 0, total });

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let found: Arc<OnceLock<DiscoveredDevice>> = Arc::new(OnceLock::new());
        let completed = Arc::new(AtomicUsize::new(0));
        let timeout = Duration::from_millis(self.config.probe_timeout_ms);
        let mut probes = JoinSet::new();

        for host in candidates {
            if found.get().is_some() || self.is_cancelled() {
                break;
            }
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            // 等待许可期间可能已经找到
            if found.get().is_some() || self.is_cancelled() {
                break;
            }

            let transport = Arc::clone(&self.transport);
            let found = Arc::clone(&found);
            let completed = Arc::clone(&completed);
            let progress_tx = Arc::clone(&self.progress_tx);
            let cancel = Arc::clone(&self.cancel);
            let secret = secret.to_string();
            let matcher = matcher.clone();
            probes.spawn(async move {
                let _permit = permit;
                if found.get().is_none() && !cancel.load(Ordering::SeqCst) {
                    let host = host.to_string();
                    if let Some(device) = probe(&*transport, &host, &secret, &matcher, timeout).await {
                        if found.set(device).is_err() {
                            trace!("Late match at {host} discarded");
                        }
                    }
                }
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress_tx.send_replace(ScanProgress {
                    completed: done,
                    total,
                });
            });
        }

        while probes.join_next().await.is_some() {}
        found.get().cloned()
    }
}

/// 探测单个主机，失败或不匹配返回 `None`
async fn probe<T: HttpTransport>(
    transport: &T,
    host: &str,
    secret: &str,
    matcher: &ModelMatch,
    timeout: Duration,
) -> Option<DiscoveredDevice> {
    let body = match transport
        .post_form(&probe_url(host), &[(PROBE_SECRET_FIELD, secret)], timeout)
        .await
    {
        Ok(body) => body,
        Err(e) => {
            trace!("Probe {host} failed: {e}");
            return None;
        },
    };
    let response = match DiscoveryResponse::decode(&body) {
        Ok(response) => response,
        Err(e) => {
            debug!("Probe {host} returned an unreadable body: {e}");
            return None;
        },
    };
    if !matcher.matches(&response) {
        trace!("Probe {host} answered but did not match");
        return None;
    }
    Some(DiscoveredDevice {
        host: host.to_string(),
        identifier: response.identifier(secret),
        model: response.model,
        controller_id: response.controller_id,
        cam_id: response.cam_id,
    })
}

fn subnet_prefix(base: Ipv4Addr) -> String {
    let [a, b, c, _] = base.octets();
    format!("{a}.{b}.{c}")
}

/// 基地址所在 /24 网段的候选主机（1..=254，排除基地址本身）
pub fn candidates(base: Ipv4Addr) -> Vec<Ipv4Addr> {
    let [a, b, c, own] = base.octets();
    (1..=254u8)
        .filter(|&suffix| suffix != own)
        .map(|suffix| Ipv4Addr::new(a, b, c, suffix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_skip_base_host() {
        let list = candidates(Ipv4Addr::new(192, 168, 1, 7));
        assert_eq!(list.len(), 253);
        assert!(!list.contains(&Ipv4Addr::new(192, 168, 1, 7)));
        assert_eq!(list[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(list[252], Ipv4Addr::new(192, 168, 1, 254));

        // .0 / .255 不是有效主机号，基地址落在这里时全部 254 个都是候选
        assert_eq!(candidates(Ipv4Addr::new(10, 0, 0, 0)).len(), 254);
    }

    #[test]
    fn test_model_match() {
        let cam = DiscoveryResponse::decode(r#"{"status":"ok","model":"CAM"}"#).unwrap();
        let rc = DiscoveryResponse::decode(r#"{"status":"ok","model":"RC"}"#).unwrap();
        let denied = DiscoveryResponse::decode(r#"{"status":"denied","model":"CAM"}"#).unwrap();

        assert!(ModelMatch::Camera.matches(&cam));
        assert!(!ModelMatch::Camera.matches(&rc));
        assert!(ModelMatch::Controller.matches(&rc));
        assert!(ModelMatch::Any.matches(&rc));
        assert!(!ModelMatch::Any.matches(&denied));

        let custom = ModelMatch::custom(|r| r.model.as_deref() == Some("RC"));
        assert!(custom.matches(&rc));
        assert_eq!(format!("{custom:?}"), "Custom(..)");
    }

    #[test]
    fn test_config_validation() {
        assert!(ScanConfig::default().validate().is_ok());
        let bad = ScanConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_progress_fraction() {
        assert_eq!(ScanProgress::default().fraction(), 0.0);
        let half = ScanProgress {
            completed: 100,
            total: 200,
        };
        assert!((half.fraction() - 0.5).abs() < f32::EPSILON);
    }
}
