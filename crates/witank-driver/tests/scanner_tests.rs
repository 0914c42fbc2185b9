//! 子网扫描集成测试
//!
//! 使用 MockTransport 模拟整个 /24 网段的应答，时钟暂停以获得确定性时序。

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use witank_driver::{DeviceScanner, DriverError, ModelMatch, ScanConfig, ScanOutcome};
use witank_http::{MockReply, MockTransport, TransportError};

const BASE: &str = "192.168.1.7";
const SECRET: &str = "tank-42";

fn refused() -> MockReply {
    MockReply::err(TransportError::Connect("connection refused".to_string()))
}

fn scanner(mock: &Arc<MockTransport>, config: ScanConfig) -> DeviceScanner<MockTransport> {
    DeviceScanner::new(Arc::clone(mock), config)
}

#[tokio::test(start_paused = true)]
async fn test_no_new_probe_after_first_match() {
    let mock = MockTransport::new(|req| {
        if req.url == "http://192.168.1.30/" {
            MockReply::ok(r#"{"status":"ok","model":"CAM","cam_id":"cam-7"}"#)
                .after(Duration::from_millis(50))
        } else {
            refused().after(Duration::from_millis(50))
        }
    })
    .shared();
    let start = Instant::now();

    let outcome = scanner(&mock, ScanConfig::default())
        .scan(BASE, SECRET, &ModelMatch::Camera)
        .await
        .unwrap();

    let device = outcome.device().expect("camera should be found");
    assert_eq!(device.host, "192.168.1.30");
    assert_eq!(device.identifier, "cam-7");

    // .30 在第二批（t=50ms）发出，t=100ms 应答；之后不再有新探测
    let found_at = start + Duration::from_millis(100);
    let requests = mock.requests();
    assert!(requests.len() <= 40, "issued {} probes", requests.len());
    assert!(requests.iter().all(|r| r.at <= found_at));
    assert!(mock.max_in_flight() <= 20);

    assert_eq!(requests[0].method, "POST");
    assert_eq!(
        requests[0].form,
        vec![("password".to_string(), SECRET.to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_sweep_covers_subnet_except_base() {
    let mock = MockTransport::new(|_| refused()).shared();
    let scanner = scanner(&mock, ScanConfig::default());
    let progress = scanner.progress();

    let outcome = scanner.scan(BASE, SECRET, &ModelMatch::Camera).await.unwrap();

    assert_eq!(outcome, ScanOutcome::NotFound);
    assert_eq!(mock.requests().len(), 253);
    assert_eq!(mock.count(|r| r.url == "http://192.168.1.7/"), 0);
    assert_eq!(mock.count(|r| r.url == "http://192.168.1.254/"), 1);

    let last = *progress.borrow();
    assert_eq!(last.total, 253);
    assert_eq!(last.completed, 253);
    assert_eq!(last.fraction(), 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_first_response_wins_over_lower_address() {
    let mock = MockTransport::new(|req| match req.url.as_str() {
        "http://192.168.1.10/" => {
            MockReply::ok(r#"{"status":"ok","model":"CAM","cam_id":"slow"}"#)
                .after(Duration::from_millis(300))
        },
        "http://192.168.1.12/" => {
            MockReply::ok(r#"{"status":"ok","model":"CAM","cam_id":"fast"}"#)
                .after(Duration::from_millis(10))
        },
        _ => refused().after(Duration::from_millis(500)),
    })
    .shared();

    let outcome = scanner(&mock, ScanConfig::default())
        .scan(BASE, SECRET, &ModelMatch::Camera)
        .await
        .unwrap();

    let device = outcome.device().unwrap();
    assert_eq!(device.host, "192.168.1.12");
    assert_eq!(device.identifier, "fast");
}

#[tokio::test(start_paused = true)]
async fn test_model_filter_and_identifier_fallback() {
    let mock = MockTransport::new(|req| {
        if req.url == "http://192.168.1.5/" {
            MockReply::ok(r#"{"status":"ok","model":"RC"}"#)
        } else {
            MockReply::ok(r#"{"status":"denied"}"#)
        }
    })
    .shared();

    let outcome = scanner(&mock, ScanConfig::default())
        .scan(BASE, SECRET, &ModelMatch::Camera)
        .await
        .unwrap();
    assert_eq!(outcome, ScanOutcome::NotFound);

    mock.clear();
    let outcome = scanner(&mock, ScanConfig::default())
        .scan(BASE, SECRET, &ModelMatch::Controller)
        .await
        .unwrap();
    let device = outcome.device().unwrap();
    assert_eq!(device.host, "192.168.1.5");
    assert_eq!(device.model.as_deref(), Some("RC"));
    assert_eq!(device.identifier, SECRET);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_bodies_are_ignored() {
    let mock = MockTransport::new(|req| {
        if req.url == "http://192.168.1.200/" {
            MockReply::ok(r#"{"status":"ok","model":"CAM","controller_id":"rc-1"}"#)
        } else {
            MockReply::ok("<html>router login</html>")
        }
    })
    .shared();

    let outcome = scanner(&mock, ScanConfig::default())
        .scan(BASE, SECRET, &ModelMatch::Any)
        .await
        .unwrap();
    assert_eq!(outcome.device().unwrap().identifier, "rc-1");
}

#[tokio::test(start_paused = true)]
async fn test_invalid_base_address() {
    let mock = MockTransport::accept_all().shared();
    let scanner = scanner(&mock, ScanConfig::default());

    for base in ["192.168.1", "not-an-ip", "300.1.1.1", ""] {
        let err = scanner.scan(base, SECRET, &ModelMatch::Camera).await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidInput(_)), "{base}: {err:?}");
    }
    assert!(mock.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retries_rerun_the_sweep() {
    let mock = MockTransport::new(|_| refused()).shared();
    let config = ScanConfig {
        retries: 2,
        retry_delay_ms: 1000,
        ..Default::default()
    };
    let start = Instant::now();

    let outcome = scanner(&mock, config)
        .scan(BASE, SECRET, &ModelMatch::Camera)
        .await
        .unwrap();

    assert_eq!(outcome, ScanOutcome::NotFound);
    assert_eq!(mock.requests().len(), 253 * 3);
    assert!(start.elapsed() >= Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_issuing_probes() {
    let mock = MockTransport::new(|_| refused().after(Duration::from_millis(100))).shared();
    let scanner = Arc::new(scanner(&mock, ScanConfig::default()));

    let task = {
        let scanner = Arc::clone(&scanner);
        tokio::spawn(async move { scanner.scan(BASE, SECRET, &ModelMatch::Camera).await })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    scanner.cancel();
    let outcome = task.await.unwrap().unwrap();

    assert_eq!(outcome, ScanOutcome::NotFound);
    assert!(!scanner.is_cancelled());
    assert!(mock.requests().len() <= 40, "issued {}", mock.requests().len());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_scan_is_honoured() {
    let mock =
        MockTransport::new(|_| MockReply::ok(r#"{"status":"ok","model":"CAM","cam_id":"cam-7"}"#))
            .shared();
    let scanner = scanner(&mock, ScanConfig::default());

    scanner.cancel();
    let outcome = scanner.scan(BASE, SECRET, &ModelMatch::Camera).await.unwrap();

    assert_eq!(outcome, ScanOutcome::NotFound);
    assert!(mock.requests().is_empty());
    assert!(!scanner.is_cancelled());

    // 标志已清除，下一次扫描正常进行
    let outcome = scanner.scan(BASE, SECRET, &ModelMatch::Camera).await.unwrap();
    assert!(matches!(outcome, ScanOutcome::Found(_)));
}
