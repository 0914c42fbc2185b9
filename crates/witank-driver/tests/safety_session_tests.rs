//! 手动驾驶安全会话集成测试
//!
//! ProximityMonitor 轮询 → SafetyInterlock → CommandDispatcher 锁定标志，
//! 验证前进命令在障碍物接近时被逐级拦截。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use witank_driver::{
    CommandDispatcher, DispatcherConfig, ProximityConfig, ProximityMonitor, RejectReason,
    SafetyInterlock, SendOutcome,
};
use witank_http::{MockReply, MockTransport};
use witank_protocol::{DriveAction, DriveChannel, SafetyState};

const HOST: &str = "192.168.4.1";

/// 距离读数按轮询次序给出，其余请求（驱动命令）一律 200
fn vehicle(readings: Vec<u32>) -> Arc<MockTransport> {
    let cursor = AtomicUsize::new(0);
    MockTransport::new(move |req| {
        if req.url.ends_with("/distance") {
            let index = cursor.fetch_add(1, Ordering::SeqCst).min(readings.len() - 1);
            MockReply::ok(format!(r#"{{"distance":{}}}"#, readings[index]))
        } else {
            MockReply::ok("OK")
        }
    })
    .shared()
}

#[tokio::test(start_paused = true)]
async fn test_forward_commands_gated_by_distance() {
    let mock = vehicle(vec![50, 12, 2, 2, 40]);
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::clone(&mock),
        DispatcherConfig::default(),
    ));
    let monitor = Arc::new(ProximityMonitor::new(
        Arc::clone(&mock),
        ProximityConfig::default(),
    ));
    let interlock = SafetyInterlock::engage(monitor.subscribe(), Arc::clone(&dispatcher), HOST);

    // 每 300ms 一次读数：t=0 50cm, t=300 12cm, t=600 2cm, t=900 2cm, t=1200 40cm
    monitor.start_polling(HOST);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(monitor.safety_state(), SafetyState::Safe);
    assert!(dispatcher.send(HOST, DriveChannel::A, DriveAction::Forward).is_dispatched());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(monitor.is_warning());
    assert_eq!(
        dispatcher.send(HOST, DriveChannel::B, DriveAction::Forward),
        SendOutcome::Rejected(RejectReason::SoftForwardBlock)
    );
    assert!(dispatcher.locks().is_slow_mode());
    assert!(dispatcher.send(HOST, DriveChannel::B, DriveAction::Reverse).is_dispatched());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(monitor.is_danger());
    assert_eq!(
        dispatcher.send(HOST, DriveChannel::A, DriveAction::Reverse),
        SendOutcome::Rejected(RejectReason::EmergencyLock)
    );
    let stops_on_entry = mock.count_suffix("/stop");
    assert_eq!(stops_on_entry, 2);

    // 连续两次 Danger 读数只触发一次 stop
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(mock.count_suffix("/stop"), stops_on_entry);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(monitor.safety_state(), SafetyState::Safe);
    assert!(dispatcher.send(HOST, DriveChannel::A, DriveAction::Forward).is_dispatched());

    monitor.stop_polling();
    interlock.disengage();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(mock.count_suffix("/a/maju"), 2);
    assert_eq!(mock.count_suffix("/b/maju"), 0);
}
