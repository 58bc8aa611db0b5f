//! The monitor actor: serialized dispatch, timer-driven permission timeouts
//! and shutdown.

use std::sync::Arc;
use std::time::Duration;
use uvc_manager::testing::{LoopbackBridge, LoopbackRenderer, RecordingDrawer, SyntheticCamera};
use uvc_manager::{
    DeviceEvent, DeviceManager, DeviceMonitor, Drawer, LifecycleState, Resolution, UvcConfig,
    UvcError,
};

fn spawn_monitor(timeout_ms: u64, ids: &[&str]) -> DeviceMonitor {
    let mut config = UvcConfig::default();
    config.permission.timeout_ms = timeout_ms;
    let mut bridge = LoopbackBridge::new();
    for (n, id) in ids.iter().enumerate() {
        bridge.add_camera(id, &SyntheticCamera::generic_webcam(), n as i32 + 10);
    }
    DeviceMonitor::spawn(DeviceManager::new(config, bridge, LoopbackRenderer::new()))
}

#[tokio::test]
async fn test_events_reach_preview() {
    let monitor = spawn_monitor(30_000, &["camA"]);
    for event in [
        DeviceEvent::Attach("camA".into()),
        DeviceEvent::PermissionGranted("camA".into()),
        DeviceEvent::Ready("camA".into()),
    ] {
        monitor.dispatch(event).await.unwrap();
    }

    let devices = monitor.attached_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].state, LifecycleState::Previewing);
    assert_eq!(monitor.frame_tick_targets().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_callbacks_from_other_threads_are_serialized() {
    let monitor = spawn_monitor(30_000, &["cam0", "cam1", "cam2"]);
    let mut threads = Vec::new();
    for id in ["cam0", "cam1", "cam2"] {
        let sender = monitor.event_sender();
        threads.push(std::thread::spawn(move || {
            sender.send_callback("OnEventAttach", id).unwrap();
            sender.send_callback("OnEventPermission", id).unwrap();
            sender.send_callback("OnEventReady", id).unwrap();
        }));
    }
    for thread in threads {
        thread.join().unwrap();
    }

    let devices = monitor.attached_devices().await.unwrap();
    assert_eq!(devices.len(), 3);
    assert!(devices.iter().all(|d| d.state == LifecycleState::Previewing));
}

#[tokio::test(start_paused = true)]
async fn test_permission_wait_times_out() {
    let monitor = spawn_monitor(500, &["camA", "camB"]);
    monitor.dispatch(DeviceEvent::Attach("camA".into())).await.unwrap();
    monitor.dispatch(DeviceEvent::Attach("camB".into())).await.unwrap();
    monitor
        .dispatch(DeviceEvent::PermissionGranted("camB".into()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;

    let devices = monitor.attached_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_id, "camB");
    assert_eq!(devices[0].state, LifecycleState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_restarted_wait_gets_fresh_deadline() {
    let monitor = spawn_monitor(500, &["camA"]);
    monitor.dispatch(DeviceEvent::Attach("camA".into())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    monitor.dispatch(DeviceEvent::Attach("camA".into())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    let devices = monitor.attached_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].state, LifecycleState::PermissionRequested);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(monitor.attached_devices().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dispatch_reports_errors() {
    let monitor = spawn_monitor(30_000, &["camA"]);
    let err = monitor
        .dispatch(DeviceEvent::Attach("".into()))
        .await
        .unwrap_err();
    assert!(err.is_contract_violation());

    monitor.dispatch(DeviceEvent::Attach("camA".into())).await.unwrap();
    let err = monitor
        .dispatch(DeviceEvent::PermissionDenied("camA".into()))
        .await
        .unwrap_err();
    assert_eq!(err, UvcError::PermissionDenied("camA".into()));
}

#[tokio::test]
async fn test_change_resolution_through_monitor() {
    let monitor = spawn_monitor(30_000, &["camA"]);
    let drawer: Arc<dyn Drawer> = Arc::new(RecordingDrawer::claiming_all());
    monitor.register_drawer(drawer.clone()).await.unwrap();
    for event in [
        DeviceEvent::Attach("camA".into()),
        DeviceEvent::PermissionGranted("camA".into()),
        DeviceEvent::Ready("camA".into()),
    ] {
        monitor.dispatch(event).await.unwrap();
    }

    let vga = Resolution::new(640, 480).unwrap();
    assert!(monitor
        .request_change_resolution("camA", Some(vga))
        .await
        .unwrap());
    let devices = monitor.attached_devices().await.unwrap();
    assert_eq!(devices[0].current_resolution, Some(vga));
}

#[tokio::test]
async fn test_shutdown_closes_everything() {
    let monitor = spawn_monitor(30_000, &["camA", "camB"]);
    for id in ["camA", "camB"] {
        monitor.dispatch(DeviceEvent::Attach(id.into())).await.unwrap();
        monitor
            .dispatch(DeviceEvent::PermissionGranted(id.into()))
            .await
            .unwrap();
    }
    let sender = monitor.event_sender();

    let report = monitor.shutdown().await.unwrap();
    assert_eq!(report.closed, vec!["camA".to_string(), "camB".to_string()]);
    assert!(report.is_clean());

    assert_eq!(
        sender.send(DeviceEvent::Pause).unwrap_err(),
        UvcError::MonitorClosed
    );
}

#[tokio::test]
async fn test_pause_closes_and_resume_rearms() {
    let monitor = spawn_monitor(30_000, &["camA"]);
    for event in [
        DeviceEvent::Attach("camA".into()),
        DeviceEvent::PermissionGranted("camA".into()),
        DeviceEvent::Ready("camA".into()),
        DeviceEvent::Pause,
    ] {
        monitor.dispatch(event).await.unwrap();
    }
    assert_eq!(
        monitor.attached_devices().await.unwrap()[0].state,
        LifecycleState::Closed
    );

    monitor.dispatch(DeviceEvent::Resume).await.unwrap();
    assert_eq!(
        monitor.attached_devices().await.unwrap()[0].state,
        LifecycleState::PermissionRequested
    );
}
