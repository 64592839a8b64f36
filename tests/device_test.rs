// tests/device_test.rs

use mockito::Matcher;
use panel_hub::AppContext;
use panel_hub::config::ExternalConfig;
use panel_hub::device::{DeviceCommand, SnapshotSource};
use panel_hub::error::AppError;
use serde_json::json;
use tempfile::{TempDir, tempdir};

fn context_for(esp_ip: &str, no_gaps: bool) -> (TempDir, AppContext) {
    let dir = tempdir().unwrap();
    let mut cfg = ExternalConfig::default();
    cfg.esp_ip = esp_ip.to_string();
    if no_gaps {
        cfg.device.min_ok_gap_s = 0.0;
        cfg.device.min_fail_gap_s = 0.0;
    }
    let ctx = AppContext::for_tests(cfg, dir.path()).unwrap();
    (dir, ctx)
}

#[tokio::test]
async fn test_status_is_cached_and_concurrent_calls_coalesce() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/state")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"relays":{"r1":true},"ssid":"casa","rssi":-60}"#)
        .expect(1)
        .create_async()
        .await;
    let (_dir, ctx) = context_for(&server.host_with_port(), false);

    let (a, b) = tokio::join!(ctx.device.get_status(), ctx.device.get_status());
    let a = a.unwrap();
    let b = b.unwrap();
    assert!(a.ok && b.ok);
    assert!(a.online);
    assert!(!a.stale);
    assert_eq!(a.via, SnapshotSource::Poll);
    assert_eq!(a.captured_at, b.captured_at);

    // 最小间隔内不会再次访问设备
    ctx.device.get_status().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_failed_poll_keeps_last_state() {
    let mut server = mockito::Server::new_async().await;
    let ok = server
        .mock("GET", "/state")
        .with_status(200)
        .with_body(r#"{"relays":{"r1":true}}"#)
        .create_async()
        .await;
    let (_dir, ctx) = context_for(&server.host_with_port(), true);

    let fresh = ctx.device.get_status().await.unwrap();
    assert!(fresh.online);
    ok.remove_async().await;

    let _down = server.mock("GET", "/state").with_status(500).create_async().await;
    let stale = ctx.device.get_status().await.unwrap();
    assert!(!stale.ok);
    assert!(stale.stale);
    assert!(!stale.online);
    assert_eq!(stale.fail_streak, 1);
    assert_eq!(stale.state, fresh.state);
    assert_eq!(stale.captured_at, fresh.captured_at);
    assert!(stale.last_fail_at.is_some());
}

#[tokio::test]
async fn test_consecutive_failures_keep_serving_last_state() {
    let mut server = mockito::Server::new_async().await;
    let ok = server
        .mock("GET", "/state")
        .with_status(200)
        .with_body(r#"{"relays":{"r1":true},"ssid":"casa"}"#)
        .create_async()
        .await;
    let (_dir, ctx) = context_for(&server.host_with_port(), true);
    let fresh = ctx.device.get_status().await.unwrap();
    ok.remove_async().await;

    // 连续失败两次后进入退避，之后的调用直接返回旧快照
    let down = server
        .mock("GET", "/state")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;
    for _ in 0..6 {
        let snapshot = ctx.device.get_status().await.unwrap();
        assert!(snapshot.stale);
        assert!(!snapshot.online);
        assert!(snapshot.fail_streak >= 1);
        assert_eq!(snapshot.state, fresh.state);
        assert_eq!(snapshot.captured_at, fresh.captured_at);
    }
    assert_eq!(ctx.device.get_status().await.unwrap().fail_streak, 2);
    down.assert_async().await;
}

#[tokio::test]
async fn test_no_snapshot_is_service_unavailable_without_hammering() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/state")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;
    let (_dir, ctx) = context_for(&server.host_with_port(), false);

    assert!(matches!(
        ctx.device.get_status().await,
        Err(AppError::ServiceUnavailable(_))
    ));
    // 仍在失败退避窗口内
    assert!(matches!(
        ctx.device.get_status().await,
        Err(AppError::ServiceUnavailable(_))
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_push_serves_status_without_polling() {
    let (_dir, ctx) = context_for("", false);

    let ack = ctx
        .device
        .push_state(&json!({ "state": { "seq": 42, "relays": { "r2": false } } }))
        .unwrap();
    assert_eq!(ack.seq, 42);
    assert!(ack.server_ts > 0);

    let snapshot = ctx.device.get_status().await.unwrap();
    assert_eq!(snapshot.via, SnapshotSource::Push);
    assert!(snapshot.online);
    assert_eq!(snapshot.fail_streak, 0);
}

#[tokio::test]
async fn test_empty_push_is_rejected() {
    let (_dir, ctx) = context_for("", false);
    assert!(matches!(
        ctx.device.push_state(&json!({})),
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn test_gpio_command_is_forwarded_once() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/gpio")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("pin".into(), "23".into()),
            Matcher::UrlEncoded("state".into(), "ON".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .expect(1)
        .create_async()
        .await;
    let (_dir, ctx) = context_for(&server.host_with_port(), false);

    let cmd = DeviceCommand::gpio_from_json(&json!({ "pin": 23, "state": "on" })).unwrap();
    let response = ctx.device.send_command(&cmd).await.unwrap();
    assert_eq!(response, json!({ "ok": true }));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_wifi_command_posts_json() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/wifi")
        .match_body(Matcher::Json(json!({ "ssid": "casa", "pass": "segredo" })))
        .with_status(200)
        .with_body(r#"{"saved":true}"#)
        .expect(1)
        .create_async()
        .await;
    let (_dir, ctx) = context_for(&server.host_with_port(), false);

    let cmd = DeviceCommand::wifi_from_json(&json!({ "ssid": "casa", "password": "segredo" })).unwrap();
    let response = ctx.device.send_command(&cmd).await.unwrap();
    assert_eq!(response["saved"], json!(true));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_failed_command_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/ir")
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(1)
        .create_async()
        .await;
    let (_dir, ctx) = context_for(&server.host_with_port(), false);

    let cmd = DeviceCommand::ir_from_json(&json!({ "device": "QUIOSQUE", "command": "UP" })).unwrap();
    assert!(matches!(
        ctx.device.send_command(&cmd).await,
        Err(AppError::DeviceOffline(_))
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unconfigured_device() {
    let (_dir, ctx) = context_for("", false);
    let cmd = DeviceCommand::gpio_from_json(&json!({ "pin": 22, "state": 0 })).unwrap();

    assert!(matches!(
        ctx.device.send_command(&cmd).await,
        Err(AppError::DeviceNotConfigured)
    ));
    assert!(matches!(
        ctx.device.get_state_raw().await,
        Err(AppError::DeviceNotConfigured)
    ));
}
