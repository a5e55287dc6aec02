// Capability tools driven against a wiremock Alpaca device.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use orrery_core::{
    CameraTools, ConnectionManager, DiscoveryTools, ManagerConfig, TelescopeTools,
};

async fn manager() -> ConnectionManager {
    let config = ManagerConfig {
        skip_udp_discovery: true,
        simulator_ports: Vec::new(),
        ..ManagerConfig::default()
    };
    ConnectionManager::with_probes(config, Vec::new()).await
}

fn ok(value: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "Value": value, "ErrorNumber": 0, "ErrorMessage": "" }))
}

fn ok_empty() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ErrorNumber": 0, "ErrorMessage": "" }))
}

async fn mount_get(server: &MockServer, route: &str, value: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route.to_owned()))
        .respond_with(ok(value))
        .mount(server)
        .await;
}

async fn device(kind_path: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("/api/v1/{kind_path}/connected")))
        .respond_with(ok_empty())
        .mount(&server)
        .await;
    mount_get(&server, &format!("/api/v1/{kind_path}/connected"), json!(true)).await;
    server
}

#[tokio::test]
async fn test_move_direction_sends_angle() {
    let server = device("telescope/1").await;
    mount_get(&server, "/api/v1/telescope/1/slewing", json!(false)).await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/telescope/1/action"))
        .and(body_string_contains("scope_speed_move"))
        .and(body_string_contains("%22angle%22%3A270"))
        .respond_with(ok(json!(r#"{"code":0}"#)))
        .expect(1)
        .mount(&server)
        .await;

    let mgr = manager().await;
    let tools = TelescopeTools::new(mgr.clone());
    let addr = format!("mount@127.0.0.1:{}", server.address().port());
    tools.connect(&addr).await.unwrap();

    let resp = tools.move_direction("mount", "West", None, None).await.unwrap();
    assert_eq!(resp.data["dur_sec"], json!(3.0));
    assert_eq!(resp.data["speed"], json!(300.0));

    let err = tools.move_direction("mount", "up", None, None).await.unwrap_err();
    assert_eq!(err.kind, "validation");
}

#[tokio::test]
async fn test_get_position_formats_coordinates() {
    let server = device("telescope/1").await;
    mount_get(&server, "/api/v1/telescope/1/rightascension", json!(5.5)).await;
    mount_get(&server, "/api/v1/telescope/1/declination", json!(-5.39)).await;
    mount_get(&server, "/api/v1/telescope/1/altitude", json!(41.2)).await;
    mount_get(&server, "/api/v1/telescope/1/azimuth", json!(180.0)).await;
    mount_get(&server, "/api/v1/telescope/1/tracking", json!(true)).await;
    mount_get(&server, "/api/v1/telescope/1/slewing", json!(false)).await;
    mount_get(&server, "/api/v1/telescope/1/atpark", json!(false)).await;

    let mgr = manager().await;
    let tools = TelescopeTools::new(mgr);
    tools
        .connect(&format!("mount@127.0.0.1:{}", server.address().port()))
        .await
        .unwrap();

    let resp = tools.get_position("mount").await.unwrap();
    assert!(resp.message.contains("05h 30m 00.0s"), "{}", resp.message);
    assert!(resp.message.contains("-05° 23' 24.0\""), "{}", resp.message);
    assert_eq!(resp.data["tracking"], json!(true));
}

#[tokio::test]
async fn test_capture_waits_for_image_ready() {
    let server = device("camera/0").await;
    mount_get(&server, "/api/v1/camera/0/camerastate", json!(0)).await;
    mount_get(&server, "/api/v1/camera/0/imageready", json!(true)).await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/camera/0/startexposure"))
        .and(body_string_contains("Light=true"))
        .respond_with(ok_empty())
        .expect(1)
        .mount(&server)
        .await;

    let mgr = manager().await;
    let tools = CameraTools::new(mgr).with_poll_interval(Duration::from_millis(10));
    tools
        .connect(&format!("camera_0@127.0.0.1:{}", server.address().port()))
        .await
        .unwrap();

    let resp = tools.capture("camera_0", 0.1, true).await.unwrap();
    assert_eq!(resp.data["image_ready"], json!(true));

    let err = tools.capture("camera_0", 0.0, true).await.unwrap_err();
    assert_eq!(err.kind, "validation");
}

#[tokio::test]
async fn test_capture_refuses_busy_camera() {
    let server = device("camera/0").await;
    mount_get(&server, "/api/v1/camera/0/camerastate", json!(2)).await;
    mount_get(&server, "/api/v1/camera/0/imageready", json!(false)).await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/camera/0/startexposure"))
        .respond_with(ok_empty())
        .expect(0)
        .mount(&server)
        .await;

    let mgr = manager().await;
    let tools = CameraTools::new(mgr);
    tools
        .connect(&format!("camera_0@127.0.0.1:{}", server.address().port()))
        .await
        .unwrap();

    let err = tools.capture("camera_0", 1.0, true).await.unwrap_err();
    assert_eq!(err.kind, "busy");
    assert!(err.message.contains("Exposing"));
}

#[tokio::test]
async fn test_device_info_for_unknown_device_has_suggestions() {
    let tools = DiscoveryTools::new(manager().await);
    let err = tools.device_info("telescope_7").await.unwrap_err();
    assert_eq!(err.kind, "not_found");
    assert!(err.recoverable);
    assert!(!err.suggestions.is_empty());
}

#[tokio::test]
async fn test_discover_with_no_responders_suggests_connection_string() {
    let tools = DiscoveryTools::new(manager().await);
    let resp = tools.discover(Some(0.1)).await.unwrap();
    assert!(resp.message.contains("name@host:port"), "{}", resp.message);
    assert_eq!(resp.data["devices"], json!([]));

    let err = tools.discover(Some(-1.0)).await.unwrap_err();
    assert_eq!(err.kind, "validation");
}

#[tokio::test]
async fn test_list_devices_reports_connection_state() {
    let server = device("telescope/1").await;
    let mgr = manager().await;
    let tools = DiscoveryTools::new(mgr.clone());
    mgr.connect(&format!("mount@127.0.0.1:{}", server.address().port()))
        .await
        .unwrap();

    let resp = tools.list_devices().await.unwrap();
    assert!(resp.message.contains("1 connected"), "{}", resp.message);
    assert_eq!(resp.data["devices"][0]["id"], json!("mount"));
    assert_eq!(resp.data["devices"][0]["state"], json!("ready"));
}

#[tokio::test]
async fn test_raw_method_sync_action_is_validated_before_sending() {
    let server = device("telescope/1").await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/telescope/1/action"))
        .respond_with(ok(json!(r#"{"code":0}"#)))
        .expect(0)
        .mount(&server)
        .await;

    let tools = TelescopeTools::new(manager().await);
    tools
        .connect(&format!("mount@127.0.0.1:{}", server.address().port()))
        .await
        .unwrap();

    let err = tools
        .custom_action(
            "mount",
            "method_sync",
            r#"{"method":"scope_set_track_state","params":{"on":true}}"#,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, "validation");
    assert!(err.message.contains("scope_set_track_state"), "{}", err.message);
}

#[tokio::test]
async fn test_capture_rejects_absurd_exposure_before_starting() {
    let server = device("camera/0").await;
    mount_get(&server, "/api/v1/camera/0/camerastate", json!(0)).await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/camera/0/startexposure"))
        .respond_with(ok_empty())
        .expect(0)
        .mount(&server)
        .await;

    let tools = CameraTools::new(manager().await);
    tools
        .connect(&format!("camera_0@127.0.0.1:{}", server.address().port()))
        .await
        .unwrap();

    for exposure in [1e30, f64::MAX] {
        let err = tools.capture("camera_0", exposure, true).await.unwrap_err();
        assert_eq!(err.kind, "validation");
        assert!(err.message.contains("too long"), "{}", err.message);
    }
}
