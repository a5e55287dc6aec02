// Integration tests for `ConnectionManager` against a wiremock Alpaca device.
#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use orrery_core::{
    Command, ConnectionError, ConnectionManager, ConnectionState, CoreError, InitParams,
    ManagerConfig, RecordSource, ResolutionError, RetryConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn config(state_file: Option<&Path>) -> ManagerConfig {
    ManagerConfig {
        state_file: state_file.map(Path::to_path_buf),
        skip_udp_discovery: true,
        simulator_ports: Vec::new(),
        request_timeout: Duration::from_secs(2),
        command_timeout: Duration::from_secs(5),
        connect_retry: RetryConfig {
            attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
        },
        ..ManagerConfig::default()
    }
}

async fn manager(state_file: Option<&Path>) -> ConnectionManager {
    ConnectionManager::with_probes(config(state_file), Vec::new()).await
}

fn ok(value: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "Value": value,
        "ErrorNumber": 0,
        "ErrorMessage": "",
    }))
}

fn ok_empty() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ErrorNumber": 0, "ErrorMessage": "" }))
}

fn fault(code: i32, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ErrorNumber": code, "ErrorMessage": message }))
}

fn conn_string(name: &str, server: &MockServer) -> String {
    format!("{name}@127.0.0.1:{}", server.address().port())
}

/// Accept `Connected=true` and report connected.
async fn mount_connect(server: &MockServer, device: &str) {
    Mock::given(method("PUT"))
        .and(path(format!("/api/v1/{device}/connected")))
        .respond_with(ok_empty())
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/{device}/connected")))
        .respond_with(ok(json!(true)))
        .mount(server)
        .await;
}

async fn mount_get(server: &MockServer, device: &str, property: &str, value: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/{device}/{property}")))
        .respond_with(ok(value))
        .mount(server)
        .await;
}

// ── Connect ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/telescope/1/connected"))
        .and(body_string_contains("Connected=true"))
        .respond_with(ok_empty())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/telescope/1/connected"))
        .respond_with(ok(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    let mgr = manager(None).await;
    let first = mgr.connect(&conn_string("mount", &server)).await.unwrap();
    let again = mgr.connect("mount").await.unwrap();

    assert!(std::sync::Arc::ptr_eq(&first, &again));
    assert_eq!(first.state(), ConnectionState::Ready);
    assert_eq!(mgr.list_connected().len(), 1);
}

#[tokio::test]
async fn test_unreachable_after_retries() {
    let mgr = manager(None).await;

    let err = mgr.connect("dead@127.0.0.1:1").await.unwrap_err();
    match err {
        CoreError::Connection(ConnectionError::Unreachable { id, attempts, .. }) => {
            assert_eq!(id, "dead");
            assert_eq!(attempts, 2);
        }
        other => panic!("expected Unreachable, got {other:?}"),
    }
    assert_eq!(mgr.get_state("dead"), ConnectionState::Disconnected);
    assert!(mgr.get_connection("dead").is_none());
}

// ── Seestar flow ────────────────────────────────────────────────────

#[tokio::test]
async fn test_seestar_connect_persists_and_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("devices.json");
    let server = MockServer::start().await;
    mount_connect(&server, "telescope/1").await;

    let mgr = manager(Some(&state_file)).await;

    let err = mgr.resolve("telescope_1").await.unwrap_err();
    assert!(matches!(err, ResolutionError::NotFound { ref suggestions, .. } if !suggestions.is_empty()));

    let conn = mgr.connect(&conn_string("seestar", &server)).await.unwrap();
    assert_eq!(conn.id(), "seestar");
    // Seestar mounts wait for their start-up sequence.
    assert_eq!(conn.state(), ConnectionState::Connected);
    mgr.shutdown().await;

    let restarted = manager(Some(&state_file)).await;
    let record = restarted.resolve("seestar").await.unwrap();
    assert_eq!(record.source, RecordSource::Persisted);
    assert_eq!(record.port, server.address().port());
    assert!(restarted.resolve("telescope_1").await.is_err());
}

#[tokio::test]
async fn test_commands_fail_fast_until_initialized() {
    let server = MockServer::start().await;
    mount_connect(&server, "telescope/1").await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/telescope/1/action"))
        .and(body_string_contains("set_user_location"))
        .respond_with(ok(json!(r#"{"method":"set_user_location","code":0,"result":0}"#)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/telescope/1/action"))
        .and(body_string_contains("Action=action_start_up_sequence"))
        .respond_with(ok(json!(r#"{"code":0}"#)))
        .expect(1)
        .mount(&server)
        .await;

    let mgr = manager(None).await;
    mgr.connect(&conn_string("seestar", &server)).await.unwrap();

    let err = mgr.execute("seestar", Command::Unpark).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Connection(ConnectionError::NotReady {
            state: ConnectionState::Connected,
            ..
        })
    ));
    assert!(err.suggestions()[0].contains("Initialize"));

    mgr.initialize("seestar", &InitParams::new(34.05, -118.25))
        .await
        .unwrap();
    assert_eq!(mgr.get_state("seestar"), ConnectionState::Ready);
}

// ── Execute ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_validation_failure_makes_no_request() {
    let server = MockServer::start().await;
    mount_connect(&server, "telescope/1").await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/telescope/1/action"))
        .respond_with(ok(json!("")))
        .expect(0)
        .mount(&server)
        .await;

    let mgr = manager(None).await;
    mgr.connect(&conn_string("mount", &server)).await.unwrap();

    let err = mgr
        .execute(
            "mount",
            Command::Method {
                method: "scope_set_track_state".into(),
                params: json!({ "on": true }),
            },
        )
        .await
        .unwrap_err();

    let CoreError::Validation(validation) = err else {
        panic!("expected validation error");
    };
    assert!(validation.hint.is_some());
    assert_eq!(mgr.get_state("mount"), ConnectionState::Ready);
}

#[tokio::test]
async fn test_overlapping_command_is_rejected_as_busy() {
    let server = MockServer::start().await;
    mount_connect(&server, "telescope/1").await;
    mount_get(&server, "telescope/1", "slewing", json!(false)).await;
    mount_get(&server, "telescope/1", "canslew", json!(true)).await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/telescope/1/slewtocoordinatesasync"))
        .respond_with(ok_empty().set_delay(Duration::from_millis(400)))
        .expect(1)
        .mount(&server)
        .await;

    let mgr = manager(None).await;
    mgr.connect(&conn_string("mount", &server)).await.unwrap();

    let slew = || Command::SlewToCoordinates {
        ra_hours: 5.5,
        dec_degrees: -5.0,
    };
    let first = mgr.execute("mount", slew());
    let second = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        mgr.execute("mount", slew()).await
    };
    let (first, second) = tokio::join!(first, second);

    first.unwrap();
    assert!(matches!(
        second.unwrap_err(),
        CoreError::Connection(ConnectionError::Busy { .. })
    ));
    assert_eq!(mgr.get_state("mount"), ConnectionState::Ready);
}

#[tokio::test]
async fn test_motion_rejected_while_device_slewing() {
    let server = MockServer::start().await;
    mount_connect(&server, "telescope/1").await;
    mount_get(&server, "telescope/1", "slewing", json!(true)).await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/telescope/1/park"))
        .respond_with(ok_empty())
        .expect(0)
        .mount(&server)
        .await;

    let mgr = manager(None).await;
    mgr.connect(&conn_string("mount", &server)).await.unwrap();

    let err = mgr.execute("mount", Command::Park).await.unwrap_err();
    assert_eq!(err.kind(), "busy");
    assert_eq!(mgr.get_state("mount"), ConnectionState::Ready);
}

#[tokio::test]
async fn test_device_fault_moves_connection_to_error() {
    let server = MockServer::start().await;
    mount_connect(&server, "telescope/1").await;
    mount_get(&server, "telescope/1", "slewing", json!(false)).await;
    mount_get(&server, "telescope/1", "canpark", json!(true)).await;
    mount_get(&server, "telescope/1", "atpark", json!(false)).await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/telescope/1/park"))
        .respond_with(fault(1035, "Park failed: mount obstructed"))
        .mount(&server)
        .await;

    let mgr = manager(None).await;
    let before = mgr.connect(&conn_string("mount", &server)).await.unwrap();

    let err = mgr.execute("mount", Command::Park).await.unwrap_err();
    assert_eq!(err.kind(), "device_fault");
    assert!(err.to_string().contains("mount obstructed"));
    assert_eq!(mgr.get_state("mount"), ConnectionState::Error);

    // An errored connection is replaced on the next connect.
    let after = mgr.connect("mount").await.unwrap();
    assert!(!std::sync::Arc::ptr_eq(&before, &after));
    assert_eq!(after.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_timeout_moves_connection_to_error() {
    let server = MockServer::start().await;
    mount_connect(&server, "telescope/1").await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/telescope/1/abortslew"))
        .respond_with(ok_empty().set_delay(Duration::from_secs(1)))
        .mount(&server)
        .await;

    let mgr = manager(None).await;
    mgr.connect(&conn_string("mount", &server)).await.unwrap();

    let err = mgr
        .execute_with_timeout("mount", Command::AbortSlew, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "timeout");
    assert_eq!(mgr.get_state("mount"), ConnectionState::Error);
}

#[tokio::test]
async fn test_execute_without_connection() {
    let mgr = manager(None).await;
    let err = mgr.execute("ghost", Command::Park).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Connection(ConnectionError::NotConnected { .. })
    ));
}

// ── Disconnect ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_keeps_store_entry() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("devices.json");
    let server = MockServer::start().await;
    mount_connect(&server, "camera/0").await;

    let mgr = manager(Some(&state_file)).await;
    let conn = mgr.connect(&conn_string("camera_0", &server)).await.unwrap();
    let mut states = conn.subscribe();

    mgr.disconnect("camera_0").await.unwrap();

    assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);
    assert_eq!(mgr.get_state("camera_0"), ConnectionState::Disconnected);
    assert!(mgr.list_connected().is_empty());
    let stored = mgr.store().get("camera_0").await.unwrap();
    assert_eq!(stored.kind, orrery_core::DeviceKind::Camera);
    assert_eq!(stored.number, 0);
}

#[tokio::test]
async fn test_forget_all_clears_known_devices() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("devices.json");
    let server = MockServer::start().await;
    mount_connect(&server, "telescope/1").await;

    let mgr = manager(Some(&state_file)).await;
    mgr.connect(&conn_string("mount", &server)).await.unwrap();
    mgr.disconnect("mount").await.unwrap();
    assert_eq!(mgr.list_known().await.len(), 1);

    mgr.forget_all().await.unwrap();
    assert!(mgr.list_known().await.is_empty());
    assert!(mgr.resolve("mount").await.is_err());
}
