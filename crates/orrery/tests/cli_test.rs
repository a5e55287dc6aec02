//! Integration tests for the `orrery` CLI binary.
//!
//! Every test runs against a private config and device store in a temp
//! directory, with UDP discovery and simulator probing switched off.
#![allow(clippy::unwrap_used)]

use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

struct Sandbox {
    dir: TempDir,
    config: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.toml");
        let store = dir.path().join("devices.json");
        std::fs::write(
            &config,
            format!(
                "skip_udp_discovery = true\n\
                 simulator_ports = []\n\
                 connect_attempts = 1\n\
                 request_timeout = 2.0\n\
                 state_file = {:?}\n",
                store.display().to_string()
            ),
        )
        .unwrap();
        Self { dir, config }
    }

    /// An `orrery` command isolated from the user's config and environment.
    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("orrery");
        cmd.env("HOME", self.dir.path())
            .env("XDG_CONFIG_HOME", self.dir.path().join("config"))
            .env("XDG_DATA_HOME", self.dir.path().join("data"))
            .env("NO_COLOR", "1")
            .env("ORRERY_CONFIG", &self.config)
            .env_remove("ORRERY_OUTPUT")
            .env_remove("ORRERY_TELESCOPE")
            .env_remove("ORRERY_CAMERA")
            .env_remove("ASCOM_KNOWN_DEVICES")
            .env_remove("ASCOM_DIRECT_DEVICES")
            .env_remove("ASCOM_DISCOVERY_TIMEOUT")
            .env_remove("ASCOM_STATE_FILE")
            .env_remove("RUST_LOG");
        cmd
    }
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let sandbox = Sandbox::new();
    let output = sandbox.cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    Sandbox::new().cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Alpaca")
            .and(predicate::str::contains("discover"))
            .and(predicate::str::contains("telescope"))
            .and(predicate::str::contains("validate")),
    );
}

#[test]
fn test_version_flag() {
    Sandbox::new()
        .cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("orrery"));
}

#[test]
fn test_completions() {
    let sandbox = Sandbox::new();
    for shell in ["bash", "zsh"] {
        sandbox
            .cmd()
            .args(["completions", shell])
            .assert()
            .success()
            .stdout(predicate::str::is_empty().not());
    }
}

#[test]
fn test_invalid_output_format() {
    let output = Sandbox::new()
        .cmd()
        .args(["-o", "xml", "devices", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ── Validate ────────────────────────────────────────────────────────

#[test]
fn test_validate_rejects_wrapped_tracking_flag() {
    let output = Sandbox::new()
        .cmd()
        .args(["validate", "scope_set_track_state", r#"{"on": true}"#])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("direct boolean"), "Expected hint:\n{text}");
}

#[test]
fn test_validate_accepts_bare_boolean() {
    Sandbox::new()
        .cmd()
        .args(["validate", "scope_set_track_state", "true"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn test_validate_bad_json() {
    let output = Sandbox::new()
        .cmd()
        .args(["validate", "scope_goto", "{ra"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Invalid JSON"));
}

// ── Resolution & discovery ──────────────────────────────────────────

#[test]
fn test_resolve_unknown_id_is_not_found() {
    let output = Sandbox::new()
        .cmd()
        .args(["resolve", "telescope_1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    let text = combined_output(&output);
    assert!(text.contains("name@host:port"), "Expected suggestion:\n{text}");
}

#[test]
fn test_resolve_connection_string() {
    let output = Sandbox::new()
        .cmd()
        .args(["-o", "json", "resolve", "seestar@10.0.0.5:5555"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["id"], json!("seestar"));
    assert_eq!(record["host"], json!("10.0.0.5"));
    assert_eq!(record["port"], json!(5555));
}

#[test]
fn test_resolve_malformed_connection_string() {
    let output = Sandbox::new()
        .cmd()
        .args(["resolve", "seestar@10.0.0.5:notaport"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_discover_with_nothing_on_the_network() {
    Sandbox::new()
        .cmd()
        .args(["discover", "--timeout", "0.2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No devices found"));
}

#[test]
fn test_devices_list_empty_json() {
    Sandbox::new()
        .cmd()
        .args(["-o", "json", "devices", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_show() {
    Sandbox::new()
        .cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("discovery_timeout")
                .and(predicate::str::contains("skip_udp_discovery = true")),
        );
}

#[test]
fn test_config_path_follows_flag() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_bad_device_list_in_config() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .cmd()
        .env("ASCOM_KNOWN_DEVICES", "10.0.0.5:notaport:Seestar")
        .args(["devices", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("known_devices"));
}

// ── Devices ─────────────────────────────────────────────────────────

#[test]
fn test_unreachable_telescope() {
    let output = Sandbox::new()
        .cmd()
        .args(["telescope", "-d", "dead@127.0.0.1:1", "position"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(7), "{}", combined_output(&output));
}

fn ok(value: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "Value": value,
        "ErrorNumber": 0,
        "ErrorMessage": "",
    }))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_telescope_position_against_mock_device() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/telescope/1/connected"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ErrorNumber": 0,
            "ErrorMessage": "",
        })))
        .mount(&server)
        .await;
    for (property, value) in [
        ("connected", json!(true)),
        ("rightascension", json!(5.5)),
        ("declination", json!(-5.39)),
        ("altitude", json!(41.2)),
        ("azimuth", json!(180.0)),
        ("tracking", json!(true)),
        ("slewing", json!(false)),
        ("atpark", json!(false)),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/telescope/1/{property}")))
            .respond_with(ok(value))
            .mount(&server)
            .await;
    }

    let sandbox = Sandbox::new();
    let device = format!("mount@127.0.0.1:{}", server.address().port());
    let mut cmd = sandbox.cmd();
    cmd.args(["telescope", "-d", &device, "position"]);
    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    let text = combined_output(&output);
    assert!(output.status.success(), "{text}");
    assert!(text.contains("05h 30m 00.0s"), "{text}");

    // The device was remembered for the next run.
    sandbox
        .cmd()
        .args(["-o", "plain", "devices", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mount"));
}
