//! Configuration for orrery.
//!
//! One flat TOML table, overridable by `ASCOM_*` environment variables,
//! translated to `orrery_core::ManagerConfig`. Core never reads files or
//! the environment itself; everything it needs arrives through here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use orrery_core::config::{parse_direct_devices, parse_known_devices};
use orrery_core::{CoreError, ManagerConfig, RetryConfig, StaticDevice};

/// Environment variable prefix, e.g. `ASCOM_KNOWN_DEVICES`.
pub const ENV_PREFIX: &str = "ASCOM_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Comma-separated `host:port:name` entries.
    pub known_devices: String,

    /// Comma-separated `id:host:port:name` entries.
    pub direct_devices: String,

    /// Seconds. Clamped to 30.
    pub discovery_timeout: f64,

    pub skip_udp_discovery: bool,

    /// Device store location. Defaults to the platform data directory.
    pub state_file: Option<PathBuf>,

    pub state_max_age_days: u32,

    /// Seconds allowed for one device command.
    pub command_timeout: f64,

    /// Seconds allowed for one HTTP request.
    pub request_timeout: f64,

    pub connect_attempts: u32,

    /// Loopback ports checked for local simulators during discovery.
    pub simulator_ports: Vec<u16>,

    /// Only query discovery responders on loopback or private networks.
    pub local_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            known_devices: String::new(),
            direct_devices: String::new(),
            discovery_timeout: 5.0,
            skip_udp_discovery: false,
            state_file: None,
            state_max_age_days: 30,
            command_timeout: 30.0,
            request_timeout: 10.0,
            connect_attempts: 3,
            simulator_ports: vec![11111, 5555],
            local_only: true,
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "orrery", "orrery")
}

fn home_fallback(sub: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(sub);
    p.push("orrery");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default device store location.
pub fn default_state_file() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".local/share").join("devices.json"),
        |dirs| dirs.data_dir().join("devices.json"),
    )
}

// ── Loading ─────────────────────────────────────────────────────────

/// Defaults, then `path` (if it exists), then `ASCOM_*` variables.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
}

/// Load from the canonical config path and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    Ok(figment(path).extract()?)
}

/// Effective configuration as TOML, for display.
pub fn render_config(cfg: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(cfg)?)
}

// ── Translation ─────────────────────────────────────────────────────

fn seconds(field: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| ConfigError::Validation {
            field: field.into(),
            reason: format!("expected a positive number of seconds, got {value}"),
        })
}

fn device_list(
    field: &str,
    result: Result<Vec<StaticDevice>, CoreError>,
) -> Result<Vec<StaticDevice>, ConfigError> {
    result.map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: match e {
            CoreError::Config { message } => message,
            other => other.to_string(),
        },
    })
}

/// Build the manager configuration. Device list errors name the bad entry.
pub fn config_to_manager_config(cfg: &Config) -> Result<ManagerConfig, ConfigError> {
    let mut static_devices = device_list("known_devices", parse_known_devices(&cfg.known_devices))?;
    static_devices.extend(device_list(
        "direct_devices",
        parse_direct_devices(&cfg.direct_devices),
    )?);

    if cfg.connect_attempts == 0 {
        return Err(ConfigError::Validation {
            field: "connect_attempts".into(),
            reason: "must be at least 1".into(),
        });
    }

    let defaults = ManagerConfig::default();
    Ok(ManagerConfig {
        state_file: Some(cfg.state_file.clone().unwrap_or_else(default_state_file)),
        state_max_age: Duration::from_secs(u64::from(cfg.state_max_age_days) * 24 * 60 * 60),
        static_devices,
        discovery_timeout: ManagerConfig::clamp_discovery_timeout(seconds(
            "discovery_timeout",
            cfg.discovery_timeout,
        )?),
        skip_udp_discovery: cfg.skip_udp_discovery,
        local_only: cfg.local_only,
        simulator_ports: cfg.simulator_ports.clone(),
        request_timeout: seconds("request_timeout", cfg.request_timeout)?,
        command_timeout: seconds("command_timeout", cfg.command_timeout)?,
        connect_retry: RetryConfig {
            attempts: cfg.connect_attempts,
            ..defaults.connect_retry
        },
        default_device_number: defaults.default_device_number,
    })
}
