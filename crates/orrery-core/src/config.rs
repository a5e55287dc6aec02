// ── Runtime configuration ──
//
// Built by the caller (see orrery-config). Core never reads config
// files; the only disk it touches is the device store.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::CoreError;

/// Upper bound on a discovery sweep.
pub const MAX_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default Alpaca ports probed on loopback for simulators.
pub const DEFAULT_SIMULATOR_PORTS: &[u16] = &[11111, 5555];

// ── StaticDevice ─────────────────────────────────────────────────

/// A device listed in static configuration.
///
/// `host:port:name` entries get an ordinal id at resolution time;
/// `id:host:port:name` entries carry their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticDevice {
    pub id: Option<String>,
    pub host: String,
    pub port: u16,
    pub display_name: String,
}

/// Parse a comma-separated list of `host:port:name` entries.
pub fn parse_known_devices(raw: &str) -> Result<Vec<StaticDevice>, CoreError> {
    entries(raw)
        .map(|entry| match entry.split(':').collect::<Vec<_>>().as_slice() {
            [host, port, name] => static_device(entry, None, host, port, name),
            _ => Err(invalid_entry(entry, "expected host:port:name")),
        })
        .collect()
}

/// Parse a comma-separated list of `id:host:port:name` entries.
pub fn parse_direct_devices(raw: &str) -> Result<Vec<StaticDevice>, CoreError> {
    entries(raw)
        .map(|entry| match entry.split(':').collect::<Vec<_>>().as_slice() {
            [id, host, port, name] => static_device(entry, Some(*id), host, port, name),
            _ => Err(invalid_entry(entry, "expected id:host:port:name")),
        })
        .collect()
}

fn entries(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|e| !e.is_empty())
}

fn static_device(
    entry: &str,
    id: Option<&str>,
    host: &str,
    port: &str,
    name: &str,
) -> Result<StaticDevice, CoreError> {
    if host.trim().is_empty() {
        return Err(invalid_entry(entry, "host is empty"));
    }
    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| invalid_entry(entry, "port must be a number between 1 and 65535"))?;
    if port == 0 {
        return Err(invalid_entry(entry, "port must be a number between 1 and 65535"));
    }
    Ok(StaticDevice {
        id: id.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()),
        host: host.trim().to_owned(),
        port,
        display_name: name.trim().to_owned(),
    })
}

fn invalid_entry(entry: &str, reason: &str) -> CoreError {
    CoreError::Config {
        message: format!("invalid device entry '{entry}': {reason}"),
    }
}

// ── RetryConfig ──────────────────────────────────────────────────

/// Bounded retry with exponential backoff for opening sessions.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
        }
    }
}

// ── ManagerConfig ────────────────────────────────────────────────

/// Everything a [`ConnectionManager`](crate::ConnectionManager) needs.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Device store location. `None` keeps the store in memory only.
    pub state_file: Option<PathBuf>,
    /// Store entries older than this are treated as absent.
    pub state_max_age: Duration,
    pub static_devices: Vec<StaticDevice>,
    pub discovery_timeout: Duration,
    pub skip_udp_discovery: bool,
    /// Ignore discovery responders outside loopback and private ranges.
    pub local_only: bool,
    pub simulator_ports: Vec<u16>,
    /// Per-HTTP-request timeout.
    pub request_timeout: Duration,
    /// Default bound on a single `execute()`.
    pub command_timeout: Duration,
    pub connect_retry: RetryConfig,
    /// Device number assumed when an identifier does not name one.
    pub default_device_number: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            state_file: None,
            state_max_age: Duration::from_secs(30 * 24 * 60 * 60),
            static_devices: Vec::new(),
            discovery_timeout: Duration::from_secs(5),
            skip_udp_discovery: false,
            local_only: true,
            simulator_ports: DEFAULT_SIMULATOR_PORTS.to_vec(),
            request_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            connect_retry: RetryConfig::default(),
            default_device_number: 1,
        }
    }
}

impl ManagerConfig {
    /// Clamp a requested discovery timeout to `(0, MAX_DISCOVERY_TIMEOUT]`.
    pub fn clamp_discovery_timeout(requested: Duration) -> Duration {
        if requested.is_zero() {
            return Duration::from_millis(100);
        }
        requested.min(MAX_DISCOVERY_TIMEOUT)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn known_devices_parse_triples() {
        let devices =
            parse_known_devices("192.168.1.50:5555:Seestar S50, localhost:11111:Simulator").unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].host, "192.168.1.50");
        assert_eq!(devices[0].port, 5555);
        assert_eq!(devices[0].display_name, "Seestar S50");
        assert!(devices[0].id.is_none());
        assert_eq!(devices[1].display_name, "Simulator");
    }

    #[test]
    fn direct_devices_parse_quads() {
        let devices = parse_direct_devices("telescope_99:10.0.0.5:5555:Backyard").unwrap();
        assert_eq!(devices[0].id.as_deref(), Some("telescope_99"));
        assert_eq!(devices[0].port, 5555);
    }

    #[test]
    fn bad_entries_name_the_offender() {
        let err = parse_known_devices("10.0.0.5:notaport:Scope").unwrap_err();
        assert!(err.to_string().contains("10.0.0.5:notaport:Scope"));
        assert!(parse_known_devices("just-a-host").is_err());
        assert!(parse_known_devices("").unwrap().is_empty());
    }

    #[test]
    fn discovery_timeout_is_clamped() {
        assert_eq!(
            ManagerConfig::clamp_discovery_timeout(Duration::from_secs(120)),
            MAX_DISCOVERY_TIMEOUT
        );
        assert_eq!(
            ManagerConfig::clamp_discovery_timeout(Duration::from_secs(2)),
            Duration::from_secs(2)
        );
    }
}
