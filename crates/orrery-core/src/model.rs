// ── Domain model ──
//
// Device records, their provenance, and the connection state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use orrery_api::DeviceKind;

/// Display name used for connection strings that carry no `name@` prefix.
pub const DIRECT_CONNECTION_NAME: &str = "Direct Connection";

// ── RecordSource ─────────────────────────────────────────────────

/// Where a [`DeviceRecord`] came from. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordSource {
    NetworkDiscovery,
    Persisted,
    ConnectionString,
    StaticConfig,
}

// ── DeviceRecord ─────────────────────────────────────────────────

/// A reachable Alpaca endpoint: one device number on one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Caller-facing identifier, e.g. `telescope_1`.
    pub id: String,
    pub kind: DeviceKind,
    /// Alpaca device number on the server.
    pub number: u32,
    pub host: String,
    pub port: u16,
    pub display_name: String,
    pub discovered_at: DateTime<Utc>,
    pub source: RecordSource,
}

impl DeviceRecord {
    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Same server, same device slot.
    pub fn same_endpoint(&self, other: &Self) -> bool {
        self.host.eq_ignore_ascii_case(&other.host)
            && self.port == other.port
            && self.number == other.number
    }

    /// Seestar mounts must run their start-up sequence before motion commands.
    pub fn requires_initialization(&self) -> bool {
        self.kind == DeviceKind::Telescope && self.display_name.to_lowercase().contains("seestar")
    }

    pub fn with_source(mut self, source: RecordSource) -> Self {
        self.source = source;
        self
    }
}

/// Build the conventional `{kind}_{n}` identifier.
pub fn ordinal_id(kind: DeviceKind, n: u32) -> String {
    format!("{}_{n}", kind.id_prefix())
}

/// Split a `{kind}_{n}` identifier back into its parts.
///
/// Returns `None` when the prefix is not a known device kind or the suffix
/// is not a number.
pub fn parse_ordinal_id(id: &str) -> Option<(DeviceKind, u32)> {
    let (prefix, number) = id.rsplit_once('_')?;
    let kind = DeviceKind::from_alpaca(prefix);
    if kind == DeviceKind::Unknown {
        return None;
    }
    number.parse().ok().map(|n| (kind, n))
}

// ── ConnectionState ──────────────────────────────────────────────

/// Lifecycle of a live connection.
///
/// `Connecting -> Connected -> [Initializing -> Ready] -> Busy <-> Ready`;
/// any state may fall to `Error`; `Ready` and `Error` end in `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Initializing,
    Ready,
    Busy,
    Error,
    Disconnected,
}

impl ConnectionState {
    /// A cached connection in this state can be handed out as-is.
    pub fn is_reusable(self) -> bool {
        !matches!(self, Self::Error | Self::Disconnected)
    }
}

// ── Snapshots ────────────────────────────────────────────────────

/// Read-only view of a live connection for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub record: DeviceRecord,
    pub state: ConnectionState,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_ids_round_trip_through_parse() {
        assert_eq!(ordinal_id(DeviceKind::Camera, 2), "camera_2");
        assert_eq!(parse_ordinal_id("camera_2"), Some((DeviceKind::Camera, 2)));
        assert_eq!(
            parse_ordinal_id("filterwheel_0"),
            Some((DeviceKind::FilterWheel, 0))
        );
        assert_eq!(parse_ordinal_id("seestar"), None);
        assert_eq!(parse_ordinal_id("gizmo_1"), None);
        assert_eq!(parse_ordinal_id("telescope_x"), None);
    }

    #[test]
    fn reusable_states() {
        assert!(ConnectionState::Busy.is_reusable());
        assert!(!ConnectionState::Error.is_reusable());
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
    }
}
