// Alpaca wire types: the response envelope, device kinds, and management
// payloads. Field names follow the Alpaca JSON casing.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

// ── Envelope ─────────────────────────────────────────────────────────

/// The `{ Value, ErrorNumber, ErrorMessage, ... }` envelope every Alpaca
/// endpoint answers with. `Value` is absent on method calls that return
/// nothing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlpacaResponse<T> {
    #[serde(default = "Option::default")]
    pub value: Option<T>,
    #[serde(default)]
    pub error_number: i32,
    #[serde(default)]
    pub error_message: String,
    #[serde(rename = "ClientTransactionID", default)]
    pub client_transaction_id: u32,
    #[serde(rename = "ServerTransactionID", default)]
    pub server_transaction_id: u32,
}

// ── DeviceKind ───────────────────────────────────────────────────────

/// Alpaca device type. The lowercase name is the URL path segment.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum DeviceKind {
    Telescope,
    Camera,
    Focuser,
    FilterWheel,
    Dome,
    Rotator,
    ObservingConditions,
    SafetyMonitor,
    Switch,
    Unknown,
}

impl DeviceKind {
    /// Parse a device type string, falling back to [`Unknown`](Self::Unknown).
    pub fn from_alpaca(raw: &str) -> Self {
        raw.trim().parse().unwrap_or(Self::Unknown)
    }

    /// Path segment used in `/api/v1/{kind}/{number}/...`.
    pub fn path_segment(self) -> String {
        self.as_ref().to_ascii_lowercase()
    }

    /// Prefix used for synthesized identifiers, e.g. `telescope` in `telescope_1`.
    pub fn id_prefix(self) -> String {
        self.path_segment()
    }
}

// ── Management API ───────────────────────────────────────────────────

/// One entry of `/management/v1/configureddevices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfiguredDevice {
    pub device_name: String,
    pub device_type: String,
    pub device_number: u32,
    #[serde(rename = "UniqueID", default)]
    pub unique_id: String,
}

impl ConfiguredDevice {
    pub fn kind(&self) -> DeviceKind {
        DeviceKind::from_alpaca(&self.device_type)
    }
}

/// `/management/v1/description` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerDescription {
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub manufacturer_version: String,
    #[serde(default)]
    pub location: String,
}

// ── Camera state ─────────────────────────────────────────────────────

/// `CameraState` property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum CameraState {
    Idle,
    Waiting,
    Exposing,
    Reading,
    Download,
    Error,
}

impl CameraState {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Idle,
            1 => Self::Waiting,
            2 => Self::Exposing,
            3 => Self::Reading,
            4 => Self::Download,
            _ => Self::Error,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn device_kind_parses_case_insensitively() {
        assert_eq!(DeviceKind::from_alpaca("telescope"), DeviceKind::Telescope);
        assert_eq!(DeviceKind::from_alpaca("FilterWheel"), DeviceKind::FilterWheel);
        assert_eq!(DeviceKind::from_alpaca("CoverCalibrator"), DeviceKind::Unknown);
        assert_eq!(DeviceKind::FilterWheel.path_segment(), "filterwheel");
    }

    #[test]
    fn envelope_without_value_parses() {
        let resp: AlpacaResponse<bool> = serde_json::from_str(
            r#"{"ErrorNumber":0,"ErrorMessage":"","ClientTransactionID":4,"ServerTransactionID":9}"#,
        )
        .unwrap();
        assert!(resp.value.is_none());
        assert_eq!(resp.client_transaction_id, 4);
        assert_eq!(resp.server_transaction_id, 9);
    }

    #[test]
    fn configured_device_uses_alpaca_casing() {
        let dev: ConfiguredDevice = serde_json::from_str(
            r#"{"DeviceName":"Seestar S50","DeviceType":"Telescope","DeviceNumber":0,"UniqueID":"abc"}"#,
        )
        .unwrap();
        assert_eq!(dev.kind(), DeviceKind::Telescope);
        assert_eq!(dev.unique_id, "abc");
    }
}
