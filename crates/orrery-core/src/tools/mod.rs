// ── Capability tools ──
//
// Task-shaped operations over the connection manager: each returns a
// human-readable message plus structured data, or a `ToolError`. No
// protocol framing lives here.

mod camera;
mod discovery;
mod telescope;

pub use camera::CameraTools;
pub use discovery::DiscoveryTools;
pub use telescope::{Direction, TelescopeTools};

use serde::Serialize;
use serde_json::Value;

use crate::error::ToolError;

/// Successful tool outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl ToolResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: Value::Null,
        }
    }

    pub fn with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

pub type ToolResult = Result<ToolResponse, ToolError>;

pub(crate) fn invalid_argument(message: impl Into<String>) -> ToolError {
    ToolError {
        kind: "validation".into(),
        message: message.into(),
        recoverable: true,
        suggestions: Vec::new(),
    }
}

// ── Formatting ───────────────────────────────────────────────────

/// `5.5881` -> `05h 35m 17.2s`
pub fn format_hours(hours: f64) -> String {
    let (h, m, s) = sexagesimal(hours.rem_euclid(24.0));
    // Rounding can carry up to 24h.
    format!("{:02}h {m:02}m {s:04.1}s", h % 24)
}

/// `-5.39` -> `-05° 23' 24.0"`
pub fn format_degrees(degrees: f64) -> String {
    let sign = if degrees < 0.0 { '-' } else { '+' };
    let (d, m, s) = sexagesimal(degrees.abs());
    format!("{sign}{d:02}° {m:02}' {s:04.1}\"")
}

fn sexagesimal(value: f64) -> (u32, u32, f64) {
    // Round at the tenth of a second first so 59.96s never prints as 60.0s.
    let tenths = (value * 36_000.0).round();
    let whole = (tenths / 10.0).floor();
    let secs = whole % 60.0 + (tenths % 10.0) / 10.0;
    let total_minutes = (whole / 60.0).floor();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
    let (d, m) = ((total_minutes / 60.0).floor() as u32, (total_minutes % 60.0) as u32);
    (d, m, secs)
}
