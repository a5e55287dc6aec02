// ── Core error types ──
//
// Caller-facing errors from orrery-core, grouped by the stage that
// produced them. Transport-layer `orrery_api::Error`s are translated
// with device and command context at the call site, so consumers never
// see raw HTTP or JSON failures. `ToolError` is the structured shape
// returned across the tool boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ConnectionState;

// ── Resolution ───────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    #[error("Device '{identifier}' not found")]
    NotFound {
        identifier: String,
        suggestions: Vec<String>,
    },

    #[error("Invalid connection string '{input}': {reason}")]
    InvalidConnectionString { input: String, reason: String },
}

impl ResolutionError {
    pub(crate) fn not_found(identifier: &str) -> Self {
        Self::NotFound {
            identifier: identifier.to_owned(),
            suggestions: vec![
                "Connect directly with a connection string: name@host:port (e.g. seestar@192.168.1.50:5555)".into(),
                "Run discovery to find devices on the local network".into(),
                "Check the static device list (ASCOM_KNOWN_DEVICES / ASCOM_DIRECT_DEVICES)".into(),
            ],
        }
    }
}

// ── Connection ───────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("Device '{id}' at {address} is unreachable after {attempts} attempt(s): {reason}")]
    Unreachable {
        id: String,
        address: String,
        attempts: u32,
        reason: String,
    },

    #[error("Device '{id}' is busy with another operation")]
    Busy { id: String },

    #[error("Device '{id}' is not ready (state: {state})")]
    NotReady { id: String, state: ConnectionState },

    #[error("Device '{id}' is not connected")]
    NotConnected { id: String },

    #[error("Device '{id}' did not answer '{command}' within {timeout_secs}s")]
    Timeout {
        id: String,
        command: String,
        timeout_secs: u64,
    },
}

// ── Validation ───────────────────────────────────────────────────

/// Outgoing parameters do not match the shape the device expects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid parameters for '{method}': {message}")]
pub struct ValidationError {
    pub method: String,
    pub message: String,
    /// Shape the device accepts, e.g. `true or false`.
    pub expected: String,
    /// How to fix the call.
    pub hint: Option<String>,
}

// ── Command ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// The device answered with a non-zero error number.
    #[error("Device '{id}' rejected '{command}' (error {code}): {message}")]
    DeviceFault {
        id: String,
        command: String,
        code: i32,
        message: String,
    },

    #[error("'{command}' is not supported by device '{id}': {reason}")]
    Unsupported {
        id: String,
        command: String,
        reason: String,
    },

    #[error("'{command}' on device '{id}' failed: {reason}")]
    Transport {
        id: String,
        command: String,
        reason: String,
    },
}

impl CommandError {
    /// Attach device and command context to a transport-layer error.
    pub fn from_api(id: &str, command: &str, err: &orrery_api::Error) -> Self {
        match err.device_error() {
            Some((code, message)) => Self::DeviceFault {
                id: id.to_owned(),
                command: command.to_owned(),
                code,
                message: message.to_owned(),
            },
            None => Self::Transport {
                id: id.to_owned(),
                command: command.to_owned(),
                reason: err.to_string(),
            },
        }
    }
}

// ── Persistence ──────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Device store I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Device store at {path} is unreadable: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Device store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ── CoreError ────────────────────────────────────────────────────

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Resolution(ResolutionError::NotFound { .. }) => "not_found",
            Self::Resolution(ResolutionError::InvalidConnectionString { .. }) => {
                "invalid_connection_string"
            }
            Self::Connection(ConnectionError::Unreachable { .. }) => "unreachable",
            Self::Connection(ConnectionError::Busy { .. }) => "busy",
            Self::Connection(ConnectionError::NotReady { .. }) => "not_ready",
            Self::Connection(ConnectionError::NotConnected { .. }) => "not_connected",
            Self::Connection(ConnectionError::Timeout { .. }) => "timeout",
            Self::Validation(_) => "validation",
            Self::Command(CommandError::DeviceFault { .. }) => "device_fault",
            Self::Command(CommandError::Unsupported { .. }) => "unsupported",
            Self::Command(CommandError::Transport { .. }) => "command_failed",
            Self::Persistence(_) => "persistence",
            Self::Config { .. } => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the caller can reasonably act and try again.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Command(CommandError::Unsupported { .. }) | Self::Config { .. } | Self::Internal(_)
        )
    }

    /// Actionable next steps for the caller.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Resolution(ResolutionError::NotFound { suggestions, .. }) => suggestions.clone(),
            Self::Resolution(ResolutionError::InvalidConnectionString { .. }) => {
                vec!["Use the form name@host:port or host:port".into()]
            }
            Self::Connection(ConnectionError::Unreachable { address, .. }) => vec![
                format!("Check that the device at {address} is powered on and on the network"),
                "Verify the host and port, then connect again".into(),
            ],
            Self::Connection(ConnectionError::Busy { .. }) => {
                vec!["Wait for the current operation to finish, then retry".into()]
            }
            Self::Connection(ConnectionError::NotReady { id, state }) => match state {
                ConnectionState::Connected => {
                    vec![format!("Initialize '{id}' (startup sequence) before issuing commands")]
                }
                _ => vec![format!("Wait until '{id}' is ready, then retry")],
            },
            Self::Connection(ConnectionError::NotConnected { id }) => {
                vec![format!("Connect to '{id}' first")]
            }
            Self::Connection(ConnectionError::Timeout { id, .. }) => {
                vec![format!("Reconnect to '{id}' before retrying")]
            }
            Self::Validation(v) => v
                .hint
                .iter()
                .cloned()
                .chain(std::iter::once(format!("Expected: {}", v.expected)))
                .collect(),
            Self::Command(CommandError::DeviceFault { code, .. }) => device_fault_hint(*code)
                .map(|h| vec![h.to_owned()])
                .unwrap_or_default(),
            Self::Command(CommandError::Transport { id, .. }) => {
                vec![format!("Check the network path to '{id}' and retry")]
            }
            Self::Command(CommandError::Unsupported { .. })
            | Self::Persistence(_)
            | Self::Config { .. }
            | Self::Internal(_) => Vec::new(),
        }
    }
}

/// Known Seestar result codes and what they usually mean.
pub fn device_fault_hint(code: i32) -> Option<&'static str> {
    match code {
        106 => Some("Invalid parameter format"),
        203 => Some("Equipment is moving; wait for the current motion to finish"),
        207 => Some("Failed to operate; check the parameter format (tracking takes a bare boolean)"),
        210 => Some("Solar filter required for this operation"),
        _ => None,
    }
}

// ── ToolError ────────────────────────────────────────────────────

/// Structured error object returned across the tool boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
    pub recoverable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl From<&CoreError> for ToolError {
    fn from(err: &CoreError) -> Self {
        Self {
            kind: err.kind().to_owned(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggestions: err.suggestions(),
        }
    }
}

impl From<CoreError> for ToolError {
    fn from(err: CoreError) -> Self {
        Self::from(&err)
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolError {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn not_found_always_carries_suggestions() {
        let err = CoreError::from(ResolutionError::not_found("telescope_1"));
        assert_eq!(err.kind(), "not_found");
        assert!(err.is_recoverable());
        assert!(
            err.suggestions()
                .iter()
                .any(|s| s.contains("name@host:port"))
        );
    }

    #[test]
    fn tool_error_serializes_without_empty_suggestions() {
        let err = CoreError::Internal("boom".into());
        let json = serde_json::to_value(ToolError::from(err)).unwrap();
        assert_eq!(json["kind"], "internal");
        assert_eq!(json["recoverable"], false);
        assert!(json.get("suggestions").is_none());
    }

    #[test]
    fn device_fault_keeps_code_and_message_verbatim() {
        let api = orrery_api::Error::Device {
            code: 207,
            message: "fail to operate".into(),
        };
        let err = CoreError::from(CommandError::from_api("seestar", "scope_set_track_state", &api));
        assert_eq!(err.kind(), "device_fault");
        let msg = err.to_string();
        assert!(msg.contains("seestar") && msg.contains("207") && msg.contains("fail to operate"));
        assert!(err.suggestions()[0].contains("bare boolean"));
    }

    #[test]
    fn validation_suggestions_include_hint_and_shape() {
        let err = CoreError::from(ValidationError {
            method: "scope_set_track_state".into(),
            message: "expected a boolean".into(),
            expected: "true or false".into(),
            hint: Some("Use direct boolean".into()),
        });
        assert_eq!(
            err.suggestions(),
            vec!["Use direct boolean".to_owned(), "Expected: true or false".to_owned()]
        );
    }
}
