//! CLI error types with miette diagnostics.
//!
//! Core and tool errors arrive as structured `ToolError`s; their kind picks
//! the exit code and their suggestions become the help text.

use miette::Diagnostic;
use thiserror::Error;

use orrery_config::ConfigError;
use orrery_core::{CoreError, ToolError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Device ───────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(orrery::device))]
    Device {
        kind: String,
        message: String,
        #[help]
        help: Option<String>,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(orrery::validation))]
    Validation {
        field: String,
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error in {path}")]
    #[diagnostic(
        code(orrery::config),
        help("Check the config file and any ASCOM_* environment variables.")
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(orrery::json), help("Pass valid JSON, e.g. true or '{{\"step\": 1200}}'."))]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization failed: {0}")]
    #[diagnostic(code(orrery::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Device { kind, .. } => match kind.as_str() {
                "not_found" => exit_code::NOT_FOUND,
                "busy" | "not_ready" => exit_code::CONFLICT,
                "unreachable" | "command_failed" | "not_connected" => exit_code::CONNECTION,
                "timeout" => exit_code::TIMEOUT,
                "validation" | "invalid_connection_string" => exit_code::USAGE,
                _ => exit_code::GENERAL,
            },
            Self::Validation { .. } | Self::Json(_) | Self::Config { .. } => exit_code::USAGE,
            Self::Io(_) | Self::Yaml(_) => exit_code::GENERAL,
        }
    }
}

// ── ToolError / CoreError → CliError ─────────────────────────────────

impl From<ToolError> for CliError {
    fn from(err: ToolError) -> Self {
        let help = (!err.suggestions.is_empty()).then(|| err.suggestions.join("\n"));
        Self::Device {
            kind: err.kind,
            message: err.message,
            help,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        ToolError::from(err).into()
    }
}

impl From<orrery_core::ResolutionError> for CliError {
    fn from(err: orrery_core::ResolutionError) -> Self {
        CoreError::from(err).into()
    }
}
