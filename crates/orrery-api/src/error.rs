use thiserror::Error;

/// Top-level error type for the `orrery-api` crate.
///
/// Covers every failure mode across the Alpaca surfaces: HTTP transport,
/// the device envelope, the management API, and UDP discovery.
/// `orrery-core` maps these into caller-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The HTTP client could not be built.
    #[error("HTTP client setup failed: {0}")]
    ClientBuild(String),

    /// Non-success HTTP status from the device server.
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    // ── Device envelope ─────────────────────────────────────────────
    /// The device answered with a non-zero `ErrorNumber`.
    #[error("Device error {code:#x}: {message}")]
    Device { code: i32, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Discovery ───────────────────────────────────────────────────
    /// Socket error while probing for Alpaca servers.
    #[error("Discovery socket error: {0}")]
    Discovery(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::Discovery(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the failure was a timeout at any layer.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Http { status: 404, .. } => true,
            _ => false,
        }
    }

    /// Extract the device-reported error number and message, if any.
    pub fn device_error(&self) -> Option<(i32, &str)> {
        match self {
            Self::Device { code, message } => Some((*code, message.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let busy = Error::Http {
            status: 503,
            url: "http://scope/api".into(),
            body: String::new(),
        };
        let missing = Error::Http {
            status: 404,
            url: "http://scope/api".into(),
            body: String::new(),
        };
        assert!(busy.is_transient());
        assert!(!missing.is_transient());
        assert!(missing.is_not_found());
    }

    #[test]
    fn device_errors_expose_code() {
        let err = Error::Device {
            code: 0x40B,
            message: "Slewing".into(),
        };
        assert_eq!(err.device_error(), Some((0x40B, "Slewing")));
        assert!(!err.is_transient());
    }
}
