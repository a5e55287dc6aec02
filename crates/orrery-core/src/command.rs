// ── Command API ──
//
// Every device operation flows through a `Command`. The manager validates
// it, claims the connection (Ready -> Busy), and hands it to the session,
// which routes it to the per-kind Alpaca surface.

use serde::Serialize;
use serde_json::Value;

use crate::error::ValidationError;
use crate::validate;

/// Seestar methods that move the mount or the focuser.
const MOTION_METHODS: &[&str] = &[
    "scope_goto",
    "scope_speed_move",
    "scope_park",
    "move_focuser",
    "start_auto_focuse",
];

/// All operations a connection can execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // ── Telescope ────────────────────────────────────────────────
    SlewToCoordinates { ra_hours: f64, dec_degrees: f64 },
    AbortSlew,
    Park,
    Unpark,
    FindHome,
    SetTracking(bool),

    // ── Camera ───────────────────────────────────────────────────
    StartExposure { duration_secs: f64, light: bool },
    AbortExposure,

    // ── Focuser ──────────────────────────────────────────────────
    MoveFocuser { position: i32 },
    HaltFocuser,

    // ── Any kind ─────────────────────────────────────────────────
    /// Raw Alpaca `Action`; `parameters` is passed through verbatim.
    Action { name: String, parameters: String },
    /// Seestar firmware method wrapped in `Action("method_sync", ...)`.
    /// `Value::Null` params are omitted from the payload.
    Method { method: String, params: Value },
}

impl Command {
    /// Name used in logs and errors.
    pub fn name(&self) -> &str {
        match self {
            Self::SlewToCoordinates { .. } => "slew_to_coordinates",
            Self::AbortSlew => "abort_slew",
            Self::Park => "park",
            Self::Unpark => "unpark",
            Self::FindHome => "find_home",
            Self::SetTracking(_) => "set_tracking",
            Self::StartExposure { .. } => "start_exposure",
            Self::AbortExposure => "abort_exposure",
            Self::MoveFocuser { .. } => "move_focuser",
            Self::HaltFocuser => "halt_focuser",
            Self::Action { name, .. } => name,
            Self::Method { method, .. } => method,
        }
    }

    /// Motion commands are rejected while the device reports it is moving.
    pub fn is_motion(&self) -> bool {
        match self {
            Self::SlewToCoordinates { .. }
            | Self::Park
            | Self::Unpark
            | Self::FindHome
            | Self::MoveFocuser { .. } => true,
            Self::Method { method, .. } => MOTION_METHODS.contains(&method.as_str()),
            Self::Action { name, parameters } if is_method_sync(name) => {
                unwrap_method_sync(parameters)
                    .is_ok_and(|(method, _)| MOTION_METHODS.contains(&method.as_str()))
            }
            _ => false,
        }
    }

    /// Local parameter checks. Never touches the network.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Method { method, params } => validate::validate(method, params),
            Self::Action { name, parameters } if is_method_sync(name) => {
                let (method, params) = unwrap_method_sync(parameters)?;
                validate::validate(&method, &params)
            }
            Self::SlewToCoordinates {
                ra_hours,
                dec_degrees,
            } => {
                if !(0.0..24.0).contains(ra_hours) {
                    return Err(out_of_range(self.name(), "ra_hours", "0 <= ra_hours < 24", *ra_hours));
                }
                if !(-90.0..=90.0).contains(dec_degrees) {
                    return Err(out_of_range(
                        self.name(),
                        "dec_degrees",
                        "-90 <= dec_degrees <= 90",
                        *dec_degrees,
                    ));
                }
                Ok(())
            }
            Self::StartExposure { duration_secs, .. } => {
                if duration_secs.is_finite() && *duration_secs > 0.0 {
                    Ok(())
                } else {
                    Err(out_of_range(
                        self.name(),
                        "duration_secs",
                        "duration_secs > 0",
                        *duration_secs,
                    ))
                }
            }
            _ => Ok(()),
        }
    }

    /// JSON payload for `Action("method_sync", ...)`.
    pub(crate) fn method_payload(method: &str, params: &Value) -> String {
        let payload = if params.is_null() {
            serde_json::json!({ "method": method })
        } else {
            serde_json::json!({ "method": method, "params": params })
        };
        payload.to_string()
    }
}

fn is_method_sync(action: &str) -> bool {
    action.trim().eq_ignore_ascii_case("method_sync")
}

/// Split a raw `method_sync` payload into method name and params.
/// Missing params are `Value::Null`.
fn unwrap_method_sync(parameters: &str) -> Result<(String, Value), ValidationError> {
    let malformed = |message: String| ValidationError {
        method: "method_sync".to_owned(),
        message,
        expected: r#"{"method": "<name>", "params": <value>}"#.to_owned(),
        hint: Some("Use send_method to have the payload built for you".to_owned()),
    };

    let mut payload: Value = serde_json::from_str(parameters)
        .map_err(|e| malformed(format!("parameters are not JSON: {e}")))?;
    let method = payload
        .get("method")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| malformed("missing string field 'method'".to_owned()))?;
    let params = payload
        .get_mut("params")
        .map(Value::take)
        .unwrap_or(Value::Null);
    Ok((method, params))
}

fn out_of_range(command: &str, field: &str, expected: &str, got: f64) -> ValidationError {
    ValidationError {
        method: command.to_owned(),
        message: format!("{field} out of range: {got}"),
        expected: expected.to_owned(),
        hint: None,
    }
}

/// Outcome of an executed command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandResult {
    /// The device accepted the command and returned nothing.
    Ok,
    /// The device returned a value (Action/Method output, parsed as JSON when possible).
    Value(Value),
}

impl CommandResult {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Ok => None,
            Self::Value(v) => Some(v),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Ok => Value::Null,
            Self::Value(v) => v,
        }
    }
}
