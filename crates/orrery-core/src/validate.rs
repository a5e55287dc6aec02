//! Parameter validation for device-specific methods.
//!
//! A static table of the parameter shapes Seestar firmware accepts. The
//! check is pure and runs before anything reaches the network. Methods not
//! in the table always pass; the table only knows how to reject shapes
//! that are known to fault on hardware.
//!
//! The most important entry is `scope_set_track_state`, which takes a
//! bare boolean. Wrapping it in an object (`{"on": true}`) makes the
//! device fail with error 207 and leaves tracking unchanged.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ValidationError;

// ── Rule table ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Shape {
    /// No parameters at all.
    None,
    /// A bare JSON boolean.
    Boolean { hint: &'static str },
    /// An object whose listed numeric fields fall in range.
    Object { fields: &'static [Field] },
}

#[derive(Debug, Clone, Copy)]
struct Field {
    name: &'static str,
    min: f64,
    max: f64,
    required: bool,
}

const fn field(name: &'static str, min: f64, max: f64, required: bool) -> Field {
    Field {
        name,
        min,
        max,
        required,
    }
}

const TRACKING_HINT: &str = "Use a direct boolean (true/false), not an object like {\"on\": true}";

const RULES: &[(&str, Shape)] = &[
    ("scope_set_track_state", Shape::Boolean { hint: TRACKING_HINT }),
    (
        "scope_goto",
        Shape::Object {
            fields: &[
                field("ra_hour", 0.0, 24.0, true),
                field("dec_deg", -90.0, 90.0, true),
            ],
        },
    ),
    (
        "scope_speed_move",
        Shape::Object {
            fields: &[
                field("speed", 0.0, 1000.0, false),
                field("angle", 0.0, 360.0, false),
                field("dur_sec", 0.0, 60.0, false),
            ],
        },
    ),
    (
        "set_user_location",
        Shape::Object {
            fields: &[
                field("lat", -90.0, 90.0, true),
                field("lon", -180.0, 180.0, true),
            ],
        },
    ),
    (
        "move_focuser",
        Shape::Object {
            fields: &[field("step", 0.0, 3000.0, true)],
        },
    ),
    ("get_device_state", Shape::None),
    ("pi_shutdown", Shape::None),
    ("pi_reboot", Shape::None),
    ("scope_park", Shape::None),
    ("start_auto_focuse", Shape::None),
    ("stop_auto_focuse", Shape::None),
];

/// Methods exercised against the Seestar simulator.
const VERIFIED: &[&str] = &[
    "get_device_state",
    "pi_shutdown",
    "pi_reboot",
    "get_setting",
    "set_setting",
    "pi_station_state",
    "pi_is_verified",
    "scope_goto",
    "scope_speed_move",
    "scope_get_equ_coord",
    "scope_sync",
    "scope_park",
    "set_user_location",
    "iscope_start_view",
    "iscope_stop_view",
    "iscope_start_stack",
    "get_stack_info",
    "get_view_state",
    "get_camera_state",
    "get_camera_exp_and_bin",
    "get_focuser_position",
    "move_focuser",
    "start_auto_focuse",
    "stop_auto_focuse",
    "get_wheel_state",
    "get_wheel_setting",
    "set_wheel_position",
    "start_polar_align",
    "stop_polar_align",
];

fn rule(method: &str) -> Option<Shape> {
    RULES
        .iter()
        .find_map(|(name, shape)| (*name == method).then_some(*shape))
}

// ── Validation ───────────────────────────────────────────────────

/// Check `params` against the known shape for `method`.
///
/// `Value::Null` stands for "no parameters". Unknown methods pass.
pub fn validate(method: &str, params: &Value) -> Result<(), ValidationError> {
    let Some(shape) = rule(method) else {
        if !VERIFIED.contains(&method) {
            debug!(method, "no parameter rule for method; passing through");
        }
        return Ok(());
    };

    match shape {
        Shape::None => {
            if params.is_null() {
                Ok(())
            } else {
                Err(failure(
                    method,
                    format!("expects no parameters, got {}", type_name(params)),
                    "no parameters",
                    None,
                ))
            }
        }
        Shape::Boolean { hint } => {
            if params.is_boolean() {
                Ok(())
            } else {
                Err(failure(
                    method,
                    format!("expects a bare boolean, got {}", type_name(params)),
                    "true or false",
                    Some(hint),
                ))
            }
        }
        Shape::Object { fields } => validate_object(method, params, fields),
    }
}

fn validate_object(method: &str, params: &Value, fields: &[Field]) -> Result<(), ValidationError> {
    let expected = describe_fields(fields);
    let Some(obj) = params.as_object() else {
        return Err(failure(
            method,
            format!("expects object parameters, got {}", type_name(params)),
            &expected,
            None,
        ));
    };

    for f in fields {
        match obj.get(f.name) {
            None if f.required => {
                return Err(failure(
                    method,
                    format!("missing required parameter '{}'", f.name),
                    &expected,
                    None,
                ));
            }
            None => {}
            Some(value) => {
                let Some(n) = value.as_f64() else {
                    return Err(failure(
                        method,
                        format!("parameter '{}' must be a number", f.name),
                        &expected,
                        None,
                    ));
                };
                if n < f.min || n > f.max {
                    return Err(failure(
                        method,
                        format!("{} must be between {} and {}, got {n}", f.name, f.min, f.max),
                        &expected,
                        None,
                    ));
                }
            }
        }
    }
    Ok(())
}

fn describe_fields(fields: &[Field]) -> String {
    let inner = fields
        .iter()
        .map(|f| {
            let opt = if f.required { "" } else { "?" };
            format!("\"{}\"{opt}: number {}..{}", f.name, f.min, f.max)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{inner}}}")
}

fn failure(method: &str, message: String, expected: &str, hint: Option<&str>) -> ValidationError {
    ValidationError {
        method: method.to_owned(),
        message,
        expected: expected.to_owned(),
        hint: hint.map(str::to_owned),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Introspection ────────────────────────────────────────────────

/// What the validator knows about a method.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MethodInfo {
    pub method: String,
    pub verified: bool,
    pub has_rule: bool,
    pub expected: Option<String>,
    pub hint: Option<String>,
}

pub fn method_info(method: &str) -> MethodInfo {
    let shape = rule(method);
    MethodInfo {
        method: method.to_owned(),
        verified: VERIFIED.contains(&method),
        has_rule: shape.is_some(),
        expected: shape.map(|s| match s {
            Shape::None => "no parameters".to_owned(),
            Shape::Boolean { .. } => "true or false".to_owned(),
            Shape::Object { fields } => describe_fields(fields),
        }),
        hint: shape.and_then(|s| match s {
            Shape::Boolean { hint } => Some(hint.to_owned()),
            _ => None,
        }),
    }
}
