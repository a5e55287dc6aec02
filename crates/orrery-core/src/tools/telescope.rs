use serde_json::{Value, json};
use strum::{Display, EnumString};
use tracing::warn;

use crate::command::Command;
use crate::manager::{ConnectionManager, InitParams};
use crate::model::ConnectionState;
use crate::session::{CapabilitySurface, DeviceStatus};
use crate::validate::method_info;

use super::{ToolResponse, ToolResult, format_degrees, format_hours, invalid_argument};

const DEFAULT_MOVE_SECS: f64 = 3.0;
const DEFAULT_MOVE_SPEED: f64 = 300.0;

/// Manual slew direction, mapped to the firmware's angle convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub fn angle(self) -> f64 {
        match self {
            Self::North => 0.0,
            Self::East => 90.0,
            Self::South => 180.0,
            Self::West => 270.0,
        }
    }
}

/// Mount operations.
#[derive(Clone)]
pub struct TelescopeTools {
    manager: ConnectionManager,
}

impl TelescopeTools {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Connect and summarize what the mount can do.
    pub async fn connect(&self, identifier: &str) -> ToolResult {
        let conn = self.manager.connect(identifier).await?;
        let record = conn.record().clone();
        let state = conn.state();

        let capabilities = self.manager.capabilities(&record.id).await.ok();
        let mut message = format!(
            "Connected to {} ({}) at {}",
            record.display_name,
            record.id,
            record.address()
        );
        if let Some(caps) = &capabilities {
            if let CapabilitySurface::Telescope {
                can_slew, can_park, ..
            } = caps.surface
            {
                message.push_str(&format!(
                    "; slew: {}, park: {}",
                    yes_no(can_slew),
                    yes_no(can_park)
                ));
            }
        }
        if state == ConnectionState::Connected {
            message.push_str(". Run safe_startup before issuing commands");
        }

        Ok(ToolResponse::with_data(
            message,
            json!({ "device": record, "state": state, "capabilities": capabilities }),
        ))
    }

    /// Optionally park, then disconnect. A failed park does not block the disconnect.
    pub async fn disconnect(&self, id: &str, park_first: bool) -> ToolResult {
        let mut parked = None;
        if park_first {
            parked = Some(match self.manager.execute(id, Command::Park).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(id, error = %e, "park before disconnect failed");
                    false
                }
            });
        }

        self.manager.disconnect(id).await?;
        let message = match parked {
            Some(true) => format!("Parked and disconnected {id}"),
            Some(false) => format!("Disconnected {id} (park failed; check the mount)"),
            None => format!("Disconnected {id}"),
        };
        Ok(ToolResponse::with_data(message, json!({ "parked": parked })))
    }

    pub async fn goto(&self, id: &str, ra_hours: f64, dec_degrees: f64) -> ToolResult {
        self.manager
            .execute(
                id,
                Command::SlewToCoordinates {
                    ra_hours,
                    dec_degrees,
                },
            )
            .await?;
        Ok(ToolResponse::with_data(
            format!(
                "Slewing {id} to RA {} Dec {}",
                format_hours(ra_hours),
                format_degrees(dec_degrees)
            ),
            json!({ "ra_hours": ra_hours, "dec_degrees": dec_degrees }),
        ))
    }

    pub async fn park(&self, id: &str) -> ToolResult {
        let result = self.manager.execute(id, Command::Park).await?;
        let already = result
            .value()
            .and_then(|v| v.get("already_parked"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let message = if already {
            format!("{id} is already parked")
        } else {
            format!("Parking {id}")
        };
        Ok(ToolResponse::with_data(message, json!({ "already_parked": already })))
    }

    pub async fn unpark(&self, id: &str) -> ToolResult {
        self.manager.execute(id, Command::Unpark).await?;
        Ok(ToolResponse::new(format!("Unparked {id}")))
    }

    /// Seestar mounts take the firmware method with a bare boolean; others
    /// use the standard `Tracking` property.
    pub async fn set_tracking(&self, id: &str, enabled: bool) -> ToolResult {
        let command = if self.is_seestar(id) {
            Command::Method {
                method: "scope_set_track_state".into(),
                params: Value::Bool(enabled),
            }
        } else {
            Command::SetTracking(enabled)
        };
        self.manager.execute(id, command).await?;
        Ok(ToolResponse::with_data(
            format!("Tracking {} on {id}", if enabled { "enabled" } else { "disabled" }),
            json!({ "tracking": enabled }),
        ))
    }

    /// Nudge the mount in a compass direction for `duration_secs`.
    pub async fn move_direction(
        &self,
        id: &str,
        direction: &str,
        duration_secs: Option<f64>,
        speed: Option<f64>,
    ) -> ToolResult {
        let dir: Direction = direction.parse().map_err(|_| {
            invalid_argument(format!(
                "unknown direction '{direction}'; use north, east, south, or west"
            ))
        })?;
        let params = json!({
            "speed": speed.unwrap_or(DEFAULT_MOVE_SPEED),
            "angle": dir.angle(),
            "dur_sec": duration_secs.unwrap_or(DEFAULT_MOVE_SECS),
        });

        self.manager
            .execute(
                id,
                Command::Method {
                    method: "scope_speed_move".into(),
                    params: params.clone(),
                },
            )
            .await?;
        Ok(ToolResponse::with_data(format!("Moving {id} {dir}"), params))
    }

    pub async fn get_position(&self, id: &str) -> ToolResult {
        match self.manager.status(id).await? {
            DeviceStatus::Telescope {
                right_ascension,
                declination,
                altitude,
                azimuth,
                tracking,
                slewing,
                at_park,
            } => {
                let mut message = format!(
                    "RA {} Dec {}",
                    format_hours(right_ascension),
                    format_degrees(declination)
                );
                if let (Some(alt), Some(az)) = (altitude, azimuth) {
                    message.push_str(&format!(" (Alt {alt:.2}°, Az {az:.2}°)"));
                }
                if slewing {
                    message.push_str(", slewing");
                }
                Ok(ToolResponse::with_data(
                    message,
                    json!({
                        "ra_hours": right_ascension,
                        "dec_degrees": declination,
                        "ra": format_hours(right_ascension),
                        "dec": format_degrees(declination),
                        "altitude": altitude,
                        "azimuth": azimuth,
                        "tracking": tracking,
                        "slewing": slewing,
                        "at_park": at_park,
                    }),
                ))
            }
            _ => Err(invalid_argument(format!("{id} is not a telescope"))),
        }
    }

    /// Raw Alpaca `Action` passthrough.
    pub async fn custom_action(&self, id: &str, action: &str, parameters: &str) -> ToolResult {
        let result = self
            .manager
            .execute(
                id,
                Command::Action {
                    name: action.to_owned(),
                    parameters: parameters.to_owned(),
                },
            )
            .await?;
        Ok(ToolResponse::with_data(
            format!("Action '{action}' completed on {id}"),
            result.into_value(),
        ))
    }

    /// Firmware method via `method_sync`, validated locally first.
    pub async fn send_method(&self, id: &str, method: &str, params: Value) -> ToolResult {
        let info = method_info(method);
        let result = self
            .manager
            .execute(
                id,
                Command::Method {
                    method: method.to_owned(),
                    params,
                },
            )
            .await?;

        let mut message = format!("Method '{method}' completed on {id}");
        if !info.verified {
            message.push_str(" (unverified method; check the result)");
        }
        Ok(ToolResponse::with_data(message, result.into_value()))
    }

    /// Location first, then the start-up sequence.
    pub async fn safe_startup(&self, id: &str, params: &InitParams) -> ToolResult {
        let result = self.manager.initialize(id, params).await?;
        Ok(ToolResponse::with_data(
            format!(
                "{id} initialized at lat {:.4}, lon {:.4}",
                params.latitude, params.longitude
            ),
            result,
        ))
    }

    fn is_seestar(&self, id: &str) -> bool {
        self.manager
            .get_connection(id)
            .is_some_and(|c| c.record().requires_initialization())
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn directions_map_to_firmware_angles() {
        assert_eq!("north".parse::<Direction>().unwrap().angle(), 0.0);
        assert_eq!("East".parse::<Direction>().unwrap().angle(), 90.0);
        assert_eq!("SOUTH".parse::<Direction>().unwrap().angle(), 180.0);
        assert_eq!("west".parse::<Direction>().unwrap().angle(), 270.0);
        assert!("up".parse::<Direction>().is_err());
    }
}
