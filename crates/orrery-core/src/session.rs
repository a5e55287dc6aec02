// ── Device sessions ──
//
// A session is the exclusively-owned Alpaca client behind one connection,
// tagged by device kind. Each kind exposes its own command, status, and
// capability surface; commands aimed at the wrong kind are rejected as
// unsupported before any request is sent.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use orrery_api::{AlpacaClient, CameraState, TransportConfig};

use crate::command::{Command, CommandResult};
use crate::error::{CommandError, ConnectionError, CoreError};
use crate::model::{DeviceKind, DeviceRecord};

// ── DeviceSession ────────────────────────────────────────────────

#[derive(Debug)]
pub enum DeviceSession {
    Telescope(AlpacaClient),
    Camera(AlpacaClient),
    Focuser(AlpacaClient),
    /// Kinds without a dedicated surface: common members and actions only.
    Generic(AlpacaClient),
}

impl DeviceSession {
    /// Build the client for `record`. No network I/O happens here.
    pub fn for_record(record: &DeviceRecord, transport: &TransportConfig) -> Result<Self, orrery_api::Error> {
        let base = AlpacaClient::server_url(&record.host, record.port)?;
        let client = AlpacaClient::new(base, record.kind, record.number, transport)?;
        Ok(Self::wrap(record.kind, client))
    }

    pub fn wrap(kind: DeviceKind, client: AlpacaClient) -> Self {
        match kind {
            DeviceKind::Telescope => Self::Telescope(client),
            DeviceKind::Camera => Self::Camera(client),
            DeviceKind::Focuser => Self::Focuser(client),
            _ => Self::Generic(client),
        }
    }

    pub fn client(&self) -> &AlpacaClient {
        match self {
            Self::Telescope(c) | Self::Camera(c) | Self::Focuser(c) | Self::Generic(c) => c,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.client().kind()
    }

    /// Claim the device (`Connected = true`) and read it back.
    pub(crate) async fn open(&self) -> Result<(), orrery_api::Error> {
        let client = self.client();
        client.set_connected(true).await?;
        if client.connected().await? {
            Ok(())
        } else {
            Err(orrery_api::Error::Device {
                code: 0x407,
                message: "device reported Connected=false after connect".into(),
            })
        }
    }

    pub(crate) async fn close(&self) -> Result<(), orrery_api::Error> {
        self.client().set_connected(false).await
    }

    // ── Command routing ──────────────────────────────────────────

    pub(crate) async fn run(&self, id: &str, command: &Command) -> Result<CommandResult, CoreError> {
        let api = |e: orrery_api::Error| CoreError::from(CommandError::from_api(id, command.name(), &e));

        if command.is_motion() {
            if let Self::Telescope(scope) = self {
                if scope.slewing().await.map_err(api)? {
                    debug!(id, command = command.name(), "rejecting motion while slewing");
                    return Err(ConnectionError::Busy { id: id.to_owned() }.into());
                }
            }
        }

        match (self, command) {
            // ── Any kind ─────────────────────────────────────────
            (_, Command::Action { name, parameters }) => {
                let raw = self.client().action(name, parameters).await.map_err(api)?;
                Ok(CommandResult::Value(parse_action_output(&raw)))
            }
            (_, Command::Method { method, params }) => {
                let payload = Command::method_payload(method, params);
                let raw = self
                    .client()
                    .action("method_sync", &payload)
                    .await
                    .map_err(api)?;
                let output = parse_action_output(&raw);
                if let Some(fault) = method_fault(id, method, &output) {
                    return Err(fault.into());
                }
                Ok(CommandResult::Value(output))
            }

            // ── Telescope ────────────────────────────────────────
            (
                Self::Telescope(scope),
                Command::SlewToCoordinates {
                    ra_hours,
                    dec_degrees,
                },
            ) => {
                if !scope.can_slew().await.map_err(api)? {
                    return Err(unsupported(id, command, "mount cannot slew").into());
                }
                scope
                    .slew_to_coordinates_async(*ra_hours, *dec_degrees)
                    .await
                    .map_err(api)?;
                Ok(CommandResult::Ok)
            }
            (Self::Telescope(scope), Command::AbortSlew) => {
                scope.abort_slew().await.map_err(api)?;
                Ok(CommandResult::Ok)
            }
            (Self::Telescope(scope), Command::Park) => {
                if !scope.can_park().await.map_err(api)? {
                    return Err(unsupported(id, command, "mount cannot park").into());
                }
                if scope.at_park().await.map_err(api)? {
                    return Ok(CommandResult::Value(serde_json::json!({ "already_parked": true })));
                }
                scope.park().await.map_err(api)?;
                Ok(CommandResult::Ok)
            }
            (Self::Telescope(scope), Command::Unpark) => {
                scope.unpark().await.map_err(api)?;
                Ok(CommandResult::Ok)
            }
            (Self::Telescope(scope), Command::FindHome) => {
                if !scope.can_find_home().await.map_err(api)? {
                    return Err(unsupported(id, command, "mount cannot find home").into());
                }
                scope.find_home().await.map_err(api)?;
                Ok(CommandResult::Ok)
            }
            (Self::Telescope(scope), Command::SetTracking(on)) => {
                scope.set_tracking(*on).await.map_err(api)?;
                Ok(CommandResult::Ok)
            }

            // ── Camera ───────────────────────────────────────────
            (
                Self::Camera(camera),
                Command::StartExposure {
                    duration_secs,
                    light,
                },
            ) => {
                camera
                    .start_exposure(*duration_secs, *light)
                    .await
                    .map_err(api)?;
                Ok(CommandResult::Ok)
            }
            (Self::Camera(camera), Command::AbortExposure) => {
                camera.abort_exposure().await.map_err(api)?;
                Ok(CommandResult::Ok)
            }

            // ── Focuser ──────────────────────────────────────────
            (Self::Focuser(focuser), Command::MoveFocuser { position }) => {
                focuser.move_to(*position).await.map_err(api)?;
                Ok(CommandResult::Ok)
            }
            (Self::Focuser(focuser), Command::HaltFocuser) => {
                focuser.halt().await.map_err(api)?;
                Ok(CommandResult::Ok)
            }

            (session, _) => Err(unsupported(
                id,
                command,
                &format!("not available on a {} device", session.kind()),
            )
            .into()),
        }
    }

    // ── Read-only surfaces ───────────────────────────────────────

    /// Current readings for this device kind.
    pub(crate) async fn status(&self) -> Result<DeviceStatus, orrery_api::Error> {
        Ok(match self {
            Self::Telescope(scope) => DeviceStatus::Telescope {
                right_ascension: scope.right_ascension().await?,
                declination: scope.declination().await?,
                altitude: scope.altitude().await.ok(),
                azimuth: scope.azimuth().await.ok(),
                tracking: scope.tracking().await?,
                slewing: scope.slewing().await?,
                at_park: scope.at_park().await.ok(),
            },
            Self::Camera(camera) => DeviceStatus::Camera {
                state: camera.camera_state().await?,
                image_ready: camera.image_ready().await?,
                percent_completed: camera.percent_completed().await.ok(),
                ccd_temperature: camera.ccd_temperature().await.ok(),
                cooler_on: camera.cooler_on().await.ok(),
            },
            Self::Focuser(focuser) => DeviceStatus::Focuser {
                position: focuser.position().await.ok(),
                is_moving: focuser.is_moving().await?,
                temperature: focuser.focuser_temperature().await.ok(),
            },
            Self::Generic(client) => DeviceStatus::Generic {
                connected: client.connected().await?,
            },
        })
    }

    /// Static capabilities, read once per connection by the tools.
    pub(crate) async fn capabilities(&self) -> Result<Capabilities, orrery_api::Error> {
        let client = self.client();
        let name = client.name().await.unwrap_or_default();
        let driver = client.driver_info().await.ok();

        let surface = match self {
            Self::Telescope(scope) => CapabilitySurface::Telescope {
                can_slew: scope.can_slew().await?,
                can_slew_async: scope.can_slew_async().await.unwrap_or(false),
                can_park: scope.can_park().await?,
                can_set_tracking: scope.can_set_tracking().await.unwrap_or(false),
                can_find_home: scope.can_find_home().await.unwrap_or(false),
            },
            Self::Camera(camera) => CapabilitySurface::Camera {
                sensor_name: camera.sensor_name().await.ok(),
                width: camera.camera_x_size().await?,
                height: camera.camera_y_size().await?,
                bin_x: camera.bin_x().await.unwrap_or(1),
                bin_y: camera.bin_y().await.unwrap_or(1),
            },
            Self::Focuser(focuser) => CapabilitySurface::Focuser {
                absolute: focuser.absolute().await?,
                max_step: focuser.max_step().await?,
            },
            Self::Generic(_) => CapabilitySurface::Generic,
        };

        Ok(Capabilities {
            name,
            driver,
            supported_actions: client.supported_actions().await.unwrap_or_default(),
            surface,
        })
    }
}

fn unsupported(id: &str, command: &Command, reason: &str) -> CommandError {
    CommandError::Unsupported {
        id: id.to_owned(),
        command: command.name().to_owned(),
        reason: reason.to_owned(),
    }
}

/// Action output is a string; drivers usually put JSON in it.
fn parse_action_output(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

/// Firmware methods report failure as a non-zero `code` in the result body.
fn method_fault(id: &str, method: &str, output: &Value) -> Option<CommandError> {
    let code = output.get("code")?.as_i64().filter(|c| *c != 0)?;
    let message = output
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("method failed")
        .to_owned();
    Some(CommandError::DeviceFault {
        id: id.to_owned(),
        command: method.to_owned(),
        code: i32::try_from(code).unwrap_or(i32::MAX),
        message,
    })
}

// ── Status & capabilities ────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceStatus {
    Telescope {
        right_ascension: f64,
        declination: f64,
        altitude: Option<f64>,
        azimuth: Option<f64>,
        tracking: bool,
        slewing: bool,
        at_park: Option<bool>,
    },
    Camera {
        state: CameraState,
        image_ready: bool,
        percent_completed: Option<i32>,
        ccd_temperature: Option<f64>,
        cooler_on: Option<bool>,
    },
    Focuser {
        position: Option<i32>,
        is_moving: bool,
        temperature: Option<f64>,
    },
    Generic {
        connected: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub name: String,
    pub driver: Option<String>,
    pub supported_actions: Vec<String>,
    #[serde(flatten)]
    pub surface: CapabilitySurface,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilitySurface {
    Telescope {
        can_slew: bool,
        can_slew_async: bool,
        can_park: bool,
        can_set_tracking: bool,
        can_find_home: bool,
    },
    Camera {
        sensor_name: Option<String>,
        width: i32,
        height: i32,
        bin_x: i32,
        bin_y: i32,
    },
    Focuser {
        absolute: bool,
        max_step: i32,
    },
    Generic,
}
