use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tracing::debug;

use orrery_api::CameraState;

use crate::command::Command;
use crate::error::ToolError;
use crate::manager::ConnectionManager;
use crate::session::{CapabilitySurface, DeviceStatus};

use super::{ToolResponse, ToolResult, invalid_argument};

/// Grace period on top of the exposure length before giving up on ImageReady.
const READOUT_MARGIN: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Imaging operations. Frames stay on the device; only readiness is reported.
#[derive(Clone)]
pub struct CameraTools {
    manager: ConnectionManager,
    poll_interval: Duration,
}

impl CameraTools {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Connect and summarize the sensor.
    pub async fn connect(&self, identifier: &str) -> ToolResult {
        let conn = self.manager.connect(identifier).await?;
        let record = conn.record().clone();
        let capabilities = self.manager.capabilities(&record.id).await.ok();

        let mut message = format!(
            "Connected to {} ({}) at {}",
            record.display_name,
            record.id,
            record.address()
        );
        if let Some(CapabilitySurface::Camera {
            sensor_name,
            width,
            height,
            ..
        }) = capabilities.as_ref().map(|c| &c.surface)
        {
            message.push_str(&format!(
                "; sensor {} {width}x{height}",
                sensor_name.as_deref().unwrap_or("unknown")
            ));
        }

        Ok(ToolResponse::with_data(
            message,
            json!({ "device": record, "state": conn.state(), "capabilities": capabilities }),
        ))
    }

    /// Start an exposure on an idle camera and wait for the image to be ready.
    pub async fn capture(&self, id: &str, exposure_secs: f64, light: bool) -> ToolResult {
        if !(exposure_secs.is_finite() && exposure_secs > 0.0) {
            return Err(invalid_argument(format!(
                "exposure must be greater than 0 seconds, got {exposure_secs}"
            )));
        }
        let too_long = || invalid_argument(format!("exposure of {exposure_secs}s is too long"));
        let wait = Duration::try_from_secs_f64(exposure_secs)
            .ok()
            .and_then(|d| d.checked_add(READOUT_MARGIN))
            .filter(|w| Instant::now().checked_add(*w).is_some())
            .ok_or_else(too_long)?;

        let state = self.camera_state(id).await?;
        if state != CameraState::Idle {
            return Err(ToolError {
                kind: "busy".into(),
                message: format!("Camera {id} is {state}, not idle"),
                recoverable: true,
                suggestions: vec!["Wait for the current exposure to finish, then retry".into()],
            });
        }

        self.manager
            .execute(
                id,
                Command::StartExposure {
                    duration_secs: exposure_secs,
                    light,
                },
            )
            .await?;

        let started = Instant::now();
        let deadline = started.checked_add(wait).ok_or_else(too_long)?;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if let DeviceStatus::Camera { image_ready: true, .. } = self.manager.status(id).await? {
                break;
            }
            if Instant::now() >= deadline {
                return Err(ToolError {
                    kind: "timeout".into(),
                    message: format!(
                        "Image from {id} not ready {:.0}s after a {exposure_secs}s exposure",
                        started.elapsed().as_secs_f64()
                    ),
                    recoverable: true,
                    suggestions: vec!["Check the camera status and abort the exposure if it is stuck".into()],
                });
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        debug!(id, exposure_secs, elapsed, "exposure complete");
        Ok(ToolResponse::with_data(
            format!("Captured {exposure_secs}s {} frame on {id}", if light { "light" } else { "dark" }),
            json!({
                "exposure_secs": exposure_secs,
                "light": light,
                "image_ready": true,
                "elapsed_secs": elapsed,
            }),
        ))
    }

    pub async fn status(&self, id: &str) -> ToolResult {
        let status = self.manager.status(id).await?;
        let DeviceStatus::Camera {
            state,
            image_ready,
            percent_completed,
            ccd_temperature,
            ..
        } = &status
        else {
            return Err(invalid_argument(format!("{id} is not a camera")));
        };

        let mut message = format!("Camera {id}: {state}");
        if *image_ready {
            message.push_str(", image ready");
        }
        if let Some(pct) = percent_completed {
            message.push_str(&format!(", {pct}% complete"));
        }
        if let Some(t) = ccd_temperature {
            message.push_str(&format!(", sensor {t:.1}°C"));
        }

        let data = serde_json::to_value(&status).map_err(|e| invalid_argument(e.to_string()))?;
        Ok(ToolResponse::with_data(message, data))
    }

    async fn camera_state(&self, id: &str) -> Result<CameraState, ToolError> {
        match self.manager.status(id).await? {
            DeviceStatus::Camera { state, .. } => Ok(state),
            _ => Err(invalid_argument(format!("{id} is not a camera"))),
        }
    }
}
