use std::time::Duration;

use serde_json::json;

use crate::manager::ConnectionManager;
use crate::model::{ConnectionState, DeviceRecord};

use super::{ToolResponse, ToolResult, invalid_argument};

/// Finding devices and describing them.
#[derive(Clone)]
pub struct DiscoveryTools {
    manager: ConnectionManager,
}

impl DiscoveryTools {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Sweep the network. `timeout_secs` is clamped to the configured maximum.
    pub async fn discover(&self, timeout_secs: Option<f64>) -> ToolResult {
        let timeout = timeout_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|_| {
                    invalid_argument(format!(
                        "timeout must be a non-negative number of seconds, got {secs}"
                    ))
                })
            })
            .transpose()?;

        let report = self.manager.discover(timeout).await;
        let devices: Vec<_> = report.devices.iter().map(device_summary).collect();

        let message = if devices.is_empty() {
            "No devices found. Connect directly with name@host:port if the device is on another network.".to_owned()
        } else {
            let names: Vec<_> = report
                .devices
                .iter()
                .map(|d| format!("{} ({})", d.display_name, d.id))
                .collect();
            format!("Found {} device(s): {}", devices.len(), names.join(", "))
        };

        Ok(ToolResponse::with_data(
            message,
            json!({
                "devices": devices,
                "failures": report.failures,
                "elapsed_ms": report.elapsed_ms,
            }),
        ))
    }

    /// Describe one device, with capabilities when it is connected.
    pub async fn device_info(&self, identifier: &str) -> ToolResult {
        let info = self.manager.device_info(identifier).await?;
        let message = format!(
            "{} ({}) at {}: {}",
            info.record.display_name,
            info.record.id,
            info.record.address(),
            info.state
        );
        let data = serde_json::to_value(&info).map_err(|e| invalid_argument(e.to_string()))?;
        Ok(ToolResponse::with_data(message, data))
    }

    /// Every known device with its connection state.
    pub async fn list_devices(&self) -> ToolResult {
        let known = self.manager.list_known().await;
        let rows: Vec<_> = known
            .iter()
            .map(|record| {
                let state = self.manager.get_state(&record.id);
                let mut row = device_summary(record);
                row["state"] = json!(state);
                row
            })
            .collect();

        let connected = known
            .iter()
            .filter(|r| self.manager.get_state(&r.id) != ConnectionState::Disconnected)
            .count();

        Ok(ToolResponse::with_data(
            format!("{} known device(s), {connected} connected", rows.len()),
            json!({ "devices": rows }),
        ))
    }
}

fn device_summary(record: &DeviceRecord) -> serde_json::Value {
    json!({
        "id": record.id,
        "kind": record.kind,
        "name": record.display_name,
        "address": record.address(),
        "source": record.source,
        "requires_initialization": record.requires_initialization(),
        "connect_hint": format!("connect {}", record.id),
    })
}
