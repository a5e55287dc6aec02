//! Known-device and status handlers.

use serde::Serialize;
use tabled::Tabled;

use orrery_core::{
    Capabilities, ConnectionManager, ConnectionState, DeviceRecord, DeviceStatus, DiscoveryTools,
};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts, StatusArgs};
use crate::error::CliError;
use crate::output;

use super::discover::RecordRow;
use super::util;

pub async fn handle(
    manager: &ConnectionManager,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List => {
            let known = manager.list_known().await;
            let out = output::render_list(
                &global.output,
                &known,
                |r| RecordRow::from(r),
                |r| r.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        DevicesCommand::Info { identifier } => {
            let tools = DiscoveryTools::new(manager.clone());
            util::print_tool(tools.device_info(&identifier).await, global)
        }
        DevicesCommand::Forget => {
            let count = manager.store().list().await.len();
            manager.forget_all().await?;
            output::print_output(&format!("Forgot {count} stored device(s)"), global.quiet);
            Ok(())
        }
    }
}

// ── Status ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StatusView {
    device: DeviceRecord,
    state: ConnectionState,
    status: DeviceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    capabilities: Option<Capabilities>,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn status_detail(view: &StatusView) -> String {
    let mut rows = vec![
        FieldRow {
            field: "Device".into(),
            value: format!("{} ({})", view.device.display_name, view.device.id),
        },
        FieldRow {
            field: "Address".into(),
            value: view.device.address(),
        },
        FieldRow {
            field: "State".into(),
            value: view.state.to_string(),
        },
    ];

    if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(&view.status) {
        rows.extend(
            fields
                .into_iter()
                .filter(|(k, v)| k != "kind" && !v.is_null())
                .map(|(field, value)| FieldRow {
                    field,
                    value: value.to_string(),
                }),
        );
    }

    let mut out = tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string();
    out.push_str(&format!("\nState: {}", output::state_label(&view.state.to_string())));
    out
}

pub async fn status(
    manager: &ConnectionManager,
    args: &StatusArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let conn = manager.connect(&args.identifier).await?;
    let id = conn.id().to_owned();

    let view = StatusView {
        device: conn.record().clone(),
        state: conn.state(),
        status: manager.status(&id).await?,
        capabilities: manager.capabilities(&id).await.ok(),
    };

    let out = output::render_single(&global.output, &view, status_detail, |v| {
        v.state.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
