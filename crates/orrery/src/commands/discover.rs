//! Discovery and resolution handlers.

use std::time::Duration;

use tabled::Tabled;

use orrery_core::{ConnectionManager, DeviceRecord};

use crate::cli::{DiscoverArgs, GlobalOpts, ResolveArgs};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub(crate) struct RecordRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Source")]
    source: String,
}

impl From<&DeviceRecord> for RecordRow {
    fn from(r: &DeviceRecord) -> Self {
        Self {
            id: r.id.clone(),
            kind: r.kind.to_string(),
            name: r.display_name.clone(),
            address: r.address(),
            source: r.source.to_string(),
        }
    }
}

pub(crate) fn record_detail(r: &DeviceRecord) -> String {
    let mut lines = vec![
        format!("ID:        {}", r.id),
        format!("Kind:      {}", r.kind),
        format!("Number:    {}", r.number),
        format!("Name:      {}", r.display_name),
        format!("Address:   {}", r.address()),
        format!("Source:    {}", r.source),
        format!("Seen:      {}", r.discovered_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ];
    if r.requires_initialization() {
        lines.push("Startup:   required before commands (telescope startup)".into());
    }
    lines.join("\n")
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn discover(
    manager: &ConnectionManager,
    args: &DiscoverArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let timeout = args
        .timeout
        .map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(|_| CliError::Validation {
                field: "--timeout".into(),
                reason: format!("expected a non-negative number of seconds, got {secs}"),
                help: None,
            })
        })
        .transpose()?;

    let report = manager.discover(timeout).await;
    for failure in &report.failures {
        tracing::info!(probe = %failure.probe, reason = %failure.reason, "probe failed");
    }

    if report.devices.is_empty() && matches!(global.output, crate::cli::OutputFormat::Table) {
        output::print_output(
            "No devices found. Connect directly with name@host:port if the device is on another network.",
            global.quiet,
        );
        return Ok(());
    }

    let out = output::render_list(
        &global.output,
        &report.devices,
        |r| RecordRow::from(r),
        |r| r.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn resolve(
    manager: &ConnectionManager,
    args: &ResolveArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let record = manager.resolve(&args.identifier).await?;
    let out = output::render_single(&global.output, &record, record_detail, |r| r.id.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
