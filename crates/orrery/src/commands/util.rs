//! Shared helpers for command handlers.

use serde_json::Value;

use orrery_core::ToolResult;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

/// Parse an optional JSON argument; absent means no parameters.
pub fn parse_params(raw: Option<&str>) -> Result<Value, CliError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Value::Null),
        Some(text) => Ok(serde_json::from_str(text)?),
    }
}

/// Print a tool outcome or convert its error.
pub fn print_tool(result: ToolResult, global: &GlobalOpts) -> Result<(), CliError> {
    let resp = result?;
    let out = output::render_tool(&global.output, &resp)?;
    output::print_output(&out, global.quiet);
    Ok(())
}
