//! Local parameter checks; never touches a device.

use serde::Serialize;

use orrery_core::validate::{self, MethodInfo};

use crate::cli::{GlobalOpts, ValidateArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Serialize)]
struct Verdict {
    #[serde(flatten)]
    info: MethodInfo,
    valid: bool,
}

fn detail(v: &Verdict) -> String {
    let mut lines = vec![format!("'{}' parameters are valid", v.info.method)];
    if let Some(expected) = &v.info.expected {
        lines.push(format!("Expects: {expected}"));
    }
    if !v.info.has_rule {
        lines.push("No parameter rule for this method; it will be sent as given".into());
    } else if !v.info.verified {
        lines.push("Method is not verified against device firmware".into());
    }
    lines.join("\n")
}

pub fn handle(args: &ValidateArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let params = util::parse_params(args.params.as_deref())?;

    validate::validate(&args.method, &params).map_err(|err| CliError::Validation {
        field: err.method,
        reason: err.message,
        help: Some(err.hint.unwrap_or_else(|| format!("Expected {}", err.expected))),
    })?;

    let verdict = Verdict {
        info: validate::method_info(&args.method),
        valid: true,
    };
    let out = output::render_single(&global.output, &verdict, detail, |v| v.info.method.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
