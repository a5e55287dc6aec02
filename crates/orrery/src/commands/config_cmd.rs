//! Config subcommands.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = global.config.clone().unwrap_or_else(orrery_config::config_path);

    match args.command {
        ConfigCommand::Show => {
            let config_error = |source| CliError::Config {
                path: path.display().to_string(),
                source,
            };
            let cfg = orrery_config::load_config_from(&path).map_err(config_error)?;
            let out = orrery_config::render_config(&cfg).map_err(config_error)?;
            output::print_output(out.trim_end(), global.quiet);
        }
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
        }
    }
    Ok(())
}
