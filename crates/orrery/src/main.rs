mod cli;
mod commands;
mod error;
mod output;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use orrery_core::{ConnectionManager, ManagerConfig};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Local-only commands need no manager
        Command::Config(args) => commands::config_cmd::handle(&args, &cli.global),
        Command::Validate(args) => commands::validate::handle(&args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "orrery", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let manager = ConnectionManager::open(build_manager_config(&cli.global)?).await;

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &manager, &cli.global).await;
            manager.shutdown().await;
            result
        }
    }
}

/// Config file + environment, then command-line overrides.
fn build_manager_config(global: &GlobalOpts) -> Result<ManagerConfig, CliError> {
    let path = global.config.clone().unwrap_or_else(orrery_config::config_path);
    let config_error = |source| CliError::Config {
        path: path.display().to_string(),
        source,
    };

    let cfg = orrery_config::load_config_from(&path).map_err(config_error)?;
    let mut manager = orrery_config::config_to_manager_config(&cfg).map_err(config_error)?;

    if global.no_udp {
        manager.skip_udp_discovery = true;
    }
    if let Some(secs) = global.timeout {
        manager.command_timeout = Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| CliError::Validation {
                field: "--timeout".into(),
                reason: format!("expected a positive number of seconds, got {secs}"),
                help: None,
            })?;
    }
    Ok(manager)
}
