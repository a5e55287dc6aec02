//! Command dispatch: bridges CLI args -> manager and tools -> output formatting.

pub mod camera;
pub mod config_cmd;
pub mod devices;
pub mod discover;
pub mod telescope;
pub mod util;
pub mod validate;

use orrery_core::ConnectionManager;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a manager-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    manager: &ConnectionManager,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Discover(args) => discover::discover(manager, &args, global).await,
        Command::Resolve(args) => discover::resolve(manager, &args, global).await,
        Command::Devices(args) => devices::handle(manager, args, global).await,
        Command::Status(args) => devices::status(manager, &args, global).await,
        Command::Telescope(args) => telescope::handle(manager, args, global).await,
        Command::Camera(args) => camera::handle(manager, args, global).await,
        Command::Config(args) => config_cmd::handle(&args, global),
        Command::Validate(args) => validate::handle(&args, global),
        // Completions are generated before a manager exists
        Command::Completions(_) => Ok(()),
    }
}
