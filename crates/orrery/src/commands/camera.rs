//! Camera command handlers.

use orrery_core::{CameraTools, ConnectionManager};

use crate::cli::{CameraArgs, CameraCommand, GlobalOpts};
use crate::error::CliError;

use super::util;

pub async fn handle(
    manager: &ConnectionManager,
    args: CameraArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let conn = manager.connect(&args.device).await?;
    let id = conn.id().to_owned();
    let tools = CameraTools::new(manager.clone());

    let result = match args.command {
        CameraCommand::Status => tools.status(&id).await,
        CameraCommand::Capture { exposure, dark } => tools.capture(&id, exposure, !dark).await,
    };
    util::print_tool(result, global)
}
