//! Telescope command handlers.

use orrery_core::{ConnectionManager, ConnectionState, InitParams, TelescopeTools};

use crate::cli::{GlobalOpts, TelescopeArgs, TelescopeCommand, Toggle};
use crate::error::CliError;

use super::util;

pub async fn handle(
    manager: &ConnectionManager,
    args: TelescopeArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let tools = TelescopeTools::new(manager.clone());

    let conn = manager.connect(&args.device).await?;
    let id = conn.id().to_owned();

    if let (Some(lat), Some(lon)) = (args.lat, args.lon) {
        if conn.state() == ConnectionState::Connected
            && !matches!(args.command, TelescopeCommand::Startup { .. })
        {
            tracing::info!(%id, "running start-up sequence before command");
            tools.safe_startup(&id, &InitParams::new(lat, lon)).await?;
        }
    }

    let result = match args.command {
        TelescopeCommand::Position => tools.get_position(&id).await,
        TelescopeCommand::Goto { ra, dec } => tools.goto(&id, ra, dec).await,
        TelescopeCommand::Park => tools.park(&id).await,
        TelescopeCommand::Unpark => tools.unpark(&id).await,
        TelescopeCommand::Track { state } => {
            tools.set_tracking(&id, matches!(state, Toggle::On)).await
        }
        TelescopeCommand::Move {
            direction,
            duration,
            speed,
        } => tools.move_direction(&id, &direction, duration, speed).await,
        TelescopeCommand::Startup {
            lat,
            lon,
            no_move_arm,
        } => {
            let params = InitParams {
                move_arm: !no_move_arm,
                ..InitParams::new(lat, lon)
            };
            tools.safe_startup(&id, &params).await
        }
        TelescopeCommand::Action { name, parameters } => {
            tools.custom_action(&id, &name, &parameters).await
        }
        TelescopeCommand::Method { method, params } => {
            let params = util::parse_params(params.as_deref())?;
            tools.send_method(&id, &method, params).await
        }
        TelescopeCommand::Disconnect { park } => tools.disconnect(&id, park).await,
    };

    util::print_tool(result, global)
}
