//! Direct vehicle commands: ping, mode change, abort

use tracing::{info, warn};

use skylink_shared::CommandType;

use super::HandlerContext;
use crate::command::CommandServer;

pub(super) fn register(server: &CommandServer, ctx: &HandlerContext) {
    server.register_handler(CommandType::Ping, |_body| {
        info!("Ping from ground");
    });

    let vehicle = ctx.vehicle.clone();
    server.register_handler(CommandType::SetToGuided, move |_body| {
        let vehicle = vehicle.clone();
        tokio::spawn(async move {
            if !vehicle.set_to_guided().await {
                warn!("Could not set vehicle mode to GUIDED");
            }
        });
    });

    let vehicle = ctx.vehicle.clone();
    server.register_handler(CommandType::AbortMission, move |_body| {
        info!("Abort command from ground");
        let vehicle = vehicle.clone();
        // Deliberately bypasses the mission lock: abort must be issuable
        // while a mission holds the vehicle
        tokio::spawn(async move { vehicle.abort().await });
    });
}
