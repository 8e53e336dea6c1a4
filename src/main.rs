use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use skylink_shared::wire;
use vehicle_agent::autopilot::BenchAutopilot;
use vehicle_agent::command::handlers::{self, HandlerContext};
use vehicle_agent::command::CommandServer;
use vehicle_agent::control::VehicleControl;
use vehicle_agent::mission::{MissionCoordinator, NullTargetFinder};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let bind_addr = env::var("SKYLINK_BIND")
        .unwrap_or_else(|_| format!("0.0.0.0:{}", wire::COMMAND_PORT));

    // The bench link stands in for the MAVLink bridge, which lives outside
    // this crate and plugs in through the same trait
    let link = Arc::new(BenchAutopilot::new());
    let vehicle = VehicleControl::new(link);
    let coordinator = Arc::new(MissionCoordinator::new(vehicle.clone()));

    let server = Arc::new(CommandServer::new());
    server.set_on_peer_connected(|peer| info!("Ground peer {peer} joined"));
    server.set_on_peer_disconnected(|peer| info!("Ground peer {peer} left"));
    handlers::register_all(
        &server,
        &HandlerContext {
            vehicle: vehicle.clone(),
            coordinator,
            finder: Arc::new(NullTargetFinder),
        },
    );

    if !vehicle.set_to_guided().await {
        warn!("Could not set vehicle mode to GUIDED at startup");
    }

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding command server on {bind_addr}"))?;
    info!("Vehicle agent up, commands on {bind_addr}");

    tokio::select! {
        served = server.serve(listener) => served,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, aborting before exit");
            vehicle.abort().await;
            Ok(())
        }
    }
}
