//! Command handlers registered on the vehicle-side server
//!
//! Handlers run on the server's dispatch task, so anything that touches the
//! vehicle is spawned onto its own task before it starts polling; a pending
//! flight operation must never stall the command channel.

mod mission;
mod vehicle;

use std::sync::Arc;

use crate::command::CommandServer;
use crate::control::VehicleControl;
use crate::mission::{MissionCoordinator, TargetFinder};

/// Everything a handler may need, passed by handle from the composition root
#[derive(Clone)]
pub struct HandlerContext {
    pub vehicle: VehicleControl,
    pub coordinator: Arc<MissionCoordinator>,
    pub finder: Arc<dyn TargetFinder>,
}

/// Register every vehicle-side handler.
///
/// `GO_TO_GPS`, `ANALYZE_IMAGE_MISSION` and `FIND_AND_LAND_MISSION` stay
/// unhandled here: their mission bodies live in the vision pipeline outside
/// this crate. The server still validates and rebroadcasts them.
pub fn register_all(server: &CommandServer, ctx: &HandlerContext) {
    vehicle::register(server, ctx);
    mission::register(server, ctx);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::SinkExt;
    use tokio::net::TcpListener;
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    use super::*;
    use crate::autopilot::BenchAutopilot;
    use crate::mission::NullTargetFinder;

    /// End to end: a frame on the wire reaches the engine through the
    /// handler, the coordinator and the mission, off the dispatch task.
    #[tokio::test]
    async fn test_up_down_frame_drives_the_vehicle() {
        let link = Arc::new(BenchAutopilot::new());
        let vehicle = VehicleControl::new(link.clone());
        assert!(vehicle.set_to_guided().await);

        let ctx = HandlerContext {
            vehicle: vehicle.clone(),
            coordinator: Arc::new(MissionCoordinator::new(vehicle)),
            finder: Arc::new(NullTargetFinder),
        };
        let server = Arc::new(CommandServer::new());
        register_all(&server, &ctx);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(server.serve(listener));

        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.expect("connect");
        ws.send(Message::Text(
            r#"{"type": "UP_DOWN_MISSION", "body": {"alt": 5}}"#.into(),
        ))
        .await
        .expect("send");

        for _ in 0..200 {
            if link.takeoff_commands().await == vec![5.0] {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("takeoff never reached the autopilot link");
    }
}
