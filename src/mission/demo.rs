//! Takeoff, cross to a GPS target, land

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::info;

use super::Mission;
use crate::autopilot::GlobalPosition;
use crate::control::VehicleControl;

/// The flight demo: climb to the target altitude, fly to the target
/// position, come back down.
pub struct DemoMission {
    target: GlobalPosition,
}

impl DemoMission {
    pub fn new(target: GlobalPosition) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Mission for DemoMission {
    fn name(&self) -> &str {
        "demo"
    }

    async fn start(&self, vehicle: &VehicleControl) -> Result<()> {
        info!("Demo mission to {}", self.target);
        if !vehicle.takeoff(self.target.alt).await {
            bail!("takeoff to {:.1}m did not complete", self.target.alt);
        }
        if !vehicle.goto_position(self.target).await {
            bail!("did not arrive at {}", self.target);
        }
        if !vehicle.land().await {
            bail!("landing did not confirm touchdown");
        }
        Ok(())
    }
}
