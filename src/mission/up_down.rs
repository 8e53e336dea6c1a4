//! Takeoff, land

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::info;

use super::Mission;
use crate::control::VehicleControl;

/// Smoke-test flight: straight up to the target altitude, straight down.
pub struct UpDownMission {
    altitude: f64,
}

impl UpDownMission {
    pub fn new(altitude: f64) -> Self {
        Self { altitude }
    }
}

#[async_trait]
impl Mission for UpDownMission {
    fn name(&self) -> &str {
        "up-down"
    }

    async fn start(&self, vehicle: &VehicleControl) -> Result<()> {
        info!("Up-down mission to {:.1}m", self.altitude);
        if !vehicle.takeoff(self.altitude).await {
            bail!("takeoff to {:.1}m did not complete", self.altitude);
        }
        if !vehicle.land().await {
            bail!("landing did not confirm touchdown");
        }
        Ok(())
    }
}
