//! Mission plans and the single-flight coordinator

mod coarse_scan;
mod coordinator;
mod demo;
mod up_down;

pub use coarse_scan::{CoarseScanMission, NullTargetFinder, TargetFinder};
pub use coordinator::{MissionCoordinator, MissionOutcome};
pub use demo::DemoMission;
pub use up_down::UpDownMission;

use anyhow::Result;
use async_trait::async_trait;

use crate::control::VehicleControl;

/// A unit of flight behavior with a single entry point.
///
/// Owned by the caller until handed to the coordinator, which does not
/// retain it after `start` returns. Failure is reported by returning `Err`,
/// never by panicking; the coordinator answers a failure with an abort.
#[async_trait]
pub trait Mission: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Fly the mission. The vehicle is already armed and in GUIDED mode.
    async fn start(&self, vehicle: &VehicleControl) -> Result<()>;
}
