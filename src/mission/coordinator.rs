//! Single-flight mission execution
//!
//! At most one mission may use the vehicle at a time. A submission racing an
//! executing mission is rejected immediately and distinguishably, never
//! queued behind it.

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::Mission;
use crate::control::VehicleControl;

/// What became of a mission submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissionOutcome {
    /// The mission ran to completion
    Completed,
    /// Another mission holds the vehicle; this one was rejected, not queued
    AlreadyRunning,
    /// The vehicle could not be armed; the mission never started
    ArmRejected,
    /// The mission started and failed; an abort was triggered
    Failed { reason: String },
}

/// Serializes mission execution against the one vehicle
pub struct MissionCoordinator {
    vehicle: VehicleControl,
    flight_lock: Mutex<()>,
}

impl MissionCoordinator {
    pub fn new(vehicle: VehicleControl) -> Self {
        Self {
            vehicle,
            flight_lock: Mutex::new(()),
        }
    }

    /// Run a mission under the flight lock.
    ///
    /// Arms before `start`; a failed `start` is reported and answered with an
    /// abort. The vehicle is disarmed on every exit path that acquired the
    /// lock, before the lock is released.
    pub async fn execute(&self, mission: &dyn Mission) -> MissionOutcome {
        let Ok(_flight) = self.flight_lock.try_lock() else {
            warn!(
                "Mission {} rejected: another mission is executing",
                mission.name()
            );
            return MissionOutcome::AlreadyRunning;
        };

        let outcome = if !self.vehicle.arm().await {
            warn!("Mission {} not started: vehicle would not arm", mission.name());
            MissionOutcome::ArmRejected
        } else {
            info!("Mission {} starting", mission.name());
            match mission.start(&self.vehicle).await {
                Ok(()) => {
                    info!("Mission {} completed", mission.name());
                    MissionOutcome::Completed
                }
                Err(e) => {
                    error!("Mission {} failed: {:#}", mission.name(), e);
                    self.vehicle.abort().await;
                    MissionOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        };

        // Disarm before the flight lock drops
        self.vehicle.disarm().await;
        outcome
    }
}
