//! Expanding-square sweep for a ground target

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::info;

use super::Mission;
use crate::control::VehicleControl;

/// Downward target detector, backed by the vision pipeline outside this
/// crate. Polled once before every sweep leg.
#[async_trait]
pub trait TargetFinder: Send + Sync {
    async fn target_sighted(&self) -> bool;
}

/// Detector that never sights anything; flies the full sweep pattern.
pub struct NullTargetFinder;

#[async_trait]
impl TargetFinder for NullTargetFinder {
    async fn target_sighted(&self) -> bool {
        false
    }
}

/// Takeoff, sweep an expanding square of horizontal legs while watching the
/// target detector, land. The mission succeeds only when the target was
/// sighted; exhausting the pattern without a sighting is a failure.
pub struct CoarseScanMission {
    altitude: f64,
    leg: f64,
    legs: u32,
    finder: Arc<dyn TargetFinder>,
}

impl CoarseScanMission {
    /// `leg` is the initial leg length in meters; `legs` bounds the number
    /// of direction changes before the sweep gives up.
    pub fn new(altitude: f64, leg: f64, legs: u32, finder: Arc<dyn TargetFinder>) -> Self {
        Self {
            altitude,
            leg,
            legs,
            finder,
        }
    }

    /// Fly the expanding square. Returns whether the target was sighted.
    ///
    /// Direction changes follow the square spiral: one leg, then pairs of
    /// ever-longer legs, rotating a quarter turn each change and reversing
    /// sense every other change.
    async fn sweep(&self, vehicle: &VehicleControl) -> Result<bool> {
        let mut legs_left: i64 = 1;
        let mut legs_per_direction: i64 = 1;
        let mut direction_changes: u32 = 0;
        let mut east = 0.0_f64;
        let mut north = self.leg;
        let mut sense = 1.0_f64;

        while direction_changes < self.legs {
            if self.finder.target_sighted().await {
                info!("Target sighted after {direction_changes} direction changes");
                return Ok(true);
            }

            if legs_left == 0 {
                legs_per_direction += 1 - i64::from(direction_changes % 2);
                legs_left = legs_per_direction;
                if direction_changes % 2 != 0 {
                    sense = -sense;
                }
                direction_changes += 1;
                let swap = east;
                east = north.abs() * sense;
                north = swap.abs() * sense;
            } else {
                legs_left -= 1;
            }

            if !vehicle.goto_offset(east, north, 0.0).await {
                bail!("sweep leg ({east:.1}, {north:.1}) did not complete");
            }
        }

        Ok(false)
    }
}

#[async_trait]
impl Mission for CoarseScanMission {
    fn name(&self) -> &str {
        "coarse-scan"
    }

    async fn start(&self, vehicle: &VehicleControl) -> Result<()> {
        info!(
            "Coarse scan at {:.1}m, {:.1}m legs, {} direction changes",
            self.altitude, self.leg, self.legs
        );
        if !vehicle.takeoff(self.altitude).await {
            bail!("takeoff to {:.1}m did not complete", self.altitude);
        }
        if !self.sweep(vehicle).await? {
            // The coordinator answers this with an abort, which lands
            bail!("sweep exhausted without sighting the target");
        }
        if !vehicle.land().await {
            bail!("landing did not confirm touchdown");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::autopilot::{AutopilotLink, BenchAutopilot, VehicleMode};

    /// Sights the target after a fixed number of polls
    struct CountdownFinder {
        polls_until_sighted: u32,
        polls: AtomicU32,
    }

    #[async_trait]
    impl TargetFinder for CountdownFinder {
        async fn target_sighted(&self) -> bool {
            self.polls.fetch_add(1, Ordering::SeqCst) + 1 > self.polls_until_sighted
        }
    }

    async fn flight_ready() -> (Arc<BenchAutopilot>, VehicleControl) {
        let link = Arc::new(BenchAutopilot::new());
        let vehicle = VehicleControl::new(link.clone());
        assert!(vehicle.set_to_guided().await);
        assert!(vehicle.arm().await);
        (link, vehicle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sighting_ends_the_sweep_with_a_landing() {
        let (link, vehicle) = flight_ready().await;
        let finder = Arc::new(CountdownFinder {
            polls_until_sighted: 2,
            polls: AtomicU32::new(0),
        });

        CoarseScanMission::new(8.0, 2.0, 6, finder)
            .start(&vehicle)
            .await
            .expect("scan mission");

        assert_eq!(link.takeoff_commands().await, vec![8.0]);
        assert_eq!(link.mode().await, Some(VehicleMode::Land));
        // Two legs flown before the sighting, each ending in a stop setpoint
        assert!(!link.velocity_commands().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_sweep_is_a_mission_failure() {
        let (link, vehicle) = flight_ready().await;

        let err = CoarseScanMission::new(8.0, 2.0, 3, Arc::new(NullTargetFinder))
            .start(&vehicle)
            .await
            .expect_err("must fail without a sighting");

        assert!(err.to_string().contains("without sighting"));
        // The mission itself does not land; that is the coordinator's abort
        assert_ne!(link.mode().await, Some(VehicleMode::Land));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_legs_form_an_expanding_square() {
        let (link, vehicle) = flight_ready().await;
        let mission = CoarseScanMission::new(8.0, 2.0, 4, Arc::new(NullTargetFinder));

        let _ = mission.start(&vehicle).await;

        // Every leg ends with one zero-velocity stop; count legs by stops
        let stops = link
            .velocity_commands()
            .await
            .iter()
            .filter(|(_, n, e, d)| *n == 0.0 && *e == 0.0 && *d == 0.0)
            .count();
        // Legs per direction for 4 direction changes: 1, 3, 3, 4, then the
        // final change flies one more leg before the bound is checked
        assert_eq!(stops, 12);
    }
}
