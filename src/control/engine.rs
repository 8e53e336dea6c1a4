//! Vehicle control engine
//!
//! High-level, guarded flight operations over the autopilot link. Every
//! physically-actuated goal is awaited with a bounded predicate poll; guard
//! failures and timeouts resolve to `false` and are reported as warnings.
//! Nothing in here panics or propagates an error past an operation boundary.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::operation::Operation;
use crate::autopilot::{AutopilotLink, GlobalPosition, VehicleMode, VelocityFrame};

/// Altitude at or below which the vehicle counts as landed, meters
const LANDING_ALTITUDE: f64 = 1.0;
/// Fraction of the takeoff target that counts as reached
const MINIMUM_ALTITUDE_FACTOR: f64 = 0.95;
/// Arrival distance floor for position targets, meters
const DISTANCE_FROM_TARGET_THRESHOLD: f64 = 2.0;
/// Landing attempts before demanding manual control
const ABORT_ATTEMPTS: u32 = 3;
/// Budget for a confirmed landing
const LAND_TIMEOUT: Duration = Duration::from_secs(60);
/// Budget for reaching takeoff altitude
const TAKEOFF_TIMEOUT: Duration = Duration::from_secs(20);
/// Budget for reaching a global position target
const GOTO_TIMEOUT: Duration = Duration::from_secs(100);
/// Offset cruise speed at or beyond the speed-switch distance, m/s
const OFFSET_HIGH_SPEED: f64 = 1.0;
/// Offset cruise speed below the speed-switch distance, m/s
const OFFSET_LOW_SPEED: f64 = 0.1;
/// Offset distance at which the cruise speed switches regimes, meters
const OFFSET_SPEED_SWITCH_DISTANCE: f64 = 100.0;
/// Cadence at which offset velocity setpoints are re-sent
const SETPOINT_GAP: Duration = Duration::from_millis(100);
/// Meters per degree of latitude/longitude, flat-earth approximation
const METERS_PER_DEGREE: f64 = 1.113195e5;

/// Handle on the one live vehicle.
///
/// Cheap to clone; every clone drives the same autopilot link. Constructed
/// once at the composition root and passed to whoever needs to fly.
#[derive(Clone)]
pub struct VehicleControl {
    link: Arc<dyn AutopilotLink>,
}

impl VehicleControl {
    pub fn new(link: Arc<dyn AutopilotLink>) -> Self {
        Self { link }
    }

    /// Current altitude above ground, meters.
    ///
    /// Prefers the downward rangefinder corrected for roll/pitch tilt,
    /// `|cos(pitch) * cos(roll) * range|`, falling back to GPS-relative
    /// altitude when the sensor has no reading.
    pub async fn altitude(&self) -> f64 {
        match self.link.rangefinder_distance().await {
            Some(range) => {
                let att = self.link.attitude().await;
                (att.pitch.cos() * att.roll.cos() * range).abs()
            }
            None => self.link.relative_altitude().await,
        }
    }

    /// True when the current flight mode is GUIDED
    pub async fn is_guided(&self) -> bool {
        self.link.mode().await == Some(VehicleMode::Guided)
    }

    /// True when armed and in GUIDED
    pub async fn is_armed_and_guided(&self) -> bool {
        self.is_guided().await && self.link.armed().await
    }

    /// Switch flight mode and wait for the vehicle to confirm it
    pub async fn set_mode(&self, mode: VehicleMode) -> bool {
        if let Err(e) = self.link.set_mode(mode).await {
            warn!("Mode change to {} failed at the link: {:#}", mode, e);
            return false;
        }
        let link = self.link.clone();
        Operation::new(format!("mode change to {mode}"), move || {
            let link = link.clone();
            async move { link.mode().await == Some(mode) }
        })
        .run()
        .await
    }

    /// Put the vehicle into GUIDED, the mode every mission requires
    pub async fn set_to_guided(&self) -> bool {
        self.set_mode(VehicleMode::Guided).await
    }

    /// Arm the motors.
    ///
    /// Returns `true` immediately when already armed. Requires GUIDED mode;
    /// waits out the pre-arm checks, issues the arm request, then waits for
    /// the armed flag to confirm.
    pub async fn arm(&self) -> bool {
        if self.link.armed().await {
            info!("Vehicle is already armed");
            return true;
        }
        if !self.is_guided().await {
            warn!("Arm rejected: vehicle is not in GUIDED mode");
            return false;
        }

        let link = self.link.clone();
        let armable = Operation::new("pre-arm checks", move || {
            let link = link.clone();
            async move { link.is_armable().await }
        });
        if !armable.run().await {
            return false;
        }

        if let Err(e) = self.link.set_armed(true).await {
            warn!("Arm request failed at the link: {:#}", e);
            return false;
        }

        let link = self.link.clone();
        Operation::new("arm confirmation", move || {
            let link = link.clone();
            async move { link.armed().await }
        })
        .run()
        .await
    }

    /// Disarm the motors. Fire-and-forget, no confirmation wait.
    pub async fn disarm(&self) {
        if let Err(e) = self.link.set_armed(false).await {
            warn!("Disarm request failed at the link: {:#}", e);
        }
    }

    /// Descend and confirm touchdown.
    ///
    /// Sets LAND mode and watches the altitude. A slow mode confirmation
    /// does not cancel a descent that is already under way.
    pub async fn land(&self) -> bool {
        if !self.is_armed_and_guided().await {
            warn!("Landing rejected: vehicle is not armed and in GUIDED mode");
            return false;
        }
        if !self.set_mode(VehicleMode::Land).await {
            info!("LAND mode unconfirmed, watching altitude anyway");
        }

        let ctl = self.clone();
        Operation::new("touchdown", move || {
            let ctl = ctl.clone();
            async move { ctl.altitude().await <= LANDING_ALTITUDE }
        })
        .with_timeout(LAND_TIMEOUT)
        .run()
        .await
    }

    /// Climb to the target relative altitude, meters
    pub async fn takeoff(&self, target_altitude: f64) -> bool {
        if !self.is_armed_and_guided().await {
            warn!("Takeoff rejected: vehicle is not armed and in GUIDED mode");
            return false;
        }
        if let Err(e) = self.link.takeoff(target_altitude).await {
            warn!("Takeoff request failed at the link: {:#}", e);
            return false;
        }

        let floor = target_altitude * MINIMUM_ALTITUDE_FACTOR;
        let ctl = self.clone();
        Operation::new(format!("climb to {target_altitude:.1}m"), move || {
            let ctl = ctl.clone();
            async move { ctl.altitude().await >= floor }
        })
        .with_timeout(TAKEOFF_TIMEOUT)
        .run()
        .await
    }

    /// Fly to a global position and wait for arrival.
    ///
    /// Arrival means the remaining ground distance dropped within 1% of the
    /// initial distance, never tighter than the fixed threshold.
    pub async fn goto_position(&self, target: GlobalPosition) -> bool {
        let initial = ground_distance(self.link.position().await, target);
        let arrival = (initial * 0.01).max(DISTANCE_FROM_TARGET_THRESHOLD);
        info!("Navigating to {}, {:.1}m out", target, initial);

        if let Err(e) = self.link.send_global_position_setpoint(target).await {
            warn!("Position setpoint failed at the link: {:#}", e);
            return false;
        }

        let link = self.link.clone();
        Operation::new(format!("arrival at {target}"), move || {
            let link = link.clone();
            async move {
                let remaining = ground_distance(link.position().await, target);
                debug!("{:.1}m to target", remaining);
                remaining <= arrival
            }
        })
        .with_timeout(GOTO_TIMEOUT)
        .run()
        .await
    }

    /// Fly a straight-line offset from the current position, east/north/up
    /// meters.
    ///
    /// Streams velocity setpoints at a fixed cadence for the whole computed
    /// duration, then sends an explicit zero-velocity stop. Time-bounded
    /// rather than predicate-bounded: there is no arrival check.
    pub async fn goto_offset(&self, east: f64, north: f64, up: f64) -> bool {
        let distance = (east * east + north * north + up * up).sqrt();
        if distance == 0.0 {
            return true;
        }
        let speed = if distance >= OFFSET_SPEED_SWITCH_DISTANCE {
            OFFSET_HIGH_SPEED
        } else {
            OFFSET_LOW_SPEED
        };
        // Unit direction scaled to cruise speed, as NED components
        let vn = north / distance * speed;
        let ve = east / distance * speed;
        let vd = -(up / distance * speed);
        let duration = Duration::from_secs_f64(distance / speed);
        info!(
            "Offset leg ({:.1}, {:.1}, {:.1}): {:.1}m at {}m/s",
            east, north, up, distance, speed
        );

        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            if let Err(e) = self
                .link
                .send_velocity_setpoint(VelocityFrame::BodyNed, vn, ve, vd)
                .await
            {
                warn!("Velocity setpoint failed at the link: {:#}", e);
                return false;
            }
            sleep(SETPOINT_GAP).await;
        }

        if let Err(e) = self
            .link
            .send_velocity_setpoint(VelocityFrame::BodyNed, 0.0, 0.0, 0.0)
            .await
        {
            warn!("Stop setpoint failed at the link: {:#}", e);
            return false;
        }
        true
    }

    /// Get the vehicle onto the ground, overriding whatever else is running.
    ///
    /// Attempts to land up to three times, stopping on the first success.
    /// All attempts failing is the one condition that requires a human on
    /// the RC transmitter.
    pub async fn abort(&self) {
        info!("Abort: bringing the vehicle down");
        for attempt in 1..=ABORT_ATTEMPTS {
            if self.land().await {
                info!("Abort landing succeeded on attempt {attempt}");
                return;
            }
            warn!("Abort landing attempt {attempt}/{ABORT_ATTEMPTS} failed");
        }
        error!(
            "Abort failed after {ABORT_ATTEMPTS} landing attempts, take manual control of the vehicle"
        );
    }
}

/// Horizontal distance in meters between two global positions.
///
/// Flat-earth approximation, adequate for the short legs missions fly.
fn ground_distance(from: GlobalPosition, to: GlobalPosition) -> f64 {
    let dlat = to.lat - from.lat;
    let dlon = to.lon - from.lon;
    (dlat * dlat + dlon * dlon).sqrt() * METERS_PER_DEGREE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autopilot::{Attitude, BenchAutopilot};

    fn rigged() -> (Arc<BenchAutopilot>, VehicleControl) {
        let link = Arc::new(BenchAutopilot::new());
        let ctl = VehicleControl::new(link.clone());
        (link, ctl)
    }

    /// Arm through the public path so tests exercise the real sequence
    async fn armed_and_guided(ctl: &VehicleControl) {
        assert!(ctl.set_to_guided().await);
        assert!(ctl.arm().await);
    }

    #[tokio::test]
    async fn test_altitude_prefers_tilt_corrected_rangefinder() {
        let (link, ctl) = rigged();
        link.set_rangefinder(Some(10.0)).await;
        link.set_attitude(Attitude {
            roll: 0.1,
            pitch: 0.2,
        })
        .await;

        let expected = (0.2f64.cos() * 0.1f64.cos() * 10.0).abs();
        assert!((ctl.altitude().await - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_altitude_falls_back_to_gps_relative() {
        let (link, ctl) = rigged();
        link.set_relative_altitude(7.5).await;
        assert_eq!(ctl.altitude().await, 7.5);
    }

    #[tokio::test]
    async fn test_set_mode_confirms_against_telemetry() {
        let (link, ctl) = rigged();
        assert!(ctl.set_mode(VehicleMode::Guided).await);
        assert_eq!(link.mode_commands().await, vec![VehicleMode::Guided]);
        assert!(ctl.is_guided().await);
    }

    #[tokio::test]
    async fn test_arm_guard_fails_outside_guided() {
        let (link, ctl) = rigged();
        // Fresh vehicle sits in STABILIZE
        assert!(!ctl.arm().await);
        assert!(link.arm_commands().await.is_empty());
    }

    #[tokio::test]
    async fn test_arm_sequence_in_guided() {
        let (link, ctl) = rigged();
        assert!(ctl.set_to_guided().await);
        assert!(ctl.arm().await);
        assert_eq!(link.arm_commands().await, vec![true]);
    }

    #[tokio::test]
    async fn test_arm_short_circuits_when_already_armed() {
        let (link, ctl) = rigged();
        link.set_armed(true).await.expect("set_armed");
        assert!(ctl.arm().await);
        // Only the direct call above; arm() issued nothing
        assert_eq!(link.arm_commands().await, vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_gives_up_when_never_armable() {
        let (link, ctl) = rigged();
        link.set_armable(false).await;
        assert!(ctl.set_to_guided().await);

        assert!(!ctl.arm().await);
        assert!(link.arm_commands().await.is_empty());
    }

    #[tokio::test]
    async fn test_takeoff_guard_fails_when_disarmed() {
        let (link, ctl) = rigged();
        assert!(ctl.set_to_guided().await);
        assert!(!ctl.takeoff(10.0).await);
        assert!(link.takeoff_commands().await.is_empty());
    }

    #[tokio::test]
    async fn test_takeoff_reaches_target_band() {
        let (link, ctl) = rigged();
        armed_and_guided(&ctl).await;
        assert!(ctl.takeoff(10.0).await);
        assert_eq!(link.takeoff_commands().await, vec![10.0]);
    }

    #[tokio::test]
    async fn test_land_guard_fails_when_disarmed() {
        let (link, ctl) = rigged();
        assert!(ctl.set_to_guided().await);
        assert!(!ctl.land().await);
        assert!(!link
            .mode_commands()
            .await
            .contains(&VehicleMode::Land));
    }

    #[tokio::test]
    async fn test_land_confirms_touchdown() {
        let (link, ctl) = rigged();
        armed_and_guided(&ctl).await;
        assert!(ctl.takeoff(20.0).await);

        assert!(ctl.land().await);
        assert_eq!(link.mode().await, Some(VehicleMode::Land));
        assert!(ctl.altitude().await <= LANDING_ALTITUDE);
    }

    #[tokio::test]
    async fn test_goto_position_waits_for_arrival() {
        let (link, ctl) = rigged();
        armed_and_guided(&ctl).await;

        let target = GlobalPosition::new(32.07, 34.76, 15.0);
        assert!(ctl.goto_position(target).await);
        assert_eq!(link.position().await, target);
    }

    #[tokio::test(start_paused = true)]
    async fn test_goto_offset_streams_then_stops() {
        let (link, ctl) = rigged();

        // 5m leg in the low-speed regime: 50s of 0.1s-cadence setpoints
        assert!(ctl.goto_offset(3.0, 4.0, 0.0).await);

        let sent = link.velocity_commands().await;
        assert_eq!(sent.len(), 501);

        let expected_vn = 4.0 / 5.0 * OFFSET_LOW_SPEED;
        let expected_ve = 3.0 / 5.0 * OFFSET_LOW_SPEED;
        let (frame, vn, ve, vd) = sent[0];
        assert_eq!(frame, VelocityFrame::BodyNed);
        assert!((vn - expected_vn).abs() < 1e-12);
        assert!((ve - expected_ve).abs() < 1e-12);
        assert_eq!(vd, 0.0);

        assert_eq!(*sent.last().expect("stop setpoint"), (VelocityFrame::BodyNed, 0.0, 0.0, 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_goto_offset_uses_high_speed_regime_for_long_legs() {
        let (link, ctl) = rigged();

        assert!(ctl.goto_offset(300.0, 0.0, 0.0).await);

        let sent = link.velocity_commands().await;
        let (_, vn, ve, _) = sent[0];
        assert_eq!(vn, 0.0);
        assert_eq!(ve, OFFSET_HIGH_SPEED);
    }

    #[tokio::test]
    async fn test_goto_offset_zero_distance_is_a_no_op() {
        let (link, ctl) = rigged();
        assert!(ctl.goto_offset(0.0, 0.0, 0.0).await);
        assert!(link.velocity_commands().await.is_empty());
    }

    #[tokio::test]
    async fn test_abort_returns_after_first_successful_landing() {
        let (link, ctl) = rigged();
        armed_and_guided(&ctl).await;
        assert!(ctl.takeoff(20.0).await);

        ctl.abort().await;

        let lands = link
            .mode_commands()
            .await
            .iter()
            .filter(|m| **m == VehicleMode::Land)
            .count();
        assert_eq!(lands, 1);
        assert!(ctl.altitude().await <= LANDING_ALTITUDE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_gives_up_after_exhausting_attempts() {
        let (link, ctl) = rigged();
        link.set_descend_on_land(false).await;
        armed_and_guided(&ctl).await;
        assert!(ctl.takeoff(30.0).await);

        // First attempt times out at altitude; later attempts fail the guard
        // because the mode is no longer GUIDED. Must return, not hang.
        ctl.abort().await;

        assert!(ctl.altitude().await > LANDING_ALTITUDE);
    }

    #[test]
    fn test_ground_distance_flat_earth() {
        let from = GlobalPosition::new(0.0, 0.0, 0.0);
        let to = GlobalPosition::new(0.001, 0.0, 0.0);
        assert!((ground_distance(from, to) - 111.3195).abs() < 1e-6);
    }
}
