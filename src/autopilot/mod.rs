//! Autopilot link abstraction
//!
//! The control engine drives the vehicle exclusively through the
//! [`AutopilotLink`] capability trait. Commands are best-effort: the link may
//! silently fail to take effect, so callers confirm by polling the telemetry
//! reads rather than trusting acknowledgments. The production MAVLink bridge
//! implements this trait outside this crate; [`BenchAutopilot`] is the
//! in-process implementation used on the bench and in tests.

mod bench;

pub use bench::BenchAutopilot;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// Flight modes the engine is allowed to request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleMode {
    Guided,
    Land,
    Stabilize,
    Rtl,
    Loiter,
    Poshold,
    AltHold,
}

impl VehicleMode {
    /// Autopilot-facing mode name
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleMode::Guided => "GUIDED",
            VehicleMode::Land => "LAND",
            VehicleMode::Stabilize => "STABILIZE",
            VehicleMode::Rtl => "RTL",
            VehicleMode::Loiter => "LOITER",
            VehicleMode::Poshold => "POSHOLD",
            VehicleMode::AltHold => "ALT_HOLD",
        }
    }
}

impl fmt::Display for VehicleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode name outside the recognized set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized vehicle mode: {}", self.0)
    }
}

impl std::error::Error for UnknownMode {}

/// Strict name lookup for mode strings crossing the link boundary.
/// Unrecognized names are rejected, never coerced.
impl FromStr for VehicleMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GUIDED" => Ok(VehicleMode::Guided),
            "LAND" => Ok(VehicleMode::Land),
            "STABILIZE" => Ok(VehicleMode::Stabilize),
            "RTL" => Ok(VehicleMode::Rtl),
            "LOITER" => Ok(VehicleMode::Loiter),
            "POSHOLD" => Ok(VehicleMode::Poshold),
            "ALT_HOLD" => Ok(VehicleMode::AltHold),
            other => Err(UnknownMode(other.into())),
        }
    }
}

/// Roll/pitch attitude in radians
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
}

/// Global position: degrees latitude/longitude, meters of relative altitude
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlobalPosition {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl GlobalPosition {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }
}

impl fmt::Display for GlobalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6}, {:.1}m)", self.lat, self.lon, self.alt)
    }
}

/// Reference frame for velocity setpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VelocityFrame {
    /// North/east/down relative to the vehicle body
    BodyNed,
    /// North/east/down relative to the local origin
    LocalNed,
}

/// Capability surface of the low-level autopilot link.
///
/// Telemetry reads are pure and side-effect free; command methods return
/// `Err` only for link-level failures (the vehicle not taking effect is
/// detected by polling, not by these results).
#[async_trait]
pub trait AutopilotLink: Send + Sync {
    /// Latest downward rangefinder reading in meters, if the sensor has one
    async fn rangefinder_distance(&self) -> Option<f64>;

    /// GPS-relative altitude above the home position, meters
    async fn relative_altitude(&self) -> f64;

    /// Current roll/pitch
    async fn attitude(&self) -> Attitude;

    /// Current global position
    async fn position(&self) -> GlobalPosition;

    /// True when the motors are armed
    async fn armed(&self) -> bool;

    /// True when pre-arm checks pass and the vehicle may be armed
    async fn is_armable(&self) -> bool;

    /// Current flight mode, when it maps onto the recognized set
    async fn mode(&self) -> Option<VehicleMode>;

    /// Request a flight mode change
    async fn set_mode(&self, mode: VehicleMode) -> Result<()>;

    /// Request arm (`true`) or disarm (`false`)
    async fn set_armed(&self, armed: bool) -> Result<()>;

    /// Climb straight up to the target relative altitude, meters
    async fn takeoff(&self, target_altitude: f64) -> Result<()>;

    /// Stream one velocity setpoint, components in m/s
    async fn send_velocity_setpoint(
        &self,
        frame: VelocityFrame,
        north: f64,
        east: f64,
        down: f64,
    ) -> Result<()>;

    /// Fly to a global position
    async fn send_global_position_setpoint(&self, target: GlobalPosition) -> Result<()>;
}
