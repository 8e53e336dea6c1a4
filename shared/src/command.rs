//! Command registry
//!
//! The closed set of command types both endpoints understand, fixed for the
//! process lifetime. The wire form is the canonical SCREAMING_SNAKE_CASE name;
//! parsing is strict and fails closed on anything outside the set.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// Every command the ground station may issue to the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    /// Liveness check, no payload
    Ping,
    /// Fly to a GPS position (handled by the navigation collaborator)
    GoToGps,
    /// Land immediately, overriding whatever is running
    AbortMission,
    /// Takeoff, fly to a position, land
    DemoMission,
    /// Takeoff, expanding-square scan for a ground target, land
    CoarseScanMission,
    /// Takeoff, land
    UpDownMission,
    /// Switch the vehicle into GUIDED mode
    SetToGuided,
    /// Run the vision pipeline on the current camera frame
    AnalyzeImageMission,
    /// Scan for a ground target and land on it
    FindAndLandMission,
}

impl CommandType {
    /// All registry members, in wire-name order
    pub const ALL: [CommandType; 9] = [
        CommandType::Ping,
        CommandType::GoToGps,
        CommandType::AbortMission,
        CommandType::DemoMission,
        CommandType::CoarseScanMission,
        CommandType::UpDownMission,
        CommandType::SetToGuided,
        CommandType::AnalyzeImageMission,
        CommandType::FindAndLandMission,
    ];

    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Ping => "PING",
            CommandType::GoToGps => "GO_TO_GPS",
            CommandType::AbortMission => "ABORT_MISSION",
            CommandType::DemoMission => "DEMO_MISSION",
            CommandType::CoarseScanMission => "COARSE_SCAN_MISSION",
            CommandType::UpDownMission => "UP_DOWN_MISSION",
            CommandType::SetToGuided => "SET_TO_GUIDED",
            CommandType::AnalyzeImageMission => "ANALYZE_IMAGE_MISSION",
            CommandType::FindAndLandMission => "FIND_AND_LAND_MISSION",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict name lookup. Anything outside the registry is rejected, never coerced.
impl FromStr for CommandType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProtocolError::MalformedCommand(format!("unknown command type: {s}")))
    }
}
