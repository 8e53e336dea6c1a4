//! In-process autopilot used on the bench and in tests
//!
//! Commands take effect on settable state immediately; there is no flight
//! dynamics. Every command is recorded so tests can assert exactly what the
//! engine sent to the vehicle.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Attitude, AutopilotLink, GlobalPosition, VehicleMode, VelocityFrame};

/// Autopilot link stand-in with settable telemetry and instant command effects
pub struct BenchAutopilot {
    state: Mutex<BenchState>,
}

#[derive(Debug)]
struct BenchState {
    mode: Option<VehicleMode>,
    armed: bool,
    armable: bool,
    rangefinder: Option<f64>,
    relative_altitude: f64,
    attitude: Attitude,
    position: GlobalPosition,
    /// When set, a LAND mode change pins the altitude to zero
    descend_on_land: bool,
    arm_commands: Vec<bool>,
    mode_commands: Vec<VehicleMode>,
    takeoff_commands: Vec<f64>,
    velocity_commands: Vec<(VelocityFrame, f64, f64, f64)>,
}

impl BenchAutopilot {
    /// Powered-up vehicle on the ground: STABILIZE, disarmed, pre-arm checks passing
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BenchState {
                mode: Some(VehicleMode::Stabilize),
                armed: false,
                armable: true,
                rangefinder: None,
                relative_altitude: 0.0,
                attitude: Attitude::default(),
                position: GlobalPosition::default(),
                descend_on_land: true,
                arm_commands: Vec::new(),
                mode_commands: Vec::new(),
                takeoff_commands: Vec::new(),
                velocity_commands: Vec::new(),
            }),
        }
    }

    pub async fn set_armable(&self, armable: bool) {
        self.state.lock().await.armable = armable;
    }

    pub async fn set_rangefinder(&self, reading: Option<f64>) {
        self.state.lock().await.rangefinder = reading;
    }

    pub async fn set_attitude(&self, attitude: Attitude) {
        self.state.lock().await.attitude = attitude;
    }

    pub async fn set_relative_altitude(&self, alt: f64) {
        self.state.lock().await.relative_altitude = alt;
    }

    pub async fn set_descend_on_land(&self, enabled: bool) {
        self.state.lock().await.descend_on_land = enabled;
    }

    /// Arm/disarm requests received, in order
    pub async fn arm_commands(&self) -> Vec<bool> {
        self.state.lock().await.arm_commands.clone()
    }

    /// Mode-change requests received, in order
    pub async fn mode_commands(&self) -> Vec<VehicleMode> {
        self.state.lock().await.mode_commands.clone()
    }

    /// Takeoff target altitudes received, in order
    pub async fn takeoff_commands(&self) -> Vec<f64> {
        self.state.lock().await.takeoff_commands.clone()
    }

    /// Velocity setpoints received, in order
    pub async fn velocity_commands(&self) -> Vec<(VelocityFrame, f64, f64, f64)> {
        self.state.lock().await.velocity_commands.clone()
    }
}

impl Default for BenchAutopilot {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AutopilotLink for BenchAutopilot {
    async fn rangefinder_distance(&self) -> Option<f64> {
        self.state.lock().await.rangefinder
    }

    async fn relative_altitude(&self) -> f64 {
        self.state.lock().await.relative_altitude
    }

    async fn attitude(&self) -> Attitude {
        self.state.lock().await.attitude
    }

    async fn position(&self) -> GlobalPosition {
        self.state.lock().await.position
    }

    async fn armed(&self) -> bool {
        self.state.lock().await.armed
    }

    async fn is_armable(&self) -> bool {
        self.state.lock().await.armable
    }

    async fn mode(&self) -> Option<VehicleMode> {
        self.state.lock().await.mode
    }

    async fn set_mode(&self, mode: VehicleMode) -> Result<()> {
        let mut state = self.state.lock().await;
        state.mode_commands.push(mode);
        state.mode = Some(mode);
        if mode == VehicleMode::Land && state.descend_on_land {
            state.relative_altitude = 0.0;
        }
        Ok(())
    }

    async fn set_armed(&self, armed: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.arm_commands.push(armed);
        state.armed = armed;
        Ok(())
    }

    async fn takeoff(&self, target_altitude: f64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.takeoff_commands.push(target_altitude);
        state.relative_altitude = target_altitude;
        Ok(())
    }

    async fn send_velocity_setpoint(
        &self,
        frame: VelocityFrame,
        north: f64,
        east: f64,
        down: f64,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.velocity_commands.push((frame, north, east, down));
        Ok(())
    }

    async fn send_global_position_setpoint(&self, target: GlobalPosition) -> Result<()> {
        let mut state = self.state.lock().await;
        state.position = target;
        Ok(())
    }
}
