//! Vehicle-side agent for the Skylink ground-to-vehicle command link.
//!
//! Modules:
//! - [`autopilot`]: capability trait over the low-level autopilot link,
//!   plus the in-process bench implementation
//! - [`control`]: guarded, timeout-bounded vehicle operations
//! - [`mission`]: mission plans and the single-flight coordinator
//! - [`command`]: WebSocket command server and handler wiring

pub mod autopilot;
pub mod command;
pub mod control;
pub mod mission;
