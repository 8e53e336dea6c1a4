//! Guarded, timeout-bounded vehicle operations

mod engine;
mod operation;

pub use engine::VehicleControl;
pub use operation::Operation;
