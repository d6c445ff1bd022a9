//! Payloads exchanged between the vehicle state producers (estimator, commander, land detector)
//! and the multicopter position controller.
//!
//! All the positions and velocities are expressed in the local NED frame (z is pointing down),
//! in meters and meters per second. Timestamps are robot times in nanoseconds.

mod attitude;
mod output;
mod position;
mod status;

pub use attitude::{AttitudeSetpoint, LandingGearState};
pub use output::{AttitudeTopic, PosControlOutput};
pub use position::{HomePosition, LandDetected, LocalPosition, LocalPositionSetpoint};
pub use status::{ControlMode, NavigationState, ParameterUpdate, VehicleStatus};
