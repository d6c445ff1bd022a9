use crate::setpoint::{Axes3, Constraints, Setpoint};
use crate::state::ControlState;
use nalgebra::Vector3;

/// What the position controller resolved for this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlOutput {
    /// NED thrust vector, normalized.
    pub thrust: Vector3<f32>,
    pub yaw: f32,
    pub yawspeed: f32,
    /// Position and velocity setpoints the controller actually tracked.
    pub position: Axes3,
    pub velocity: Axes3,
}

impl Default for ControlOutput {
    fn default() -> Self {
        Self {
            thrust: Vector3::zeros(),
            yaw: 0.0,
            yawspeed: 0.0,
            position: Axes3::NONE,
            velocity: Axes3::NONE,
        }
    }
}

/// The PID cascade turning setpoints into a thrust vector and a yaw.
///
/// Fed in this order every cycle: constraints, state, setpoint, then
/// [`generate_thrust_yaw_setpoint`](PositionControl::generate_thrust_yaw_setpoint).
pub trait PositionControl {
    fn update_constraints(&mut self, constraints: &Constraints);
    fn update_state(&mut self, state: &ControlState);
    fn update_setpoint(&mut self, setpoint: &Setpoint);
    fn generate_thrust_yaw_setpoint(&mut self, dt: f32);
    fn output(&self) -> ControlOutput;
    fn reset_integral_xy(&mut self);
    fn reset_integral_z(&mut self);
}
