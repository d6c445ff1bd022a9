use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, Encode, Decode, Serialize, Deserialize, PartialEq, Eq)]
#[repr(u8)]
pub enum LandingGearState {
    Up = 0,
    #[default]
    Down = 1,
}

/// Attitude command for the multicopter attitude controller.
#[derive(Debug, Clone, Copy, Encode, Decode, Serialize, Deserialize, PartialEq)]
pub struct AttitudeSetpoint {
    pub timestamp_ns: u64,
    /// Euler angles, informative only, `q_d` is authoritative.
    pub roll_body: f32,
    pub pitch_body: f32,
    pub yaw_body: f32,
    pub yaw_sp_move_rate: f32,
    /// Desired orientation as a quaternion (w, x, y, z).
    pub q_d: [f32; 4],
    pub q_d_valid: bool,
    /// Collective thrust, normalized [0, 1].
    pub thrust: f32,
    pub landing_gear: LandingGearState,
}

impl Default for AttitudeSetpoint {
    fn default() -> Self {
        Self {
            timestamp_ns: 0,
            roll_body: 0.0,
            pitch_body: 0.0,
            yaw_body: 0.0,
            yaw_sp_move_rate: 0.0,
            q_d: [1.0, 0.0, 0.0, 0.0],
            q_d_valid: false,
            thrust: 0.0,
            landing_gear: LandingGearState::Down,
        }
    }
}
