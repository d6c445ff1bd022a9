use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Raw local position estimate as produced by the estimator.
///
/// The estimator flags each group of fields independently, a field can also be non finite
/// even when its flag is set: consumers are expected to check both.
#[derive(Debug, Default, Clone, Copy, Encode, Decode, Serialize, Deserialize, PartialEq)]
pub struct LocalPosition {
    /// 0 until the estimator produced its first sample.
    pub timestamp_ns: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    /// Vertical velocity derived from the position (less biased than vz).
    pub z_deriv: f32,
    pub yaw: f32,
    pub xy_valid: bool,
    pub z_valid: bool,
    pub v_xy_valid: bool,
    pub v_z_valid: bool,
}

#[derive(Debug, Default, Clone, Copy, Encode, Decode, Serialize, Deserialize, PartialEq)]
pub struct HomePosition {
    pub timestamp_ns: u64,
    pub z: f32,
    pub valid_alt: bool,
}

impl HomePosition {
    /// Home altitude in the local frame, only when the estimator vouches for it.
    pub fn altitude(&self) -> Option<f32> {
        (self.valid_alt && self.z.is_finite()).then_some(self.z)
    }
}

/// Output of the land detector.
#[derive(Debug, Clone, Copy, Encode, Decode, Serialize, Deserialize, PartialEq)]
pub struct LandDetected {
    pub timestamp_ns: u64,
    pub landed: bool,
    pub ground_contact: bool,
    pub maybe_landed: bool,
    /// Maximum altitude above home, none when there is no ceiling.
    pub alt_max: Option<f32>,
}

impl Default for LandDetected {
    /// Until told otherwise, a vehicle is on the ground.
    fn default() -> Self {
        Self {
            timestamp_ns: 0,
            landed: true,
            ground_contact: false,
            maybe_landed: false,
            alt_max: None,
        }
    }
}

/// Setpoints actually tracked by the position controller. Only used for logging.
#[derive(Debug, Default, Clone, Copy, Encode, Decode, Serialize, Deserialize, PartialEq)]
pub struct LocalPositionSetpoint {
    pub timestamp_ns: u64,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
    pub vx: Option<f32>,
    pub vy: Option<f32>,
    pub vz: Option<f32>,
    pub yaw: Option<f32>,
    pub yawspeed: Option<f32>,
    pub thrust: [f32; 3],
}
