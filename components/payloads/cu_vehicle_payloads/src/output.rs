use crate::{AttitudeSetpoint, LocalPositionSetpoint};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Consumer of the multicopter attitude setpoints.
#[derive(Debug, Default, Clone, Copy, Encode, Decode, Serialize, Deserialize, PartialEq, Eq)]
#[repr(u8)]
pub enum AttitudeTopic {
    #[default]
    Regular = 0,
    /// VTOLs in multicopter mode, the VTOL attitude controller forwards them.
    VirtualMulticopter = 1,
}

/// What the position controller emits in one cycle.
#[derive(Debug, Default, Clone, Copy, Encode, Decode, Serialize, Deserialize, PartialEq)]
pub struct PosControlOutput {
    /// None when another writer owns the attitude or the consumer is not known yet.
    pub attitude: Option<AttitudeSetpoint>,
    /// Meaningful only along an attitude setpoint.
    pub attitude_topic: AttitudeTopic,
    /// Present while a flight task is active.
    pub local_setpoint: Option<LocalPositionSetpoint>,
}
