use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Navigation state decided by the commander.
#[derive(Debug, Default, Clone, Copy, Encode, Decode, Serialize, Deserialize, PartialEq, Eq)]
#[repr(u8)]
pub enum NavigationState {
    #[default]
    Manual = 0,
    AltitudeControl = 1,
    PositionControl = 2,
    AutoMission = 3,
    AutoLoiter = 4,
    AutoReturn = 5,
    AutoTakeoff = 6,
    AutoLand = 7,
    AutoFollowTarget = 8,
    Acro = 9,
    Offboard = 10,
    Stabilized = 11,
}

#[derive(Debug, Default, Clone, Copy, Encode, Decode, Serialize, Deserialize, PartialEq)]
pub struct VehicleStatus {
    pub timestamp_ns: u64,
    pub nav_state: NavigationState,
    /// The vehicle can transition to fixed wing flight.
    pub is_vtol: bool,
}

/// Which loops the commander allows the controllers to close.
#[derive(Debug, Default, Clone, Copy, Encode, Decode, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlMode {
    pub timestamp_ns: u64,
    pub flag_armed: bool,
    pub flag_control_auto_enabled: bool,
    pub flag_control_offboard_enabled: bool,
    pub flag_control_position_enabled: bool,
    pub flag_control_velocity_enabled: bool,
    pub flag_control_acceleration_enabled: bool,
}

impl ControlMode {
    /// Offboard is enabled but no position/velocity/acceleration loop is requested:
    /// someone else writes the attitude setpoints directly.
    pub fn is_offboard_attitude_only(&self) -> bool {
        self.flag_control_offboard_enabled
            && !(self.flag_control_position_enabled
                || self.flag_control_velocity_enabled
                || self.flag_control_acceleration_enabled)
    }
}

/// Notification that at least one parameter changed in the parameter storage.
#[derive(Debug, Default, Clone, Copy, Encode, Decode, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterUpdate {
    pub timestamp_ns: u64,
    pub instance: u32,
}
