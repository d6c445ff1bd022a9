use crate::params::PosControlParams;
use crate::setpoint::{Constraints, Setpoint};

/// Climb speed the ramp starts from (m/s, upward).
pub const TAKEOFF_INITIAL_SPEED: f32 = 0.5;
/// Takeoff altitude margin when no minimum distance to ground is known (m).
const DEFAULT_TAKEOFF_MARGIN: f32 = 0.2;
/// Added to the minimum distance to ground to get the takeoff altitude margin (m).
const MIN_DISTANCE_MARGIN: f32 = 0.05;
/// Minimum commanded climb speed considered a takeoff request (m/s).
const MIN_TAKEOFF_CLIMB: f32 = 0.6;
/// The ramp ends once this far above the target altitude (m).
const TAKEOFF_DONE_MARGIN: f32 = 0.2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TakeoffPhase {
    #[default]
    Inactive,
    Ramping,
}

/// Ramps the allowed climb speed up when a landed vehicle is asked to take off, so it does not
/// jump off the ground.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmoothTakeoff {
    phase: TakeoffPhase,
    /// Current allowed climb speed (m/s, upward).
    speed: f32,
}

impl SmoothTakeoff {
    pub fn phase(&self) -> TakeoffPhase {
        self.phase
    }

    pub fn is_ramping(&self) -> bool {
        self.phase == TakeoffPhase::Ramping
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Starts the ramp when a landed vehicle gets a setpoint above it or a climb request.
    /// `z` is the current NED altitude.
    pub fn check_trigger(
        &mut self,
        landed: bool,
        z: f32,
        setpoint: &Setpoint,
        constraints: &Constraints,
        params: &PosControlParams,
    ) {
        if !landed || self.is_ramping() {
            return;
        }

        let min_altitude = constraints
            .min_distance_to_ground
            .filter(|d| d.is_finite())
            .map_or(DEFAULT_TAKEOFF_MARGIN, |d| d + MIN_DISTANCE_MARGIN);

        let position_request = setpoint.position.z.is_some_and(|z_sp| z_sp < z - min_altitude);
        let climb_request = setpoint
            .velocity
            .z
            .is_some_and(|vz_sp| vz_sp < -params.takeoff_speed.max(MIN_TAKEOFF_CLIMB));

        if position_request || climb_request {
            self.phase = TakeoffPhase::Ramping;
            self.speed = TAKEOFF_INITIAL_SPEED;
        }
    }

    /// Advances the ramp by `dt` seconds and ends it once the target altitude or climb speed is
    /// reached.
    pub fn update(&mut self, z: f32, setpoint: &Setpoint, params: &PosControlParams, dt: f32) {
        if !self.is_ramping() {
            return;
        }

        let target = match (setpoint.position.z, setpoint.velocity.z) {
            (Some(_), _) => params.takeoff_speed,
            (None, Some(vz_sp)) => -vz_sp,
            // nothing left to ramp towards
            (None, None) => {
                self.reset();
                return;
            }
        };

        if params.takeoff_ramp_time > 0.0 {
            self.speed += target * dt / params.takeoff_ramp_time;
        } else {
            self.speed = target;
        }
        self.speed = self.speed.min(target);

        let done = match setpoint.position.z {
            Some(z_sp) => z - TAKEOFF_DONE_MARGIN <= z_sp.max(-params.land_alt2),
            None => self.speed >= target,
        };
        if done {
            self.phase = TakeoffPhase::Inactive;
        }
    }

    /// While ramping, the vehicle only climbs: no yaw, no horizontal position control and the
    /// climb speed limited to the ramp.
    pub fn apply(&self, setpoint: &mut Setpoint, constraints: &mut Constraints) {
        if !self.is_ramping() {
            return;
        }
        constraints.speed_up = Some(self.speed);
        setpoint.yaw = None;
        setpoint.yawspeed = None;
        setpoint.position.set_xy(None);
        setpoint.velocity.set_xy(Some((0.0, 0.0)));
    }
}
