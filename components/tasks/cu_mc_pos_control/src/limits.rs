use crate::control::PositionControl;
use crate::setpoint::Setpoint;
use cu_vehicle_payloads::{HomePosition, LandDetected};
use nalgebra::Vector3;

/// Keeps the vertical setpoints under the land detector ceiling.
///
/// `z` is the current NED altitude. Nothing happens without a ceiling, a valid home altitude or a
/// known altitude.
pub fn limit_altitude(
    setpoint: &mut Setpoint,
    z: Option<f32>,
    land: &LandDetected,
    home: &HomePosition,
    dt: f32,
) {
    let (Some(alt_max), Some(home_z), Some(z)) = (
        land.alt_max.filter(|a| a.is_finite() && *a >= 0.0),
        home.altitude(),
        z,
    ) else {
        return;
    };

    let ceiling_z = home_z - alt_max;
    let altitude_above_home = -(z - home_z);

    let crossing = match setpoint.velocity.z {
        Some(vz) if vz <= 0.0 => vz.abs() * dt > alt_max - altitude_above_home,
        _ => false,
    };
    if altitude_above_home > alt_max || crossing {
        setpoint.position.z = Some(ceiling_z);
        setpoint.velocity.z = Some(0.0);
    } else if let Some(z_sp) = setpoint.position.z {
        setpoint.position.z = Some(z_sp.max(ceiling_z));
    }
}

/// Cuts the thrust when the land detector believes the vehicle touched down.
///
/// The controller integrators are reset along, they would wind up against the suppressed thrust.
/// The horizontal integral is reset once per ground contact, even when the contact began on a
/// cycle where the limiter was not applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct LandingThrustLimiter {
    in_contact: bool,
    xy_reset_pending: bool,
}

impl LandingThrustLimiter {
    /// Follows the ground contact flag, call it every cycle.
    pub fn observe(&mut self, land: &LandDetected) {
        if land.ground_contact && !self.in_contact {
            self.xy_reset_pending = true;
        } else if !land.ground_contact {
            self.xy_reset_pending = false;
        }
        self.in_contact = land.ground_contact;
    }

    pub fn apply<C: PositionControl>(
        &mut self,
        thrust: &mut Vector3<f32>,
        land: &LandDetected,
        control: &mut C,
    ) {
        if land.ground_contact {
            thrust.x = 0.0;
            thrust.y = 0.0;
            if self.xy_reset_pending {
                control.reset_integral_xy();
                self.xy_reset_pending = false;
            }
        }

        if land.maybe_landed {
            thrust.fill(0.0);
            control.reset_integral_xy();
            control.reset_integral_z();
        }
    }
}
