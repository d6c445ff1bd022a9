use crate::filters::DerivativeFilter;
use crate::params::{PosControlParams, VzSource};
use crate::setpoint::Axes3;
use cu_vehicle_payloads::LocalPosition;

/// Vehicle state the position controller works on. Unknown axes are `None`.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ControlState {
    pub position: Axes3,
    pub velocity: Axes3,
    pub acceleration: Axes3,
    pub yaw: Option<f32>,
}

/// Turns the raw estimator output into a [`ControlState`].
#[derive(Debug, Clone)]
pub struct StateAdapter {
    vel_x_deriv: DerivativeFilter,
    vel_y_deriv: DerivativeFilter,
    vel_z_deriv: DerivativeFilter,
    vz_source: VzSource,
    land_speed: f32,
}

impl StateAdapter {
    pub fn new(params: &PosControlParams) -> Self {
        Self {
            vel_x_deriv: DerivativeFilter::new(params.veld_lp),
            vel_y_deriv: DerivativeFilter::new(params.veld_lp),
            vel_z_deriv: DerivativeFilter::new(params.veld_lp),
            vz_source: params.vz_source,
            land_speed: params.land_speed,
        }
    }

    pub fn apply_params(&mut self, params: &PosControlParams) {
        for filter in [
            &mut self.vel_x_deriv,
            &mut self.vel_y_deriv,
            &mut self.vel_z_deriv,
        ] {
            filter.set_cutoff(params.veld_lp);
        }
        self.vz_source = params.vz_source;
        self.land_speed = params.land_speed;
    }

    /// `vz_sp` is the vertical velocity setpoint of this cycle, it drives the blending of the
    /// vertical velocity sources.
    pub fn update(&mut self, state: &mut ControlState, raw: &LocalPosition, vz_sp: Option<f32>, dt: f32) {
        // nothing was ever estimated
        if raw.timestamp_ns == 0 {
            return;
        }

        let xy = (raw.xy_valid && raw.x.is_finite() && raw.y.is_finite()).then_some((raw.x, raw.y));
        state.position.set_xy(xy);
        state.position.z = (raw.z_valid && raw.z.is_finite()).then_some(raw.z);

        if raw.v_xy_valid && raw.vx.is_finite() && raw.vy.is_finite() {
            state.velocity.set_xy(Some((raw.vx, raw.vy)));
            state.acceleration.set_xy(Some((
                self.vel_x_deriv.update(-raw.vx, dt),
                self.vel_y_deriv.update(-raw.vy, dt),
            )));
        } else {
            state.velocity.set_xy(None);
            state.acceleration.set_xy(None);
            // keep the filters running
            self.vel_x_deriv.update(0.0, dt);
            self.vel_y_deriv.update(0.0, dt);
        }

        if raw.v_z_valid && raw.vz.is_finite() {
            let vz = self.vertical_velocity(raw, vz_sp);
            state.velocity.z = Some(vz);
            state.acceleration.z = Some(self.vel_z_deriv.update(-vz, dt));
        } else {
            state.velocity.z = None;
            state.acceleration.z = None;
            self.vel_z_deriv.update(0.0, dt);
        }

        // a bad yaw sample keeps the last good one
        if raw.yaw.is_finite() {
            state.yaw = Some(raw.yaw);
        }
    }

    fn vertical_velocity(&self, raw: &LocalPosition, vz_sp: Option<f32>) -> f32 {
        match (self.vz_source, vz_sp) {
            (VzSource::Blended, Some(vz_sp))
                if vz_sp.abs() > f32::EPSILON && raw.z_deriv.is_finite() =>
            {
                let weighting = if self.land_speed > 0.0 {
                    (vz_sp.abs() / self.land_speed).min(1.0)
                } else {
                    1.0
                };
                raw.z_deriv * weighting + raw.vz * (1.0 - weighting)
            }
            _ => raw.vz,
        }
    }
}
