use crate::control::{ControlOutput, PositionControl};
use crate::flight_tasks::{FlightTaskIndex, FlightTaskSelector, FlightTasks, Selection};
use crate::hysteresis::ArmHysteresis;
use crate::limits::{limit_altitude, LandingThrustLimiter};
use crate::params::{InMemoryParameters, ParameterCache, ParameterSource, PosControlParams};
use crate::publisher::OutputPublisher;
use crate::ratelimit::LogRateLimiter;
use crate::setpoint::{Axes3, GearIntent, Setpoint};
use crate::state::{ControlState, StateAdapter};
use crate::takeoff::SmoothTakeoff;
use crate::warning_rl;
use cu29::prelude::*;
use cu_vehicle_payloads::{
    ControlMode, HomePosition, LandDetected, LocalPosition, LocalPositionSetpoint,
    PosControlOutput, VehicleStatus,
};
use std::time::Duration;

/// Timestep of the very first cycle.
pub const DEFAULT_DT: Duration = Duration::from_millis(4);
/// Longest wait for a new position sample, the cycle runs anyway after it.
pub const POSITION_WAIT: Duration = Duration::from_millis(20);

/// Messages received since the previous cycle, `None` for the topics that did not change.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleInputs<'a> {
    pub vehicle_status: Option<&'a VehicleStatus>,
    pub land_detected: Option<&'a LandDetected>,
    pub control_mode: Option<&'a ControlMode>,
    pub local_position: Option<&'a LocalPosition>,
    pub home_position: Option<&'a HomePosition>,
    /// The parameter storage notified a change.
    pub parameters_changed: bool,
}

/// What happened during one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub active_task: FlightTaskIndex,
    /// None when disarmed.
    pub selection: Option<Selection>,
    /// The flight task could not update, a failsafe setpoint was used.
    pub failsafe: bool,
    /// The failsafe warning went through the rate limiter this cycle.
    pub failsafe_warned: bool,
    pub attitude_published: bool,
}

/// The multicopter position control orchestrator.
///
/// Owns all the control state, one [`run_cycle`](McPosControl::run_cycle) call per wake up.
pub struct McPosControl<T, C, S = InMemoryParameters>
where
    T: FlightTasks,
    C: PositionControl,
    S: ParameterSource,
{
    params: ParameterCache<S>,
    tasks: T,
    control: C,
    selector: FlightTaskSelector,
    adapter: StateAdapter,
    arm: ArmHysteresis,
    takeoff: SmoothTakeoff,
    thrust_limiter: LandingThrustLimiter,
    publisher: OutputPublisher,
    failsafe_warn: LogRateLimiter,
    params_warn: LogRateLimiter,

    vehicle_status: VehicleStatus,
    land_detected: LandDetected,
    control_mode: ControlMode,
    local_position: LocalPosition,
    home_position: HomePosition,

    state: ControlState,
    last_time: Option<CuTime>,
}

impl<T, C, S> McPosControl<T, C, S>
where
    T: FlightTasks,
    C: PositionControl,
    S: ParameterSource,
{
    /// Loads the parameters, fails if they can't be loaded.
    pub fn new(source: S, tasks: T, control: C) -> CuResult<Self> {
        let params = ParameterCache::new(source)?;
        let current = params.get().clone();

        let mut controller = Self {
            selector: FlightTaskSelector::new(current.pos_mode),
            adapter: StateAdapter::new(&current),
            arm: ArmHysteresis::new(current.idle_before_takeoff()),
            publisher: OutputPublisher::new(current.publish_requires_arm_hysteresis),
            params,
            tasks,
            control,
            takeoff: SmoothTakeoff::default(),
            thrust_limiter: LandingThrustLimiter::default(),
            failsafe_warn: LogRateLimiter::new(),
            params_warn: LogRateLimiter::new(),

            vehicle_status: VehicleStatus::default(),
            // landed until the land detector says otherwise
            land_detected: LandDetected::default(),
            control_mode: ControlMode::default(),
            local_position: LocalPosition::default(),
            home_position: HomePosition::default(),

            state: ControlState::default(),
            last_time: None,
        };
        controller.apply_params();
        Ok(controller)
    }

    pub fn params(&self) -> &PosControlParams {
        self.params.get()
    }

    pub fn tasks(&self) -> &T {
        &self.tasks
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn takeoff(&self) -> &SmoothTakeoff {
        &self.takeoff
    }

    pub fn armed_long_enough(&self) -> bool {
        self.arm.state()
    }

    pub fn active_task(&self) -> FlightTaskIndex {
        self.tasks.active_task()
    }

    pub fn publisher(&self) -> &OutputPublisher {
        &self.publisher
    }

    /// Runs one full control cycle at `now` and writes what has to go out in `output`.
    pub fn run_cycle(
        &mut self,
        now: CuTime,
        inputs: &CycleInputs<'_>,
        output: &mut PosControlOutput,
    ) -> CycleReport {
        let mut report = CycleReport::default();

        self.take_inputs(inputs);
        self.refresh_params(inputs.parameters_changed, now);

        let dt = dt_or_fallback(&mut self.last_time, now, DEFAULT_DT.into());
        let dt = dt.as_nanos() as f32 / 1e9;

        if self.control_mode.flag_armed {
            report.selection = Some(self.selector.select(
                &mut self.tasks,
                self.vehicle_status.nav_state,
                &self.control_mode,
                now,
            ));
        } else {
            let _ = self.tasks.switch_task(FlightTaskIndex::None);
            self.arm.set_state_and_update(false, now);
            self.takeoff.reset();
        }

        self.thrust_limiter.observe(&self.land_detected);

        output.local_setpoint = None;
        if self.tasks.is_any_task_active() {
            let (control, gear) = self.run_active_task(now, dt, &mut report);

            output.local_setpoint = Some(LocalPositionSetpoint {
                timestamp_ns: now.as_nanos(),
                x: control.position.x,
                y: control.position.y,
                z: control.position.z,
                vx: control.velocity.x,
                vy: control.velocity.y,
                vz: control.velocity.z,
                yaw: Some(control.yaw).filter(|y| y.is_finite()),
                yawspeed: Some(control.yawspeed).filter(|y| y.is_finite()),
                thrust: [control.thrust.x, control.thrust.y, control.thrust.z],
            });
            self.publisher.fill_from_control(&control, gear);
        } else {
            let yaw = Some(self.local_position.yaw)
                .filter(|y| y.is_finite())
                .or(self.state.yaw)
                .unwrap_or(0.0);
            self.publisher.fill_idle(yaw);
        }

        match self
            .publisher
            .attitude_to_publish(now, self.arm.state(), &self.control_mode)
        {
            Some((topic, attitude)) => {
                output.attitude = Some(attitude);
                output.attitude_topic = topic;
                report.attitude_published = true;
            }
            None => output.attitude = None,
        }
        report.active_task = self.tasks.active_task();
        report
    }

    fn run_active_task(
        &mut self,
        now: CuTime,
        dt: f32,
        report: &mut CycleReport,
    ) -> (ControlOutput, GearIntent) {
        report.failsafe = !self.tasks.update();
        let mut setpoint = if report.failsafe {
            let (setpoint, warned) = self.failsafe_setpoint(now);
            report.failsafe_warned = warned;
            setpoint
        } else {
            self.tasks.setpoint()
        };
        let mut constraints = self.tasks.constraints();

        self.adapter
            .update(&mut self.state, &self.local_position, setpoint.velocity.z, dt);

        // takeoff is only allowed once armed for a while
        self.arm.set_state_and_update(self.control_mode.flag_armed, now);

        match (self.arm.state(), self.state.position.z, self.state.velocity.z) {
            (true, Some(z), Some(_)) => {
                let params = self.params.get();
                self.takeoff.check_trigger(
                    self.land_detected.landed,
                    z,
                    &setpoint,
                    &constraints,
                    params,
                );
                self.takeoff.update(z, &setpoint, params, dt);
                self.takeoff.apply(&mut setpoint, &mut constraints);
            }
            // no ramp without a valid vertical state
            _ => self.takeoff.reset(),
        }

        let ramping = self.takeoff.is_ramping();
        if self.land_detected.landed && !ramping && setpoint.thrust.z.is_none() {
            // keep the throttle low on the ground
            setpoint = Setpoint {
                thrust: Axes3::new(0.0, 0.0, 0.0),
                yaw: self.state.yaw,
                ..Setpoint::uncontrolled()
            };
            constraints.landing_gear = GearIntent::Keep;
        }

        limit_altitude(
            &mut setpoint,
            self.state.position.z,
            &self.land_detected,
            &self.home_position,
            dt,
        );

        self.control.update_constraints(&constraints);
        self.control.update_state(&self.state);
        self.control.update_setpoint(&setpoint);
        self.control.generate_thrust_yaw_setpoint(dt);
        let mut output = self.control.output();

        // a task commanding its own vertical thrust is in charge of it
        if !ramping && setpoint.thrust.z.is_none() {
            self.thrust_limiter
                .apply(&mut output.thrust, &self.land_detected, &mut self.control);
        }

        (output, constraints.landing_gear)
    }

    /// Descend at the landing speed when the vertical velocity is known, otherwise leave
    /// everything uncontrolled so that the position controller falls back on its own failsafe.
    /// Also tells whether the warning went out.
    fn failsafe_setpoint(&mut self, now: CuTime) -> (Setpoint, bool) {
        let mut setpoint = Setpoint::uncontrolled();
        let warned = if self.state.velocity.z.is_some() {
            setpoint.velocity.z = Some(self.params.get().land_speed);
            setpoint.thrust.x = Some(0.0);
            setpoint.thrust.y = Some(0.0);
            warning_rl!(self.failsafe_warn, now, "Failsafe: Descend with land-speed.")
        } else {
            warning_rl!(
                self.failsafe_warn,
                now,
                "Failsafe: Descend with just attitude control."
            )
        };
        (setpoint, warned)
    }

    fn take_inputs(&mut self, inputs: &CycleInputs<'_>) {
        if let Some(status) = inputs.vehicle_status {
            self.vehicle_status = *status;
            self.publisher.select_attitude_topic(status.is_vtol);
        }
        if let Some(land) = inputs.land_detected {
            self.land_detected = *land;
        }
        if let Some(mode) = inputs.control_mode {
            self.control_mode = *mode;
        }
        if let Some(position) = inputs.local_position {
            self.local_position = *position;
        }
        if let Some(home) = inputs.home_position {
            self.home_position = *home;
        }
    }

    fn refresh_params(&mut self, notified: bool, now: CuTime) {
        match self.params.refresh(false, notified) {
            Ok(true) => self.apply_params(),
            Ok(false) => {}
            Err(e) => {
                if self.params_warn.should_log(now) {
                    let reason = e.to_string();
                    error!("Could not reload the parameters, keeping the previous ones: {}", reason);
                }
            }
        }
    }

    fn apply_params(&mut self) {
        let params = self.params.get();
        self.selector.set_pos_mode(params.pos_mode);
        self.adapter.apply_params(params);
        self.arm.set_rise_delay(params.idle_before_takeoff());
        self.publisher
            .set_requires_arm_hysteresis(params.publish_requires_arm_hysteresis);
        self.tasks.handle_parameter_update();
    }
}

/// Time since the last call, `fallback` on the first call or if the clock did not move.
fn dt_or_fallback(last_time: &mut Option<CuTime>, now: CuTime, fallback: CuDuration) -> CuDuration {
    let dt = last_time.map(|prev| CuDuration(now.as_nanos().saturating_sub(prev.as_nanos())));
    *last_time = Some(now);
    match dt {
        Some(duration) if duration > CuDuration::MIN => duration,
        _ => fallback,
    }
}
