use approx::assert_relative_eq;
use cu29::prelude::*;
use cu_mc_pos_control::takeoff::TAKEOFF_INITIAL_SPEED;
use cu_mc_pos_control::{
    Axes3, BusEndpoint, Constraints, ControlOutput, ControlState, CycleReport, FlightTaskError,
    FlightTaskIndex, FlightTasks, GearIntent, InMemoryParameters, McPosControlTask,
    PosControlParams, PositionControl, Selection, Setpoint, TelemetryBus,
};
use cu_vehicle_payloads::{
    ControlMode, HomePosition, LandDetected, LandingGearState, LocalPosition, NavigationState,
    ParameterUpdate, PosControlOutput, VehicleStatus,
};
use nalgebra::Vector3;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the scripted flight tasks do, shared with the test.
#[derive(Default)]
struct TaskScript {
    refused: HashSet<FlightTaskIndex>,
    active: FlightTaskIndex,
    update_fails: bool,
    setpoint: Setpoint,
    constraints: Constraints,
    parameter_updates: usize,
}

#[derive(Clone, Default)]
struct ScriptedTasks(Arc<Mutex<TaskScript>>);

impl FlightTasks for ScriptedTasks {
    fn switch_task(&mut self, index: FlightTaskIndex) -> Result<(), FlightTaskError> {
        let mut script = self.0.lock().unwrap();
        if script.refused.contains(&index) {
            return Err(FlightTaskError::ACTIVATION_FAILED);
        }
        script.active = index;
        Ok(())
    }

    fn update(&mut self) -> bool {
        !self.0.lock().unwrap().update_fails
    }

    fn setpoint(&self) -> Setpoint {
        self.0.lock().unwrap().setpoint
    }

    fn constraints(&self) -> Constraints {
        self.0.lock().unwrap().constraints
    }

    fn active_task(&self) -> FlightTaskIndex {
        self.0.lock().unwrap().active
    }

    fn handle_parameter_update(&mut self) {
        self.0.lock().unwrap().parameter_updates += 1;
    }
}

/// Records what the PID cascade was fed, answers with a fixed thrust.
#[derive(Default)]
struct ControlLog {
    thrust: Vector3<f32>,
    setpoint: Option<Setpoint>,
    state: Option<ControlState>,
    constraints: Option<Constraints>,
    xy_resets: usize,
    z_resets: usize,
}

#[derive(Clone, Default)]
struct RecordingControl(Arc<Mutex<ControlLog>>);

impl PositionControl for RecordingControl {
    fn update_constraints(&mut self, constraints: &Constraints) {
        self.0.lock().unwrap().constraints = Some(*constraints);
    }

    fn update_state(&mut self, state: &ControlState) {
        self.0.lock().unwrap().state = Some(*state);
    }

    fn update_setpoint(&mut self, setpoint: &Setpoint) {
        self.0.lock().unwrap().setpoint = Some(*setpoint);
    }

    fn generate_thrust_yaw_setpoint(&mut self, _dt: f32) {}

    fn output(&self) -> ControlOutput {
        let log = self.0.lock().unwrap();
        let setpoint = log.setpoint.unwrap_or_default();
        ControlOutput {
            thrust: log.thrust,
            yaw: setpoint.yaw.unwrap_or(0.0),
            yawspeed: setpoint.yawspeed.unwrap_or(0.0),
            position: setpoint.position,
            velocity: setpoint.velocity,
        }
    }

    fn reset_integral_xy(&mut self) {
        self.0.lock().unwrap().xy_resets += 1;
    }

    fn reset_integral_z(&mut self) {
        self.0.lock().unwrap().z_resets += 1;
    }
}

/// The position control task wired to a bus, cycled by hand.
struct Rig {
    bus: Arc<TelemetryBus>,
    clock: RobotClock,
    mock: RobotClockMock,
    storage: InMemoryParameters,
    tasks: Arc<Mutex<TaskScript>>,
    pid: Arc<Mutex<ControlLog>>,
    task: McPosControlTask<ScriptedTasks, RecordingControl>,
    endpoint: BusEndpoint,
    output: CuMsg<PosControlOutput>,
}

impl Rig {
    fn new(params: PosControlParams) -> Self {
        Self::with_status(
            params,
            Some(VehicleStatus {
                timestamp_ns: 1,
                nav_state: NavigationState::PositionControl,
                is_vtol: false,
            }),
        )
    }

    fn with_status(params: PosControlParams, status: Option<VehicleStatus>) -> Self {
        let (clock, mock) = RobotClock::mock();
        mock.increment(Duration::from_secs(1));
        let bus = TelemetryBus::new();
        if let Some(status) = status {
            bus.vehicle_status.publish(status);
        }
        let storage = InMemoryParameters::new(params);
        let tasks = ScriptedTasks::default();
        let pid = RecordingControl::default();
        let mut task =
            McPosControlTask::with_parts(storage.clone(), tasks.clone(), pid.clone()).unwrap();
        task.start(&clock).unwrap();
        let endpoint = BusEndpoint::new(&bus);
        Self {
            bus,
            clock,
            mock,
            storage,
            tasks: tasks.0,
            pid: pid.0,
            task,
            endpoint,
            output: CuMsg::new(None),
        }
    }

    fn armed(params: PosControlParams, nav_state: NavigationState) -> Self {
        let rig = Self::new(PosControlParams {
            idle_before_takeoff_ms: 0,
            ..params
        });
        rig.set_nav_state(nav_state);
        rig.set_control_mode(ControlMode {
            flag_armed: true,
            flag_control_position_enabled: true,
            flag_control_velocity_enabled: true,
            ..Default::default()
        });
        rig
    }

    fn set_nav_state(&self, nav_state: NavigationState) {
        self.bus.vehicle_status.publish(VehicleStatus {
            timestamp_ns: 2,
            nav_state,
            is_vtol: false,
        });
    }

    fn set_control_mode(&self, mode: ControlMode) {
        self.bus.control_mode.publish(mode);
    }

    fn set_position(&self, z: f32, vz: f32, yaw: f32) {
        self.bus.local_position.publish(LocalPosition {
            timestamp_ns: self.clock.now().as_nanos(),
            z,
            vz,
            z_deriv: vz,
            yaw,
            xy_valid: true,
            z_valid: true,
            v_xy_valid: true,
            v_z_valid: true,
            ..Default::default()
        });
    }

    fn set_land(&self, land: LandDetected) {
        self.bus.land_detected.publish(land);
    }

    fn airborne(&self) {
        self.set_land(LandDetected {
            landed: false,
            ..Default::default()
        });
    }

    fn set_position_without_altitude(&self) {
        self.bus.local_position.publish(LocalPosition {
            timestamp_ns: self.clock.now().as_nanos(),
            z: f32::NAN,
            vz: f32::NAN,
            z_deriv: f32::NAN,
            xy_valid: true,
            v_xy_valid: true,
            ..Default::default()
        });
    }

    fn cycle(&mut self) -> CycleReport {
        self.mock.increment(Duration::from_millis(4));
        if self.endpoint.receive(self.clock.now()) {
            self.task.notify_parameter_update();
        }
        self.task
            .process(&self.clock, &self.endpoint.inputs(), &mut self.output)
            .unwrap();
        if let Some(output) = self.output.payload() {
            self.endpoint.publish(output);
        }
        *self.task.last_report()
    }

    fn last_setpoint(&self) -> Setpoint {
        self.pid.lock().unwrap().setpoint.expect("the PID cascade was not run")
    }
}

#[test]
fn position_control_activates_the_position_task() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::PositionControl);
    let report = rig.cycle();
    assert_eq!(report.selection, Some(Selection::Activated(FlightTaskIndex::Position)));
    assert_eq!(report.active_task, FlightTaskIndex::Position);
}

#[test]
fn pos_mode_parameter_selects_the_variant() {
    let params = PosControlParams {
        pos_mode: 2,
        ..Default::default()
    };
    let mut rig = Rig::armed(params, NavigationState::PositionControl);
    assert_eq!(rig.cycle().active_task, FlightTaskIndex::Sport);

    rig.storage.modify(|p| p.pos_mode = 1).unwrap();
    rig.bus.parameter_update.publish(ParameterUpdate {
        timestamp_ns: 3,
        instance: 1,
    });
    assert_eq!(rig.cycle().active_task, FlightTaskIndex::PositionSmooth);
    // once at construction, once on the notification
    assert_eq!(rig.tasks.lock().unwrap().parameter_updates, 2);
}

#[test]
fn failed_follow_me_ends_in_stabilized() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::AutoFollowTarget);
    rig.set_control_mode(ControlMode {
        flag_armed: true,
        flag_control_auto_enabled: true,
        ..Default::default()
    });
    rig.tasks.lock().unwrap().refused = [
        FlightTaskIndex::AutoFollowMe,
        FlightTaskIndex::AutoLine,
        FlightTaskIndex::Position,
        FlightTaskIndex::Altitude,
    ]
    .into_iter()
    .collect();
    assert_eq!(rig.cycle().active_task, FlightTaskIndex::Stabilized);

    rig.tasks.lock().unwrap().refused.remove(&FlightTaskIndex::Position);
    assert_eq!(rig.cycle().active_task, FlightTaskIndex::Position);
}

#[test]
fn auto_line_replaces_a_refused_follow_me() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::AutoFollowTarget);
    rig.set_control_mode(ControlMode {
        flag_armed: true,
        flag_control_auto_enabled: true,
        ..Default::default()
    });
    rig.tasks.lock().unwrap().refused = [FlightTaskIndex::AutoFollowMe].into_iter().collect();
    let report = rig.cycle();
    assert_eq!(report.selection, Some(Selection::Activated(FlightTaskIndex::AutoLine)));
    assert_eq!(report.active_task, FlightTaskIndex::AutoLine);
}

#[test]
fn cascade_failure_leaves_the_integrals_alone() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::Stabilized);
    rig.tasks.lock().unwrap().refused = [FlightTaskIndex::Stabilized].into_iter().collect();
    let report = rig.cycle();
    assert_eq!(report.selection, Some(Selection::Failed));
    assert_eq!(report.active_task, FlightTaskIndex::None);
    assert_eq!(rig.pid.lock().unwrap().xy_resets, 0);
    assert_eq!(rig.pid.lock().unwrap().z_resets, 0);
}

#[test]
fn landed_vehicle_asked_to_climb_starts_a_smooth_takeoff() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::PositionControl);
    rig.set_position(0.0, 0.0, 0.3);
    rig.tasks.lock().unwrap().setpoint = Setpoint {
        position: Axes3::new(0.0, 0.0, -1.0),
        yaw: Some(0.3),
        ..Default::default()
    };

    rig.cycle();
    assert!(rig.task.controller().takeoff().is_ramping());
    assert_relative_eq!(rig.task.controller().takeoff().speed(), TAKEOFF_INITIAL_SPEED, epsilon = 0.01);

    let setpoint = rig.last_setpoint();
    assert_eq!(setpoint.position.xy(), None);
    assert_eq!(setpoint.position.z, Some(-1.0));
    assert_eq!(setpoint.yaw, None);
    assert_eq!(setpoint.velocity.xy(), Some((0.0, 0.0)));
    let constraints = rig.pid.lock().unwrap().constraints.unwrap();
    assert_eq!(constraints.speed_up, Some(rig.task.controller().takeoff().speed()));
}

#[test]
fn takeoff_waits_for_the_arm_hysteresis() {
    let mut rig = Rig::new(PosControlParams::default());
    rig.set_control_mode(ControlMode {
        flag_armed: true,
        ..Default::default()
    });
    rig.set_position(0.0, 0.0, 0.0);
    rig.tasks.lock().unwrap().setpoint = Setpoint {
        position: Axes3::new(0.0, 0.0, -3.0),
        ..Default::default()
    };

    rig.cycle();
    assert!(!rig.task.controller().armed_long_enough());
    assert!(!rig.task.controller().takeoff().is_ramping());
    // still on the ground: throttle low
    assert_eq!(rig.last_setpoint().thrust, Axes3::new(0.0, 0.0, 0.0));

    rig.mock.increment(Duration::from_millis(2500));
    rig.cycle();
    assert!(rig.task.controller().armed_long_enough());
    assert!(rig.task.controller().takeoff().is_ramping());
}

#[test]
fn takeoff_ramp_ends_when_the_altitude_is_lost() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::PositionControl);
    rig.set_position(0.0, 0.0, 0.0);
    rig.tasks.lock().unwrap().setpoint = Setpoint {
        position: Axes3::new(0.0, 0.0, -3.0),
        ..Default::default()
    };
    rig.cycle();
    assert!(rig.task.controller().takeoff().is_ramping());

    rig.set_position_without_altitude();
    for _ in 0..10 {
        rig.cycle();
        assert_eq!(rig.task.controller().state().position.z, None);
        assert!(!rig.task.controller().takeoff().is_ramping());
        // still landed: throttle low again
        assert_eq!(rig.last_setpoint().thrust, Axes3::new(0.0, 0.0, 0.0));
    }
}

#[test]
fn failing_task_descends_at_landing_speed() {
    let params = PosControlParams {
        land_speed: 0.6,
        ..Default::default()
    };
    let mut rig = Rig::armed(params, NavigationState::PositionControl);
    rig.airborne();
    rig.set_position(-10.0, 0.0, 0.0);
    rig.cycle();

    rig.tasks.lock().unwrap().update_fails = true;
    let report = rig.cycle();
    assert!(report.failsafe);
    let setpoint = rig.last_setpoint();
    assert_eq!(setpoint.velocity.z, Some(0.6));
    assert_eq!(setpoint.thrust.x, Some(0.0));
    assert_eq!(setpoint.thrust.y, Some(0.0));
    assert_eq!(setpoint.position, Axes3::NONE);
}

#[test]
fn failsafe_warning_is_rate_limited() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::PositionControl);
    rig.airborne();
    rig.set_position(-10.0, 0.0, 0.0);
    rig.tasks.lock().unwrap().update_fails = true;

    let report = rig.cycle();
    assert!(report.failsafe);
    assert!(report.failsafe_warned);

    // 4 ms cycles, quiet up to and including 200 ms later
    for _ in 0..50 {
        let report = rig.cycle();
        assert!(report.failsafe);
        assert!(!report.failsafe_warned);
    }
    let report = rig.cycle();
    assert!(report.failsafe_warned);
}

#[test]
fn failing_task_without_vertical_velocity_leaves_everything_uncontrolled() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::PositionControl);
    rig.airborne();
    rig.tasks.lock().unwrap().update_fails = true;
    rig.cycle();
    assert_eq!(rig.last_setpoint(), Setpoint::uncontrolled());
}

#[test]
fn no_task_holds_a_level_idle_attitude() {
    let mut rig = Rig::new(PosControlParams::default());
    rig.set_position(0.0, 0.0, 0.8);
    let report = rig.cycle();
    assert_eq!(report.active_task, FlightTaskIndex::None);
    assert!(report.attitude_published);

    let (attitude, _) = rig.bus.attitude_setpoint.latest();
    assert_eq!(attitude.roll_body, 0.0);
    assert_eq!(attitude.pitch_body, 0.0);
    assert_relative_eq!(attitude.yaw_body, 0.8);
    assert_eq!(attitude.thrust, 0.0);
    assert!(attitude.q_d_valid);
    assert_eq!(attitude.landing_gear, LandingGearState::Down);
    assert!(rig.pid.lock().unwrap().setpoint.is_none());
}

#[test]
fn disarming_drops_the_task() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::PositionControl);
    assert_eq!(rig.cycle().active_task, FlightTaskIndex::Position);
    rig.set_control_mode(ControlMode::default());
    let report = rig.cycle();
    assert_eq!(report.active_task, FlightTaskIndex::None);
    assert_eq!(report.selection, None);
    assert!(!rig.task.controller().armed_long_enough());
}

#[test]
fn landed_vehicle_keeps_the_throttle_low() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::PositionControl);
    rig.set_position(0.0, 0.0, 0.4);
    rig.tasks.lock().unwrap().setpoint = Setpoint {
        velocity: Axes3::new(1.0, 0.0, 0.0),
        yawspeed: Some(0.5),
        ..Default::default()
    };
    rig.tasks.lock().unwrap().constraints.landing_gear = GearIntent::Up;
    rig.cycle();

    let setpoint = rig.last_setpoint();
    assert_eq!(setpoint.thrust, Axes3::new(0.0, 0.0, 0.0));
    assert_eq!(setpoint.velocity, Axes3::NONE);
    assert_eq!(setpoint.yawspeed, None);
    assert_eq!(setpoint.yaw, Some(0.4));
    // gear request ignored on the ground
    let (attitude, _) = rig.bus.attitude_setpoint.latest();
    assert_eq!(attitude.landing_gear, LandingGearState::Down);
}

#[test]
fn gear_follows_the_task_in_flight() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::PositionControl);
    rig.airborne();
    rig.set_position(-10.0, 0.0, 0.0);
    rig.pid.lock().unwrap().thrust = Vector3::new(0.0, 0.0, -0.5);
    rig.tasks.lock().unwrap().constraints.landing_gear = GearIntent::Up;
    rig.cycle();
    assert_eq!(rig.bus.attitude_setpoint.latest().0.landing_gear, LandingGearState::Up);

    rig.tasks.lock().unwrap().constraints.landing_gear = GearIntent::Keep;
    rig.cycle();
    let (attitude, _) = rig.bus.attitude_setpoint.latest();
    assert_eq!(attitude.landing_gear, LandingGearState::Up);
    assert_relative_eq!(attitude.thrust, 0.5);
}

#[test]
fn ground_contact_cuts_horizontal_thrust() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::PositionControl);
    rig.set_land(LandDetected {
        landed: false,
        ground_contact: true,
        ..Default::default()
    });
    rig.set_position(-0.1, 0.0, 0.0);
    rig.pid.lock().unwrap().thrust = Vector3::new(0.1, 0.1, -0.3);
    rig.cycle();
    rig.cycle();

    let (setpoint, _) = rig.bus.local_position_setpoint.latest();
    assert_eq!(setpoint.thrust, [0.0, 0.0, -0.3]);
    assert_eq!(rig.pid.lock().unwrap().xy_resets, 1);

    rig.set_land(LandDetected {
        landed: false,
        ground_contact: true,
        maybe_landed: true,
        ..Default::default()
    });
    rig.cycle();
    let (setpoint, _) = rig.bus.local_position_setpoint.latest();
    assert_eq!(setpoint.thrust, [0.0, 0.0, 0.0]);
    assert_eq!(rig.pid.lock().unwrap().z_resets, 1);
}

#[test]
fn ground_contact_during_explicit_thrust_still_resets_once() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::Stabilized);
    rig.set_land(LandDetected {
        landed: false,
        ground_contact: true,
        ..Default::default()
    });
    rig.tasks.lock().unwrap().setpoint = Setpoint {
        thrust: Axes3::new(0.0, 0.0, -0.4),
        ..Default::default()
    };
    rig.pid.lock().unwrap().thrust = Vector3::new(0.1, 0.1, -0.4);
    rig.cycle();
    assert_eq!(rig.pid.lock().unwrap().xy_resets, 0);

    // the task hands the vertical axis back while still touching the ground
    rig.tasks.lock().unwrap().setpoint = Setpoint::default();
    rig.cycle();
    rig.cycle();
    assert_eq!(rig.pid.lock().unwrap().xy_resets, 1);
    let (setpoint, _) = rig.bus.local_position_setpoint.latest();
    assert_eq!(setpoint.thrust, [0.0, 0.0, -0.4]);
}

#[test]
fn explicit_vertical_thrust_bypasses_the_landing_limits() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::Stabilized);
    rig.set_land(LandDetected {
        landed: true,
        maybe_landed: true,
        ..Default::default()
    });
    rig.tasks.lock().unwrap().setpoint = Setpoint {
        thrust: Axes3::new(0.0, 0.0, -0.4),
        ..Default::default()
    };
    rig.pid.lock().unwrap().thrust = Vector3::new(0.0, 0.0, -0.4);
    rig.cycle();
    let (setpoint, _) = rig.bus.local_position_setpoint.latest();
    assert_eq!(setpoint.thrust, [0.0, 0.0, -0.4]);
    assert_eq!(rig.pid.lock().unwrap().z_resets, 0);
}

#[test]
fn altitude_ceiling_is_enforced() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::PositionControl);
    rig.set_land(LandDetected {
        landed: false,
        alt_max: Some(10.0),
        ..Default::default()
    });
    rig.bus.home_position.publish(HomePosition {
        timestamp_ns: 1,
        z: 0.0,
        valid_alt: true,
    });
    rig.set_position(-10.5, 0.0, 0.0);
    rig.tasks.lock().unwrap().setpoint = Setpoint {
        position: Axes3::new(0.0, 0.0, -30.0),
        velocity: Axes3::new(0.0, 0.0, -2.0),
        ..Default::default()
    };
    rig.cycle();
    let setpoint = rig.last_setpoint();
    assert_eq!(setpoint.position.z, Some(-10.0));
    assert_eq!(setpoint.velocity.z, Some(0.0));
}

#[test]
fn offboard_attitude_control_is_not_overwritten() {
    let mut rig = Rig::armed(PosControlParams::default(), NavigationState::Offboard);
    rig.set_control_mode(ControlMode {
        flag_armed: true,
        flag_control_offboard_enabled: true,
        ..Default::default()
    });
    let report = rig.cycle();
    assert_eq!(report.active_task, FlightTaskIndex::Offboard);
    assert!(!report.attitude_published);
    assert_eq!(rig.bus.attitude_setpoint.generation(), 0);
}

#[test]
fn vtol_publishes_on_the_virtual_topic() {
    let mut rig = Rig::with_status(
        PosControlParams::default(),
        Some(VehicleStatus {
            timestamp_ns: 1,
            nav_state: NavigationState::Manual,
            is_vtol: true,
        }),
    );
    assert!(rig.cycle().attitude_published);

    // a later status does not move the output
    rig.bus.vehicle_status.publish(VehicleStatus {
        timestamp_ns: 2,
        nav_state: NavigationState::Manual,
        is_vtol: false,
    });
    for _ in 0..2 {
        assert!(rig.cycle().attitude_published);
    }
    assert_eq!(rig.bus.virtual_attitude_setpoint.advertisements(), 1);
    assert_eq!(rig.bus.virtual_attitude_setpoint.generation(), 3);
    assert_eq!(rig.bus.attitude_setpoint.generation(), 0);
}

#[test]
fn nothing_is_published_before_the_first_vehicle_status() {
    let mut rig = Rig::with_status(PosControlParams::default(), None);
    assert!(!rig.cycle().attitude_published);
    assert_eq!(rig.bus.attitude_setpoint.generation(), 0);
    assert_eq!(rig.bus.virtual_attitude_setpoint.generation(), 0);
}
