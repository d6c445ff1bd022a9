//! Multicopter position control orchestrator.
//!
//! Every cycle, [`McPosControl`] picks the flight task matching the navigation state, turns the
//! raw estimate into a [`ControlState`], lets the active task produce a [`Setpoint`], applies the
//! smooth takeoff ramp and the altitude and landing limits, runs the [`PositionControl`] cascade
//! and publishes the resulting attitude setpoint on the [`TelemetryBus`].
//!
//! The flight tasks and the PID cascade are provided by the caller through the [`FlightTasks`]
//! and [`PositionControl`] traits.
//!
//! In a copper application, [`McPosControlTask`] is a regular task:
//! ```ron
//! tasks: [(id: "mpc", type: "cu_mc_pos_control::McPosControlTask<MyTasks, MyPid>",
//!          config: {"pos_mode": 1, "takeoff_ramp_time": 2.0})]
//! ```
//! Outside of it, [`PosControlRunner`] runs the same task on its own thread against a
//! [`TelemetryBus`]:
//! ```ignore
//! let bus = TelemetryBus::new();
//! let mut runner = PosControlRunner::new();
//! runner.start(clock, &bus, || McPosControlTask::with_parts(params, tasks, pid))?;
//! ```

pub mod attitude;
pub mod bus;
pub mod control;
pub mod controller;
pub mod filters;
pub mod flight_tasks;
pub mod hysteresis;
pub mod limits;
pub mod params;
pub mod publisher;
pub mod ratelimit;
pub mod runner;
pub mod setpoint;
pub mod state;
pub mod takeoff;
pub mod task;

pub use bus::{BusEndpoint, Publication, Subscription, TelemetryBus, Topic};
pub use control::{ControlOutput, PositionControl};
pub use controller::{CycleInputs, CycleReport, McPosControl, DEFAULT_DT, POSITION_WAIT};
pub use flight_tasks::{FlightTaskError, FlightTaskIndex, FlightTaskSelector, FlightTasks, Selection};
pub use params::{InMemoryParameters, ParameterSource, PosControlParams, VzSource};
pub use runner::{PosControlRunner, RunnerStatus};
pub use setpoint::{Axes3, Constraints, GearIntent, Setpoint};
pub use state::ControlState;
pub use takeoff::{SmoothTakeoff, TakeoffPhase};
pub use task::{McPosControlTask, PosControlInputs};
pub use cu_vehicle_payloads::{AttitudeTopic, PosControlOutput};
