//! Flight task selection.
//!
//! Flight tasks are the navigation modes (manual sticks, missions, offboard...) producing the
//! setpoints. They live behind [`FlightTasks`], this module only decides which one should run.

use crate::ratelimit::LogRateLimiter;
use crate::setpoint::{Constraints, Setpoint};
use crate::warning_rl;
use cu29::prelude::*;
use cu_vehicle_payloads::{ControlMode, NavigationState};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlightTaskIndex {
    #[default]
    None,
    Offboard,
    AutoFollowMe,
    AutoLine,
    Position,
    PositionSmooth,
    Sport,
    Altitude,
    Stabilized,
}

impl FlightTaskIndex {
    pub const fn as_str(self) -> &'static str {
        match self {
            FlightTaskIndex::None => "none",
            FlightTaskIndex::Offboard => "offboard",
            FlightTaskIndex::AutoFollowMe => "auto follow me",
            FlightTaskIndex::AutoLine => "auto line",
            FlightTaskIndex::Position => "position",
            FlightTaskIndex::PositionSmooth => "position smooth",
            FlightTaskIndex::Sport => "sport",
            FlightTaskIndex::Altitude => "altitude",
            FlightTaskIndex::Stabilized => "stabilized",
        }
    }

    /// Manual position variant from the `pos_mode` parameter.
    pub const fn from_pos_mode(pos_mode: i32) -> Self {
        match pos_mode {
            1 => FlightTaskIndex::PositionSmooth,
            2 => FlightTaskIndex::Sport,
            _ => FlightTaskIndex::Position,
        }
    }
}

impl Display for FlightTaskIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error code of a task switch, 0 is never used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlightTaskError(pub i32);

impl FlightTaskError {
    pub const NO_VALID_TASK: Self = Self(-1);
    pub const ACTIVATION_FAILED: Self = Self(-2);
    pub const INVALID_STATE: Self = Self(-3);

    pub const fn default_text(self) -> &'static str {
        match self {
            Self::NO_VALID_TASK => "No valid task",
            Self::ACTIVATION_FAILED => "Activation failed",
            Self::INVALID_STATE => "Invalid state",
            _ => "Unknown error",
        }
    }
}

impl Display for FlightTaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.default_text(), self.0)
    }
}

impl std::error::Error for FlightTaskError {}

/// The flight task subsystem.
pub trait FlightTasks {
    /// Activates a task. Switching to [`FlightTaskIndex::None`] must always succeed.
    fn switch_task(&mut self, index: FlightTaskIndex) -> Result<(), FlightTaskError>;

    /// Runs the active task for one cycle, false if it could not produce a setpoint.
    fn update(&mut self) -> bool;

    fn setpoint(&self) -> Setpoint;

    fn constraints(&self) -> Constraints;

    fn active_task(&self) -> FlightTaskIndex;

    fn is_any_task_active(&self) -> bool {
        self.active_task() != FlightTaskIndex::None
    }

    fn error_to_str(&self, error: FlightTaskError) -> String {
        error.default_text().to_string()
    }

    /// Called every time the parameters were reloaded.
    fn handle_parameter_update(&mut self) {}
}

/// Outcome of one pass of the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The last attempted task is active.
    Activated(FlightTaskIndex),
    /// No rule matched, whatever was active stays active.
    Unchanged,
    /// Every attempt failed, no task is running anymore.
    Failed,
}

/// Picks the flight task from the navigation state, falling back to simpler tasks when an
/// activation fails.
#[derive(Debug, Clone)]
pub struct FlightTaskSelector {
    pos_mode: i32,
    activation_warn: LogRateLimiter,
    no_task_warn: LogRateLimiter,
}

impl FlightTaskSelector {
    pub fn new(pos_mode: i32) -> Self {
        Self {
            pos_mode,
            activation_warn: LogRateLimiter::new(),
            no_task_warn: LogRateLimiter::new(),
        }
    }

    pub fn set_pos_mode(&mut self, pos_mode: i32) {
        self.pos_mode = pos_mode;
    }

    /// Once an attempt failed, every following step is attempted whatever the navigation state,
    /// down to stabilized. A success clears the failure.
    pub fn select<T: FlightTasks>(
        &mut self,
        tasks: &mut T,
        nav_state: NavigationState,
        control_mode: &ControlMode,
        now: CuTime,
    ) -> Selection {
        let mut attempted = None;
        let mut failure = false;

        if nav_state == NavigationState::Offboard {
            attempted = Some(FlightTaskIndex::Offboard);
            failure = !self.attempt(tasks, FlightTaskIndex::Offboard, now);
        }

        if nav_state == NavigationState::AutoFollowTarget {
            attempted = Some(FlightTaskIndex::AutoFollowMe);
            failure = !self.attempt(tasks, FlightTaskIndex::AutoFollowMe, now);
        }
        // the auto line is the follow-me fallback when auto control is enabled
        if control_mode.flag_control_auto_enabled
            && (nav_state != NavigationState::AutoFollowTarget || failure)
        {
            attempted = Some(FlightTaskIndex::AutoLine);
            failure = !self.attempt(tasks, FlightTaskIndex::AutoLine, now);
        }

        if nav_state == NavigationState::PositionControl || failure {
            let index = FlightTaskIndex::from_pos_mode(self.pos_mode);
            attempted = Some(index);
            failure = !self.attempt(tasks, index, now);
        }

        if nav_state == NavigationState::AltitudeControl || failure {
            attempted = Some(FlightTaskIndex::Altitude);
            failure = !self.attempt(tasks, FlightTaskIndex::Altitude, now);
        }

        if matches!(
            nav_state,
            NavigationState::Manual | NavigationState::Stabilized
        ) || failure
        {
            attempted = Some(FlightTaskIndex::Stabilized);
            failure = !self.attempt(tasks, FlightTaskIndex::Stabilized, now);
        }

        if failure {
            // None can't be refused
            let _ = tasks.switch_task(FlightTaskIndex::None);
            warning_rl!(self.no_task_warn, now, "No flight task is running");
            return Selection::Failed;
        }

        match attempted {
            Some(index) => Selection::Activated(index),
            None => Selection::Unchanged,
        }
    }

    fn attempt<T: FlightTasks>(&mut self, tasks: &mut T, index: FlightTaskIndex, now: CuTime) -> bool {
        match tasks.switch_task(index) {
            Ok(()) => true,
            Err(error) => {
                let reason = tasks.error_to_str(error);
                warning_rl!(
                    self.activation_warn,
                    now,
                    "{} activation failed with error: {}",
                    index.as_str(),
                    reason.as_str()
                );
                false
            }
        }
    }
}
