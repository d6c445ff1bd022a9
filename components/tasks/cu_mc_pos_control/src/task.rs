use crate::control::PositionControl;
use crate::controller::{CycleInputs, CycleReport, McPosControl};
use crate::flight_tasks::FlightTasks;
use crate::params::{InMemoryParameters, PosControlParams};
use cu29::prelude::*;
use cu_vehicle_payloads::{
    ControlMode, HomePosition, LandDetected, LocalPosition, PosControlOutput, VehicleStatus,
};

/// Input messages of the position control task, in connection order.
pub type PosControlInputs<'m> =
    input_msg!('m, VehicleStatus, LandDetected, ControlMode, LocalPosition, HomePosition);

/// Copper task running one [`McPosControl`] cycle per process call.
///
/// The flight tasks and the PID core are built with `Default` when the runtime instantiates the
/// task. The parameters come from the task config and can be changed at runtime through
/// [`parameters`](McPosControlTask::parameters).
pub struct McPosControlTask<T, C>
where
    T: FlightTasks,
    C: PositionControl,
{
    controller: McPosControl<T, C>,
    parameters: InMemoryParameters,
    seen_revision: u64,
    update_notified: bool,
    running: bool,
    cycles: u64,
    last_report: CycleReport,
}

impl<T, C> McPosControlTask<T, C>
where
    T: FlightTasks,
    C: PositionControl,
{
    pub fn with_parts(parameters: InMemoryParameters, tasks: T, control: C) -> CuResult<Self> {
        let seen_revision = parameters.revision()?;
        let controller = McPosControl::new(parameters.clone(), tasks, control)?;
        Ok(Self {
            controller,
            parameters,
            seen_revision,
            update_notified: false,
            running: false,
            cycles: 0,
            last_report: CycleReport::default(),
        })
    }

    pub fn controller(&self) -> &McPosControl<T, C> {
        &self.controller
    }

    /// Shared handle on the parameter storage, writes are picked up on the next cycle.
    pub fn parameters(&self) -> &InMemoryParameters {
        &self.parameters
    }

    /// Reload the parameters on the next cycle, whether or not the storage changed.
    pub fn notify_parameter_update(&mut self) {
        self.update_notified = true;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn last_report(&self) -> &CycleReport {
        &self.last_report
    }

    fn parameters_changed(&mut self) -> bool {
        let notified = std::mem::take(&mut self.update_notified);
        match self.parameters.revision() {
            Ok(revision) if revision != self.seen_revision => {
                self.seen_revision = revision;
                true
            }
            // a poisoned storage is reported by the reload itself
            Ok(_) => notified,
            Err(_) => true,
        }
    }
}

impl<T, C> Freezable for McPosControlTask<T, C>
where
    T: FlightTasks,
    C: PositionControl,
{
}

impl<T, C> CuTask for McPosControlTask<T, C>
where
    T: FlightTasks + Default,
    C: PositionControl + Default,
{
    type Input<'m> = PosControlInputs<'m>;
    type Output<'m> = output_msg!(PosControlOutput);

    fn new(config: Option<&ComponentConfig>) -> CuResult<Self>
    where
        Self: Sized,
    {
        let params = PosControlParams::from_component_config(config)?;
        Self::with_parts(InMemoryParameters::new(params), T::default(), C::default())
    }

    fn start(&mut self, _clock: &RobotClock) -> CuResult<()> {
        if self.running {
            return Err("mc_pos_control already running".into());
        }
        self.running = true;
        info!("mc_pos_control started");
        Ok(())
    }

    fn process(
        &mut self,
        clock: &RobotClock,
        input: &Self::Input<'_>,
        output: &mut Self::Output<'_>,
    ) -> CuResult<()> {
        let (status_msg, land_msg, mode_msg, position_msg, home_msg) = *input;
        let inputs = CycleInputs {
            vehicle_status: status_msg.payload(),
            land_detected: land_msg.payload(),
            control_mode: mode_msg.payload(),
            local_position: position_msg.payload(),
            home_position: home_msg.payload(),
            parameters_changed: self.parameters_changed(),
        };

        let now = clock.now();
        let mut payload = PosControlOutput::default();
        self.last_report = self.controller.run_cycle(now, &inputs, &mut payload);
        self.cycles += 1;

        output.tov = Tov::Time(now);
        output.set_payload(payload);
        Ok(())
    }

    fn stop(&mut self, _clock: &RobotClock) -> CuResult<()> {
        if !self.running {
            return Err("mc_pos_control not running".into());
        }
        self.running = false;
        info!("[mpc] stopped");
        Ok(())
    }
}
