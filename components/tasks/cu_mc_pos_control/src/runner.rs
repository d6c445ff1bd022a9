use crate::bus::{BusEndpoint, TelemetryBus};
use crate::control::PositionControl;
use crate::controller::POSITION_WAIT;
use crate::flight_tasks::{FlightTaskIndex, FlightTasks};
use crate::task::McPosControlTask;
use cu29::prelude::*;
use cu_vehicle_payloads::PosControlOutput;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const THREAD_NAME: &str = "mc_pos_control";
const STOP_POLL: Duration = Duration::from_millis(20);
const STOP_ATTEMPTS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerStatus {
    pub running: bool,
    pub cycles: u64,
    pub active_task: FlightTaskIndex,
}

#[derive(Debug, Default)]
struct Shared {
    should_stop: AtomicBool,
    exited: AtomicBool,
    cycles: AtomicU64,
    active_task: Mutex<FlightTaskIndex>,
}

impl Shared {
    fn active_task(&self) -> FlightTaskIndex {
        *self.active_task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_active_task(&self, index: FlightTaskIndex) {
        *self.active_task.lock().unwrap_or_else(PoisonError::into_inner) = index;
    }
}

struct Worker {
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

/// Runs a [`McPosControlTask`] on its own thread against a [`TelemetryBus`], with start / stop /
/// status controls.
#[derive(Default)]
pub struct PosControlRunner {
    worker: Option<Worker>,
}

impl PosControlRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Builds and starts the task on the calling thread, then runs it on the bus from a worker
    /// thread. Fails if already running or if the task can't be built or started.
    pub fn start<T, C, F>(
        &mut self,
        clock: RobotClock,
        bus: &Arc<TelemetryBus>,
        build: F,
    ) -> CuResult<()>
    where
        T: FlightTasks + Default + Send + 'static,
        C: PositionControl + Default + Send + 'static,
        F: FnOnce() -> CuResult<McPosControlTask<T, C>>,
    {
        if self.worker.is_some() {
            return Err(CuError::from("mc_pos_control already running"));
        }
        let mut task = build()?;
        task.start(&clock)?;

        let shared = Arc::new(Shared::default());
        let endpoint = BusEndpoint::new(bus);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                move || control_loop(task, endpoint, clock, shared)
            })
            .map_err(|e| CuError::new_with_cause("mc_pos_control task start failed", e))?;

        self.worker = Some(Worker { shared, handle });
        Ok(())
    }

    /// Asks the loop to stop and waits for the current cycle to finish. A loop that does not
    /// stop in time is detached.
    pub fn stop(&mut self) -> CuResult<()> {
        let Some(worker) = self.worker.take() else {
            return Err(CuError::from("mc_pos_control not running"));
        };
        worker.shared.should_stop.store(true, Ordering::Relaxed);

        for _ in 0..STOP_ATTEMPTS {
            if worker.shared.exited.load(Ordering::Acquire) {
                return worker
                    .handle
                    .join()
                    .map_err(|_| CuError::from("mc_pos_control thread panicked"));
            }
            thread::sleep(STOP_POLL);
        }

        // no way to kill a thread, let it finish on its own
        error!("mc_pos_control did not stop in time, detaching it");
        drop(worker.handle);
        Ok(())
    }

    pub fn status(&self) -> RunnerStatus {
        match &self.worker {
            Some(worker) => RunnerStatus {
                running: true,
                cycles: worker.shared.cycles.load(Ordering::Relaxed),
                active_task: worker.shared.active_task(),
            },
            None => RunnerStatus {
                running: false,
                cycles: 0,
                active_task: FlightTaskIndex::None,
            },
        }
    }
}

impl Drop for PosControlRunner {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop();
        }
    }
}

fn control_loop<T, C>(
    mut task: McPosControlTask<T, C>,
    mut endpoint: BusEndpoint,
    clock: RobotClock,
    shared: Arc<Shared>,
) where
    T: FlightTasks + Default,
    C: PositionControl + Default,
{
    let mut output = CuMsg::<PosControlOutput>::new(None);
    while !shared.should_stop.load(Ordering::Relaxed) {
        // a timeout still runs the cycle to keep manual input and safety checks going
        endpoint.wait_for_position(POSITION_WAIT);
        if endpoint.receive(clock.now()) {
            task.notify_parameter_update();
        }
        match task.process(&clock, &endpoint.inputs(), &mut output) {
            Ok(()) => {
                if let Some(payload) = output.payload() {
                    endpoint.publish(payload);
                }
            }
            Err(e) => {
                let reason = e.to_string();
                error!("mc_pos_control cycle failed: {}", reason);
            }
        }
        shared.cycles.fetch_add(1, Ordering::Relaxed);
        shared.set_active_task(task.last_report().active_task);
    }
    if let Err(e) = task.stop(&clock) {
        let reason = e.to_string();
        error!("mc_pos_control did not stop cleanly: {}", reason);
    }
    shared.exited.store(true, Ordering::Release);
}
