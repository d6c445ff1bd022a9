//! In-process telemetry bus.
//!
//! Every topic keeps the last published value only: a slow reader silently misses the
//! intermediate samples.

use crate::task::PosControlInputs;
use cu29::prelude::*;
use cu_vehicle_payloads::{
    AttitudeSetpoint, AttitudeTopic, ControlMode, HomePosition, LandDetected, LocalPosition,
    LocalPositionSetpoint, ParameterUpdate, PosControlOutput, VehicleStatus,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Slot<T> {
    value: T,
    /// Number of publications so far, 0 means never published.
    generation: u64,
}

/// Last value wins topic.
#[derive(Debug, Default)]
pub struct Topic<T> {
    slot: Mutex<Slot<T>>,
    published: Condvar,
    advertisements: AtomicUsize,
}

impl<T: Clone + Default> Topic<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            published: Condvar::new(),
            advertisements: AtomicUsize::new(0),
        }
    }

    // values are replaced whole, a poisoned slot is still consistent
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, value: T) {
        let mut slot = self.lock();
        slot.value = value;
        slot.generation += 1;
        drop(slot);
        self.published.notify_all();
    }

    pub fn latest(&self) -> (T, u64) {
        let slot = self.lock();
        (slot.value.clone(), slot.generation)
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Waits until something newer than `seen` is published, false on timeout.
    pub fn wait_newer(&self, seen: u64, timeout: Duration) -> bool {
        let slot = self.lock();
        let (slot, _) = self
            .published
            .wait_timeout_while(slot, timeout, |slot| slot.generation <= seen)
            .unwrap_or_else(PoisonError::into_inner);
        slot.generation > seen
    }

    /// How many publishers were ever handed out for this topic.
    pub fn advertisements(&self) -> usize {
        self.advertisements.load(Ordering::Relaxed)
    }
}

/// Reader side of a topic, remembers what it already copied.
#[derive(Debug)]
pub struct Subscription<T> {
    topic: Arc<Topic<T>>,
    seen: u64,
}

impl<T: Clone + Default> Subscription<T> {
    pub fn new(topic: Arc<Topic<T>>) -> Self {
        Self { topic, seen: 0 }
    }

    pub fn copy_if_updated(&mut self) -> Option<T> {
        let (value, generation) = self.topic.latest();
        if generation > self.seen {
            self.seen = generation;
            Some(value)
        } else {
            None
        }
    }

    pub fn wait(&self, timeout: Duration) -> bool {
        self.topic.wait_newer(self.seen, timeout)
    }
}

/// Writer side of a topic.
#[derive(Debug)]
pub struct Publication<T> {
    topic: Arc<Topic<T>>,
}

impl<T: Clone + Default> Publication<T> {
    pub fn advertise(topic: &Arc<Topic<T>>, initial: T) -> Self {
        topic.advertisements.fetch_add(1, Ordering::Relaxed);
        topic.publish(initial);
        Self {
            topic: Arc::clone(topic),
        }
    }

    pub fn publish(&self, value: T) {
        self.topic.publish(value);
    }
}

/// All the topics the position controller reads and writes.
#[derive(Debug, Default)]
pub struct TelemetryBus {
    pub vehicle_status: Arc<Topic<VehicleStatus>>,
    pub land_detected: Arc<Topic<LandDetected>>,
    pub control_mode: Arc<Topic<ControlMode>>,
    pub parameter_update: Arc<Topic<ParameterUpdate>>,
    pub local_position: Arc<Topic<LocalPosition>>,
    pub home_position: Arc<Topic<HomePosition>>,
    pub local_position_setpoint: Arc<Topic<LocalPositionSetpoint>>,
    pub attitude_setpoint: Arc<Topic<AttitudeSetpoint>>,
    pub virtual_attitude_setpoint: Arc<Topic<AttitudeSetpoint>>,
}

impl TelemetryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attitude_topic(&self, which: AttitudeTopic) -> &Arc<Topic<AttitudeSetpoint>> {
        match which {
            AttitudeTopic::Regular => &self.attitude_setpoint,
            AttitudeTopic::VirtualMulticopter => &self.virtual_attitude_setpoint,
        }
    }
}

/// Hooks a [`McPosControlTask`](crate::task::McPosControlTask) on the bus: its input messages
/// are filled from the topics that changed, its outputs go to the matching topics.
///
/// Each output topic is advertised on its first publication, the handle is kept afterwards.
pub struct BusEndpoint {
    bus: Arc<TelemetryBus>,
    vehicle_status: Subscription<VehicleStatus>,
    land_detected: Subscription<LandDetected>,
    control_mode: Subscription<ControlMode>,
    parameter_update: Subscription<ParameterUpdate>,
    local_position: Subscription<LocalPosition>,
    home_position: Subscription<HomePosition>,

    status_msg: CuMsg<VehicleStatus>,
    land_msg: CuMsg<LandDetected>,
    mode_msg: CuMsg<ControlMode>,
    position_msg: CuMsg<LocalPosition>,
    home_msg: CuMsg<HomePosition>,

    attitude_pub: Option<Publication<AttitudeSetpoint>>,
    local_setpoint_pub: Option<Publication<LocalPositionSetpoint>>,
}

impl BusEndpoint {
    pub fn new(bus: &Arc<TelemetryBus>) -> Self {
        Self {
            bus: Arc::clone(bus),
            vehicle_status: Subscription::new(Arc::clone(&bus.vehicle_status)),
            land_detected: Subscription::new(Arc::clone(&bus.land_detected)),
            control_mode: Subscription::new(Arc::clone(&bus.control_mode)),
            parameter_update: Subscription::new(Arc::clone(&bus.parameter_update)),
            local_position: Subscription::new(Arc::clone(&bus.local_position)),
            home_position: Subscription::new(Arc::clone(&bus.home_position)),

            status_msg: CuMsg::new(None),
            land_msg: CuMsg::new(None),
            mode_msg: CuMsg::new(None),
            position_msg: CuMsg::new(None),
            home_msg: CuMsg::new(None),

            attitude_pub: None,
            local_setpoint_pub: None,
        }
    }

    /// Blocks until a new position sample arrives or the timeout elapses.
    pub fn wait_for_position(&self, timeout: Duration) -> bool {
        self.local_position.wait(timeout)
    }

    /// Refreshes the input messages, the ones without news are left empty. Returns true when a
    /// parameter update was announced.
    pub fn receive(&mut self, now: CuTime) -> bool {
        fill(&mut self.status_msg, &mut self.vehicle_status, now);
        fill(&mut self.land_msg, &mut self.land_detected, now);
        fill(&mut self.mode_msg, &mut self.control_mode, now);
        fill(&mut self.position_msg, &mut self.local_position, now);
        fill(&mut self.home_msg, &mut self.home_position, now);
        self.parameter_update.copy_if_updated().is_some()
    }

    pub fn inputs(&self) -> PosControlInputs<'_> {
        (
            &self.status_msg,
            &self.land_msg,
            &self.mode_msg,
            &self.position_msg,
            &self.home_msg,
        )
    }

    pub fn publish(&mut self, output: &PosControlOutput) {
        if let Some(setpoint) = output.local_setpoint {
            match &self.local_setpoint_pub {
                Some(publication) => publication.publish(setpoint),
                None => {
                    self.local_setpoint_pub = Some(Publication::advertise(
                        &self.bus.local_position_setpoint,
                        setpoint,
                    ))
                }
            }
        }

        if let Some(attitude) = output.attitude {
            match &self.attitude_pub {
                Some(publication) => publication.publish(attitude),
                None => {
                    let topic = self.bus.attitude_topic(output.attitude_topic);
                    self.attitude_pub = Some(Publication::advertise(topic, attitude));
                }
            }
        }
    }
}

fn fill<T: CuMsgPayload>(msg: &mut CuMsg<T>, subscription: &mut Subscription<T>, now: CuTime) {
    match subscription.copy_if_updated() {
        Some(value) => {
            msg.tov = Tov::Time(now);
            msg.set_payload(value);
        }
        None => msg.clear_payload(),
    }
}
