use crate::attitude::{idle_attitude, thrust_to_attitude};
use crate::control::ControlOutput;
use crate::setpoint::GearIntent;
use cu29::prelude::*;
use cu_vehicle_payloads::{AttitudeSetpoint, AttitudeTopic, ControlMode, LandingGearState};

/// Builds the attitude setpoint and decides whether it goes out.
pub struct OutputPublisher {
    attitude_topic: Option<AttitudeTopic>,
    attitude: AttitudeSetpoint,
    requires_arm_hysteresis: bool,
}

impl OutputPublisher {
    pub fn new(requires_arm_hysteresis: bool) -> Self {
        Self {
            attitude_topic: None,
            // gear down until told otherwise
            attitude: AttitudeSetpoint::default(),
            requires_arm_hysteresis,
        }
    }

    pub fn set_requires_arm_hysteresis(&mut self, requires: bool) {
        self.requires_arm_hysteresis = requires;
    }

    /// Fixes the attitude consumer once, from the first vehicle status seen.
    pub fn select_attitude_topic(&mut self, is_vtol: bool) {
        if self.attitude_topic.is_none() {
            let topic = if is_vtol {
                AttitudeTopic::VirtualMulticopter
            } else {
                AttitudeTopic::Regular
            };
            debug!("attitude setpoints go to the vtol controller: {}", is_vtol);
            self.attitude_topic = Some(topic);
        }
    }

    pub fn attitude_topic(&self) -> Option<AttitudeTopic> {
        self.attitude_topic
    }

    pub fn attitude(&self) -> &AttitudeSetpoint {
        &self.attitude
    }

    /// Attitude from the controller thrust and yaw. The landing gear only moves on an explicit
    /// request.
    pub fn fill_from_control(&mut self, output: &ControlOutput, gear: GearIntent) {
        let landing_gear = match gear {
            GearIntent::Up => LandingGearState::Up,
            GearIntent::Down => LandingGearState::Down,
            GearIntent::Keep => self.attitude.landing_gear,
        };
        self.attitude = AttitudeSetpoint {
            yaw_sp_move_rate: output.yawspeed,
            landing_gear,
            ..thrust_to_attitude(&output.thrust, output.yaw)
        };
    }

    /// Level, no thrust, facing `yaw`.
    pub fn fill_idle(&mut self, yaw: f32) {
        self.attitude = AttitudeSetpoint {
            landing_gear: self.attitude.landing_gear,
            ..idle_attitude(yaw)
        };
    }

    /// The attitude setpoint stamped at `now`, unless another writer owns it (offboard attitude
    /// control), the consumer is still unknown, or the vehicle is not armed long enough when
    /// that is required.
    pub fn attitude_to_publish(
        &mut self,
        now: CuTime,
        armed: bool,
        control_mode: &ControlMode,
    ) -> Option<(AttitudeTopic, AttitudeSetpoint)> {
        if self.requires_arm_hysteresis && !armed {
            return None;
        }
        if control_mode.is_offboard_attitude_only() {
            return None;
        }
        let topic = self.attitude_topic?;
        self.attitude.timestamp_ns = now.as_nanos();
        Some((topic, self.attitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setpoint::Axes3;
    use nalgebra::Vector3;

    fn output(thrust: Vector3<f32>) -> ControlOutput {
        ControlOutput {
            thrust,
            yaw: 0.0,
            yawspeed: 0.2,
            position: Axes3::NONE,
            velocity: Axes3::NONE,
        }
    }

    #[test]
    fn nothing_goes_out_before_the_topic_is_known() {
        let (clock, _mock) = RobotClock::mock();
        let mut publisher = OutputPublisher::new(false);
        assert!(publisher
            .attitude_to_publish(clock.now(), true, &ControlMode::default())
            .is_none());
    }

    #[test]
    fn topic_is_chosen_once() {
        let mut publisher = OutputPublisher::new(false);
        publisher.select_attitude_topic(true);
        publisher.select_attitude_topic(false);
        assert_eq!(publisher.attitude_topic(), Some(AttitudeTopic::VirtualMulticopter));
    }

    #[test]
    fn setpoint_is_stamped() {
        let (clock, mock) = RobotClock::mock();
        mock.increment(std::time::Duration::from_millis(7));
        let mut publisher = OutputPublisher::new(false);
        publisher.select_attitude_topic(false);
        let (topic, attitude) = publisher
            .attitude_to_publish(clock.now(), false, &ControlMode::default())
            .unwrap();
        assert_eq!(topic, AttitudeTopic::Regular);
        assert_eq!(attitude.timestamp_ns, 7_000_000);
    }

    #[test]
    fn offboard_attitude_owner_is_left_alone() {
        let (clock, _mock) = RobotClock::mock();
        let mut publisher = OutputPublisher::new(false);
        publisher.select_attitude_topic(false);
        let offboard = ControlMode {
            flag_armed: true,
            flag_control_offboard_enabled: true,
            ..Default::default()
        };
        assert!(publisher.attitude_to_publish(clock.now(), true, &offboard).is_none());
    }

    #[test]
    fn arm_hysteresis_gate() {
        let (clock, _mock) = RobotClock::mock();
        let mut publisher = OutputPublisher::new(true);
        publisher.select_attitude_topic(false);
        assert!(publisher
            .attitude_to_publish(clock.now(), false, &ControlMode::default())
            .is_none());
        assert!(publisher
            .attitude_to_publish(clock.now(), true, &ControlMode::default())
            .is_some());
    }

    #[test]
    fn gear_only_moves_on_request() {
        let mut publisher = OutputPublisher::new(false);
        assert_eq!(publisher.attitude().landing_gear, LandingGearState::Down);

        publisher.fill_from_control(&output(Vector3::new(0.0, 0.0, -0.5)), GearIntent::Up);
        assert_eq!(publisher.attitude().landing_gear, LandingGearState::Up);

        publisher.fill_from_control(&output(Vector3::new(0.0, 0.0, -0.5)), GearIntent::Keep);
        assert_eq!(publisher.attitude().landing_gear, LandingGearState::Up);
        assert_eq!(publisher.attitude().yaw_sp_move_rate, 0.2);

        publisher.fill_idle(0.0);
        assert_eq!(publisher.attitude().landing_gear, LandingGearState::Up);

        publisher.fill_from_control(&output(Vector3::zeros()), GearIntent::Down);
        assert_eq!(publisher.attitude().landing_gear, LandingGearState::Down);
    }
}
