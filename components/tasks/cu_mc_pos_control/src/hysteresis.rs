use cu29::prelude::*;

/// Debounced arm signal.
///
/// Rises only after the raw signal stayed true for the whole delay, falls as soon as the raw
/// signal goes false. Every change of the raw signal restarts the timer.
#[derive(Debug, Clone, Copy)]
pub struct ArmHysteresis {
    state: bool,
    requested: bool,
    last_transition: OptionCuTime,
    rise_delay: CuDuration,
}

impl ArmHysteresis {
    pub fn new(rise_delay: CuDuration) -> Self {
        Self {
            state: false,
            requested: false,
            last_transition: OptionCuTime::none(),
            rise_delay,
        }
    }

    pub fn set_rise_delay(&mut self, rise_delay: CuDuration) {
        self.rise_delay = rise_delay;
    }

    pub fn state(&self) -> bool {
        self.state
    }

    pub fn set_state_and_update(&mut self, raw: bool, now: CuTime) {
        if raw != self.requested || self.last_transition.is_none() {
            self.requested = raw;
            self.last_transition = now.into();
        }

        if !raw {
            self.state = false;
            return;
        }

        if !self.state {
            let since = now
                .as_nanos()
                .saturating_sub(self.last_transition.unwrap().as_nanos());
            self.state = since >= self.rise_delay.as_nanos();
        }
    }
}
