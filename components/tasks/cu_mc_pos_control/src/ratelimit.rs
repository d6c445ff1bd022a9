use cu29::prelude::*;

const WARN_PERIOD_MS: u64 = 200;

/// Lets a message through at most once per period.
#[derive(Debug, Clone, Copy)]
pub struct LogRateLimiter {
    last: OptionCuTime,
    period: CuDuration,
}

impl Default for LogRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl LogRateLimiter {
    pub fn new() -> Self {
        Self::with_period(std::time::Duration::from_millis(WARN_PERIOD_MS).into())
    }

    pub fn with_period(period: CuDuration) -> Self {
        Self {
            last: OptionCuTime::none(),
            period,
        }
    }

    pub fn should_log(&mut self, now: CuTime) -> bool {
        if !self.last.is_none() {
            let elapsed = now.as_nanos().saturating_sub(self.last.unwrap().as_nanos());
            if elapsed <= self.period.as_nanos() {
                return false;
            }
        }
        self.last = now.into();
        true
    }
}

/// `warning!` gated by a [`LogRateLimiter`], evaluates to true when the message went through.
#[macro_export]
macro_rules! warning_rl {
    ($limiter:expr, $now:expr, $($arg:tt)+) => {{
        if $limiter.should_log($now) {
            warning!($($arg)+);
            true
        } else {
            false
        }
    }};
}
