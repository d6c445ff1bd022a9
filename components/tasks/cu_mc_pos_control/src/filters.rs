use std::f32::consts::PI;

/// Finite difference of the input, smoothed by a first order low pass.
#[derive(Debug, Clone, Copy)]
pub struct DerivativeFilter {
    cutoff_hz: f32,
    previous: Option<f32>,
    output: f32,
}

impl DerivativeFilter {
    pub fn new(cutoff_hz: f32) -> Self {
        Self {
            cutoff_hz,
            previous: None,
            output: 0.0,
        }
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.cutoff_hz = cutoff_hz;
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    /// The first sample only initializes the filter and yields 0.
    pub fn update(&mut self, input: f32, dt: f32) -> f32 {
        let Some(previous) = self.previous else {
            self.previous = Some(input);
            self.output = 0.0;
            return self.output;
        };
        if dt <= 0.0 || !dt.is_finite() {
            return self.output;
        }
        self.previous = Some(input);

        let derivative = (input - previous) / dt;
        let alpha = if self.cutoff_hz > 0.0 {
            let rc = 1.0 / (2.0 * PI * self.cutoff_hz);
            dt / (rc + dt)
        } else {
            1.0
        };
        self.output += alpha * (derivative - self.output);
        self.output
    }
}
