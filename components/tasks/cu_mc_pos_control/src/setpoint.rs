use serde::{Deserialize, Serialize};

/// Three NED axes, each either known/controlled or not.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axes3 {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
}

impl Axes3 {
    pub const NONE: Self = Self {
        x: None,
        y: None,
        z: None,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self::finite(Some(x), Some(y), Some(z))
    }

    /// Non finite values are treated as unknown.
    pub fn finite(x: Option<f32>, y: Option<f32>, z: Option<f32>) -> Self {
        let keep = |v: Option<f32>| v.filter(|v| v.is_finite());
        Self {
            x: keep(x),
            y: keep(y),
            z: keep(z),
        }
    }

    /// x and y only exist as a pair.
    pub fn xy(&self) -> Option<(f32, f32)> {
        self.x.zip(self.y)
    }

    pub fn set_xy(&mut self, xy: Option<(f32, f32)>) {
        let (x, y) = xy.unzip();
        self.x = x;
        self.y = y;
    }

    pub fn as_array(&self) -> [Option<f32>; 3] {
        [self.x, self.y, self.z]
    }
}

/// What the active flight task wants the vehicle to track this cycle.
///
/// `None` marks an axis as uncontrolled: the position controller must not close a loop on it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Setpoint {
    pub position: Axes3,
    pub velocity: Axes3,
    pub thrust: Axes3,
    pub yaw: Option<f32>,
    pub yawspeed: Option<f32>,
}

impl Setpoint {
    pub fn uncontrolled() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GearIntent {
    #[default]
    Keep,
    Up,
    Down,
}

/// Limits the active flight task puts on the position controller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Maximum climb speed (m/s, positive).
    pub speed_up: Option<f32>,
    /// Maximum descent speed (m/s, positive).
    pub speed_down: Option<f32>,
    pub min_distance_to_ground: Option<f32>,
    pub landing_gear: GearIntent,
}
