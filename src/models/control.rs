use serde::{Deserialize, Serialize};

/// Joystick displacement from the pad centre, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StickPosition {
    pub dx: f64,
    pub dy: f64,
}

impl StickPosition {
    pub fn centre() -> Self {
        Self::default()
    }

    /// Keeps the stick inside a circle of radius `max_distance`,
    /// preserving direction.
    pub fn clamp(dx: f64, dy: f64, max_distance: f64) -> Self {
        let max_distance = max_distance.max(0.0);
        let distance = dx.hypot(dy);
        if distance > max_distance {
            Self {
                dx: dx / distance * max_distance,
                dy: dy / distance * max_distance,
            }
        } else {
            Self { dx, dy }
        }
    }

    pub fn distance(&self) -> f64 {
        self.dx.hypot(self.dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Throttle(u8);

impl Throttle {
    pub fn new(percent: u8) -> Self {
        Self(percent.min(100))
    }

}

impl std::fmt::Display for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}
