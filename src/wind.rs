//! Manual wind decomposition into bore-frame components.

use crate::constants::DEG_TO_RAD;

/// Latched manual wind: speed plus the true heading the wind blows *from*.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindCorrection {
    speed_ms: f64,
    heading_deg: f64,
    is_set: bool,
}

impl WindCorrection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch a wind observation. Clears the default-wind diagnostic.
    pub fn set_wind(&mut self, speed_ms: f64, heading_deg: f64) {
        self.speed_ms = speed_ms;
        self.heading_deg = heading_deg;
        self.is_set = true;
    }

    /// Whether a wind has ever been supplied.
    pub fn is_set(&self) -> bool {
        self.is_set
    }

    /// Decompose into `(headwind, crosswind)` relative to the firing
    /// azimuth (deg true).
    ///
    /// Headwind is positive blowing into the shooter's face; crosswind is
    /// positive blowing right-to-left. Unset wind yields `(0, 0)`.
    pub fn decompose(&self, azimuth_deg: f64) -> (f64, f64) {
        if !self.is_set || self.speed_ms < 0.001 {
            return (0.0, 0.0);
        }

        let angle_rad = (self.heading_deg - azimuth_deg) * DEG_TO_RAD;
        (
            self.speed_ms * angle_rad.cos(),
            self.speed_ms * angle_rad.sin(),
        )
    }
}
