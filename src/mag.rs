//! Magnetometer calibration: hard/soft iron, disturbance gate, true heading.

use nalgebra::{Matrix3, Vector3};

use crate::constants::{MAG_MAX_FIELD_UT, MAG_MIN_FIELD_UT, RAD_TO_DEG};

/// Hard-iron offset, soft-iron matrix, and declination.
///
/// A corrected reading whose magnitude falls outside the plausible Earth
/// field band [20, 70] µT is classified as disturbed and should not steer
/// the attitude filter.
#[derive(Debug, Clone)]
pub struct MagCalibration {
    hard_iron: Vector3<f64>,
    soft_iron: Matrix3<f64>,
    declination_deg: f64,
    is_disturbed: bool,
}

impl MagCalibration {
    pub fn new() -> Self {
        Self {
            hard_iron: Vector3::zeros(),
            soft_iron: Matrix3::identity(),
            declination_deg: 0.0,
            is_disturbed: false,
        }
    }

    /// Replace the calibration. `None` means zero offset / identity matrix.
    pub fn set_calibration(
        &mut self,
        hard_iron: Option<Vector3<f64>>,
        soft_iron: Option<Matrix3<f64>>,
    ) {
        self.hard_iron = hard_iron.unwrap_or_else(Vector3::zeros);
        self.soft_iron = soft_iron.unwrap_or_else(Matrix3::identity);
    }

    /// Magnetic declination at the firing position (deg, east positive).
    pub fn set_declination(&mut self, declination_deg: f64) {
        self.declination_deg = declination_deg;
    }

    /// Apply the calibration: `m' = S · (m − h)`.
    ///
    /// Returns the corrected vector and whether it is usable (not
    /// disturbed). The disturbance classification is also latched for
    /// [`Self::is_disturbed`].
    pub fn apply(&mut self, m: Vector3<f64>) -> (Vector3<f64>, bool) {
        let corrected = self.soft_iron * (m - self.hard_iron);

        let field_mag = corrected.norm();
        self.is_disturbed = !(MAG_MIN_FIELD_UT..=MAG_MAX_FIELD_UT).contains(&field_mag);

        (corrected, !self.is_disturbed)
    }

    /// True if the last applied reading was outside the Earth-field band.
    pub fn is_disturbed(&self) -> bool {
        self.is_disturbed
    }

    /// Convert a yaw angle to a true heading: degrees, declination added,
    /// wrapped to [0, 360).
    pub fn compute_heading(&self, yaw_rad: f64) -> f64 {
        let mut heading = yaw_rad * RAD_TO_DEG + self.declination_deg;
        while heading < 0.0 {
            heading += 360.0;
        }
        while heading >= 360.0 {
            heading -= 360.0;
        }
        heading
    }
}

impl Default for MagCalibration {
    fn default() -> Self {
        Self::new()
    }
}
