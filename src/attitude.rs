//! Attitude manager: bias removal, filter selection, static detection.
//!
//! Owns one instance of each orientation filter and dispatches to the
//! selected one. A 64-sample ring buffer of accel magnitudes drives
//! static/dynamic classification; the engine treats the attitude as stable
//! only once the window is full and the variance is below threshold.

use nalgebra::Vector3;

use crate::constants::{AHRS_STATIC_THRESHOLD, AHRS_STATIC_WINDOW};
use crate::madgwick::MadgwickFilter;
use crate::mahony::MahonyFilter;
use crate::types::AttitudeAlgorithm;

// ---------------------------------------------------------------------------
// Quaternion
// ---------------------------------------------------------------------------

/// Unit quaternion, world-from-body, scalar-first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub const IDENTITY: Self = Self {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Scale back to unit norm. A zero quaternion is left untouched.
    pub fn normalize(&mut self) {
        let norm = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if norm > 0.0 {
            let inv = 1.0 / norm;
            self.w *= inv;
            self.x *= inv;
            self.y *= inv;
            self.z *= inv;
        }
    }

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Pitch angle (rad, nose up positive). The asin input is clamped to
    /// [-1, 1].
    pub fn pitch(&self) -> f64 {
        let sinp = (2.0 * (self.w * self.y - self.z * self.x)).clamp(-1.0, 1.0);
        sinp.asin()
    }

    /// Roll angle (rad, right side down positive).
    pub fn roll(&self) -> f64 {
        let sinr_cosp = 2.0 * (self.w * self.x + self.y * self.z);
        let cosr_cosp = 1.0 - 2.0 * (self.x * self.x + self.y * self.y);
        sinr_cosp.atan2(cosr_cosp)
    }

    /// Yaw angle (rad, clockwise from north positive).
    pub fn yaw(&self) -> f64 {
        let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        siny_cosp.atan2(cosy_cosp)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ---------------------------------------------------------------------------
// Filter contract
// ---------------------------------------------------------------------------

/// Capability set shared by the orientation filters.
pub trait AttitudeFilter {
    /// Advance the filter with bias-corrected IMU data. `mag` is the
    /// calibrated field and only steers the filter when `use_mag` is set.
    fn update(
        &mut self,
        accel: Vector3<f64>,
        gyro: Vector3<f64>,
        mag: Vector3<f64>,
        use_mag: bool,
        dt: f64,
    );

    /// Reset to the identity orientation.
    fn reset(&mut self);

    /// Latest orientation estimate.
    fn quaternion(&self) -> Quaternion;
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Bias correction, filter selection, and the static-motion window.
///
/// Both filters live inline; switching algorithms costs nothing and needs
/// no heap.
#[derive(Debug, Clone)]
pub struct AttitudeManager {
    madgwick: MadgwickFilter,
    mahony: MahonyFilter,
    algorithm: AttitudeAlgorithm,

    accel_bias: Vector3<f64>,
    gyro_bias: Vector3<f64>,

    accel_mag_buf: [f64; AHRS_STATIC_WINDOW],
    buf_index: usize,
    sample_count: usize,
    is_static: bool,
}

impl AttitudeManager {
    pub fn new() -> Self {
        Self {
            madgwick: MadgwickFilter::new(),
            mahony: MahonyFilter::new(),
            algorithm: AttitudeAlgorithm::Madgwick,
            accel_bias: Vector3::zeros(),
            gyro_bias: Vector3::zeros(),
            accel_mag_buf: [0.0; AHRS_STATIC_WINDOW],
            buf_index: 0,
            sample_count: 0,
            is_static: false,
        }
    }

    /// Select the active filter. Both filters keep their own state; a
    /// hot-swap picks up from the newly selected filter's estimate.
    pub fn set_algorithm(&mut self, algorithm: AttitudeAlgorithm) {
        self.algorithm = algorithm;
    }

    pub fn set_accel_bias(&mut self, bias: Vector3<f64>) {
        self.accel_bias = bias;
    }

    pub fn set_gyro_bias(&mut self, bias: Vector3<f64>) {
        self.gyro_bias = bias;
    }

    /// Overwrite the gyro bias with a raw reading taken while the device is
    /// held still.
    pub fn capture_gyro_bias(&mut self, raw_gyro: Vector3<f64>) {
        self.gyro_bias = raw_gyro;
    }

    /// Feed one IMU sample: subtract biases, run the active filter, and
    /// push the accel magnitude into the static-detection window.
    pub fn update(
        &mut self,
        accel: Vector3<f64>,
        gyro: Vector3<f64>,
        mag: Vector3<f64>,
        use_mag: bool,
        dt: f64,
    ) {
        let accel = accel - self.accel_bias;
        let gyro = gyro - self.gyro_bias;

        match self.algorithm {
            AttitudeAlgorithm::Madgwick => self.madgwick.update(accel, gyro, mag, use_mag, dt),
            AttitudeAlgorithm::Mahony => self.mahony.update(accel, gyro, mag, use_mag, dt),
        }

        self.update_static_detection(accel);
    }

    pub fn quaternion(&self) -> Quaternion {
        match self.algorithm {
            AttitudeAlgorithm::Madgwick => self.madgwick.quaternion(),
            AttitudeAlgorithm::Mahony => self.mahony.quaternion(),
        }
    }

    pub fn pitch(&self) -> f64 {
        self.quaternion().pitch()
    }

    pub fn roll(&self) -> f64 {
        self.quaternion().roll()
    }

    pub fn yaw(&self) -> f64 {
        self.quaternion().yaw()
    }

    /// True once the window is full of low-variance samples.
    pub fn is_stable(&self) -> bool {
        self.sample_count >= AHRS_STATIC_WINDOW && self.is_static
    }

    fn update_static_detection(&mut self, accel: Vector3<f64>) {
        self.accel_mag_buf[self.buf_index] = accel.norm();
        self.buf_index = (self.buf_index + 1) % AHRS_STATIC_WINDOW;

        if self.sample_count < AHRS_STATIC_WINDOW {
            self.sample_count += 1;
            self.is_static = false;
            return;
        }

        // Two-pass mean/variance over the full window
        let mean: f64 =
            self.accel_mag_buf.iter().sum::<f64>() / AHRS_STATIC_WINDOW as f64;
        let var: f64 = self
            .accel_mag_buf
            .iter()
            .map(|m| {
                let d = m - mean;
                d * d
            })
            .sum::<f64>()
            / AHRS_STATIC_WINDOW as f64;

        self.is_static = var < AHRS_STATIC_THRESHOLD;
    }
}

impl Default for AttitudeManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GRAVITY;

    fn static_frame() -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        (
            Vector3::new(0.0, 0.0, GRAVITY),
            Vector3::zeros(),
            Vector3::zeros(),
        )
    }

    #[test]
    fn test_not_stable_until_window_full() {
        let mut mgr = AttitudeManager::new();
        let (a, g, m) = static_frame();
        for _ in 0..AHRS_STATIC_WINDOW - 1 {
            mgr.update(a, g, m, false, 0.01);
            assert!(!mgr.is_stable());
        }
        // The 64th sample fills the window but the count gate still trips
        // on this call; the 65th settles it.
        mgr.update(a, g, m, false, 0.01);
        mgr.update(a, g, m, false, 0.01);
        assert!(mgr.is_stable());
    }

    #[test]
    fn test_burst_breaks_stability() {
        let mut mgr = AttitudeManager::new();
        let (a, g, m) = static_frame();
        for _ in 0..AHRS_STATIC_WINDOW + 2 {
            mgr.update(a, g, m, false, 0.01);
        }
        assert!(mgr.is_stable());

        // 5 m/s² bursts blow the variance well past 0.05
        for i in 0..AHRS_STATIC_WINDOW {
            let burst = if i % 2 == 0 { 5.0 } else { 0.0 };
            mgr.update(Vector3::new(burst, 0.0, GRAVITY), g, m, false, 0.01);
        }
        assert!(!mgr.is_stable());
    }

    #[test]
    fn test_quaternion_stays_normalized() {
        let mut mgr = AttitudeManager::new();
        for i in 0..500 {
            let accel = Vector3::new(0.1 * (i as f64 * 0.05).sin(), 0.0, GRAVITY);
            let gyro = Vector3::new(0.01, -0.02, 0.005);
            mgr.update(accel, gyro, Vector3::new(20.0, 5.0, -40.0), true, 0.01);
            assert!((mgr.quaternion().norm() - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_gyro_bias_capture_nulls_rotation() {
        let mut mgr = AttitudeManager::new();
        let drift = Vector3::new(0.02, -0.01, 0.03);
        mgr.capture_gyro_bias(drift);
        let (a, _, m) = static_frame();
        for _ in 0..200 {
            mgr.update(a, drift, m, false, 0.01);
        }
        // Bias-corrected gyro is zero, so yaw should not wander
        assert!(mgr.yaw().abs() < 0.05);
    }

    #[test]
    fn test_algorithm_hot_swap() {
        let mut mgr = AttitudeManager::new();
        let (a, g, m) = static_frame();
        for _ in 0..10 {
            mgr.update(a, g, m, false, 0.01);
        }
        mgr.set_algorithm(AttitudeAlgorithm::Mahony);
        for _ in 0..10 {
            mgr.update(a, g, m, false, 0.01);
        }
        assert!((mgr.quaternion().norm() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_euler_asin_clamped() {
        // A quaternion slightly off unit keeps asin in range
        let q = Quaternion {
            w: 0.7072,
            x: 0.0,
            y: 0.7072,
            z: 0.0,
        };
        assert!(q.pitch().is_finite());
    }
}
