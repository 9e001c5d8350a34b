//! Gradient-descent orientation filter.
//!
//! Integrates the gyro-derived quaternion rate, then applies a normalized
//! gradient correction step derived from the accelerometer (6-axis) or
//! accelerometer + magnetometer (9-axis), scaled by the gain β.

use nalgebra::Vector3;

use crate::attitude::{AttitudeFilter, Quaternion};
use crate::constants::MADGWICK_DEFAULT_BETA;

#[derive(Debug, Clone)]
pub struct MadgwickFilter {
    q: Quaternion,
    beta: f64,
}

impl MadgwickFilter {
    pub fn new() -> Self {
        Self {
            q: Quaternion::IDENTITY,
            beta: MADGWICK_DEFAULT_BETA,
        }
    }

    /// Gradient step gain. Larger β trusts the vector observations more and
    /// the gyro less.
    pub fn set_beta(&mut self, beta: f64) {
        self.beta = beta;
    }
}

impl AttitudeFilter for MadgwickFilter {
    fn update(
        &mut self,
        accel: Vector3<f64>,
        gyro: Vector3<f64>,
        mag: Vector3<f64>,
        use_mag: bool,
        dt: f64,
    ) {
        let q0 = self.q.w;
        let q1 = self.q.x;
        let q2 = self.q.y;
        let q3 = self.q.z;
        let (gx, gy, gz) = (gyro.x, gyro.y, gyro.z);

        // Rate of change of quaternion from gyroscope
        let mut q_dot0 = 0.5 * (-q1 * gx - q2 * gy - q3 * gz);
        let mut q_dot1 = 0.5 * (q0 * gx + q2 * gz - q3 * gy);
        let mut q_dot2 = 0.5 * (q0 * gy - q1 * gz + q3 * gx);
        let mut q_dot3 = 0.5 * (q0 * gz + q1 * gy - q2 * gx);

        let a_norm = accel.norm();
        if a_norm > 0.001 {
            let ax = accel.x / a_norm;
            let ay = accel.y / a_norm;
            let az = accel.z / a_norm;

            let m_norm = mag.norm();
            let (s0, s1, s2, s3) = if use_mag && m_norm > 0.001 {
                let mx = mag.x / m_norm;
                let my = mag.y / m_norm;
                let mz = mag.z / m_norm;

                let _2q0 = 2.0 * q0;
                let _2q1 = 2.0 * q1;
                let _2q2 = 2.0 * q2;
                let _2q3 = 2.0 * q3;
                let q0q0 = q0 * q0;
                let q0q1 = q0 * q1;
                let q0q2 = q0 * q2;
                let q0q3 = q0 * q3;
                let q1q1 = q1 * q1;
                let q1q2 = q1 * q2;
                let q1q3 = q1 * q3;
                let q2q2 = q2 * q2;
                let q2q3 = q2 * q3;
                let q3q3 = q3 * q3;

                // Reference direction of Earth's magnetic field
                let hx = mx * (q0q0 + q1q1 - q2q2 - q3q3)
                    + 2.0 * my * (q1q2 - q0q3)
                    + 2.0 * mz * (q1q3 + q0q2);
                let hy = 2.0 * mx * (q1q2 + q0q3)
                    + my * (q0q0 - q1q1 + q2q2 - q3q3)
                    + 2.0 * mz * (q2q3 - q0q1);
                let _2bx = (hx * hx + hy * hy).sqrt();
                let _2bz = 2.0 * mx * (q1q3 - q0q2)
                    + 2.0 * my * (q2q3 + q0q1)
                    + mz * (q0q0 - q1q1 - q2q2 + q3q3);

                // 9-axis gradient descent corrective step
                let s0 = -_2q2 * (2.0 * q1q3 - _2q0 * q2 - ax)
                    + _2q1 * (2.0 * q0q1 + _2q2 * q3 - ay)
                    - _2bz
                        * q2
                        * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
                    + (-_2bx * q3 + _2bz * q1)
                        * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
                    + _2bx * q2 * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);
                let s1 = _2q3 * (2.0 * q1q3 - _2q0 * q2 - ax)
                    + _2q0 * (2.0 * q0q1 + _2q2 * q3 - ay)
                    - 4.0 * q1 * (1.0 - 2.0 * q1q1 - 2.0 * q2q2 - az)
                    + _2bz * q3 * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
                    + (_2bx * q2 + _2bz * q0)
                        * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
                    + (_2bx * q3 - 4.0 * _2bz * q1)
                        * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);
                let s2 = -_2q0 * (2.0 * q1q3 - _2q0 * q2 - ax)
                    + _2q3 * (2.0 * q0q1 + _2q2 * q3 - ay)
                    - 4.0 * q2 * (1.0 - 2.0 * q1q1 - 2.0 * q2q2 - az)
                    + (-4.0 * _2bx * q2 - _2bz * q0)
                        * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
                    + (_2bx * q1 + _2bz * q3)
                        * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
                    + (_2bx * q0 - 4.0 * _2bz * q2)
                        * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);
                let s3 = _2q1 * (2.0 * q1q3 - _2q0 * q2 - ax)
                    + _2q2 * (2.0 * q0q1 + _2q2 * q3 - ay)
                    + (-4.0 * _2bx * q3 + _2bz * q1)
                        * (_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - mx)
                    + (-_2bx * q0 + _2bz * q2)
                        * (_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - my)
                    + _2bx * q1 * (_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - mz);

                (s0, s1, s2, s3)
            } else {
                // 6-axis gradient descent (no magnetometer)
                let _2q0 = 2.0 * q0;
                let _2q1 = 2.0 * q1;
                let _2q2 = 2.0 * q2;
                let _2q3 = 2.0 * q3;
                let _4q0 = 4.0 * q0;
                let _4q1 = 4.0 * q1;
                let _4q2 = 4.0 * q2;
                let _8q1 = 8.0 * q1;
                let _8q2 = 8.0 * q2;
                let q0q0 = q0 * q0;
                let q1q1 = q1 * q1;
                let q2q2 = q2 * q2;
                let q3q3 = q3 * q3;

                let s0 = _4q0 * q2q2 + _2q2 * ax + _4q0 * q1q1 - _2q1 * ay;
                let s1 = _4q1 * q3q3 - _2q3 * ax + 4.0 * q0q0 * q1 - _2q0 * ay - _4q1
                    + _8q1 * q1q1
                    + _8q1 * q2q2
                    + _4q1 * az;
                let s2 = 4.0 * q0q0 * q2 + _2q0 * ax + _4q2 * q3q3 - _2q3 * ay - _4q2
                    + _8q2 * q1q1
                    + _8q2 * q2q2
                    + _4q2 * az;
                let s3 = 4.0 * q1q1 * q3 - _2q1 * ax + 4.0 * q2q2 * q3 - _2q2 * ay;

                (s0, s1, s2, s3)
            };

            // Normalize the gradient step and apply feedback
            let s_norm = (s0 * s0 + s1 * s1 + s2 * s2 + s3 * s3).sqrt();
            let (s0, s1, s2, s3) = if s_norm > 0.001 {
                let inv = 1.0 / s_norm;
                (s0 * inv, s1 * inv, s2 * inv, s3 * inv)
            } else {
                (s0, s1, s2, s3)
            };

            q_dot0 -= self.beta * s0;
            q_dot1 -= self.beta * s1;
            q_dot2 -= self.beta * s2;
            q_dot3 -= self.beta * s3;
        }

        // Integrate and renormalize
        self.q.w = q0 + q_dot0 * dt;
        self.q.x = q1 + q_dot1 * dt;
        self.q.y = q2 + q_dot2 * dt;
        self.q.z = q3 + q_dot3 * dt;
        self.q.normalize();
    }

    fn reset(&mut self) {
        self.q = Quaternion::IDENTITY;
    }

    fn quaternion(&self) -> Quaternion {
        self.q
    }
}

impl Default for MadgwickFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GRAVITY;

    #[test]
    fn test_identity_without_input() {
        let mut f = MadgwickFilter::new();
        f.update(Vector3::zeros(), Vector3::zeros(), Vector3::zeros(), false, 0.01);
        let q = f.quaternion();
        assert!((q.w - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_norm_preserved_over_long_run() {
        let mut f = MadgwickFilter::new();
        for _ in 0..2000 {
            f.update(
                Vector3::new(0.3, -0.1, GRAVITY),
                Vector3::new(0.05, 0.02, -0.03),
                Vector3::new(22.0, 4.0, -43.0),
                true,
                0.005,
            );
            assert!((f.quaternion().norm() - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_converges_toward_gravity_alignment() {
        let mut f = MadgwickFilter::new();
        // Device pitched: gravity appears partly on x
        let accel = Vector3::new(-GRAVITY * 0.5, 0.0, GRAVITY * 0.866);
        for _ in 0..3000 {
            f.update(accel, Vector3::zeros(), Vector3::zeros(), false, 0.01);
        }
        // Roughly 30° nose-up
        let pitch_deg = f.quaternion().pitch().to_degrees();
        assert!((pitch_deg - 30.0).abs() < 3.0, "pitch = {pitch_deg}");
    }

    #[test]
    fn test_reset_restores_identity() {
        let mut f = MadgwickFilter::new();
        for _ in 0..100 {
            f.update(
                Vector3::new(2.0, 1.0, GRAVITY),
                Vector3::new(0.5, 0.0, 0.0),
                Vector3::zeros(),
                false,
                0.01,
            );
        }
        f.reset();
        let q = f.quaternion();
        assert_eq!((q.w, q.x, q.y, q.z), (1.0, 0.0, 0.0, 0.0));
    }
}
