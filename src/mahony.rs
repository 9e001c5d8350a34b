//! Complementary orientation filter.
//!
//! Builds an error term from the cross product between measured and
//! predicted gravity (and, when the magnetometer is trusted, measured and
//! predicted reference field), feeds it back into the gyro through a
//! proportional and an optional integral gain, then integrates.

use nalgebra::Vector3;

use crate::attitude::{AttitudeFilter, Quaternion};
use crate::constants::{MAHONY_DEFAULT_KI, MAHONY_DEFAULT_KP};

#[derive(Debug, Clone)]
pub struct MahonyFilter {
    q: Quaternion,
    kp: f64,
    ki: f64,
    integral_fb: Vector3<f64>,
}

impl MahonyFilter {
    pub fn new() -> Self {
        Self {
            q: Quaternion::IDENTITY,
            kp: MAHONY_DEFAULT_KP,
            ki: MAHONY_DEFAULT_KI,
            integral_fb: Vector3::zeros(),
        }
    }

    /// Proportional and integral feedback gains. Setting `ki` to zero
    /// disables the integrator.
    pub fn set_gains(&mut self, kp: f64, ki: f64) {
        self.kp = kp;
        self.ki = ki;
    }
}

impl AttitudeFilter for MahonyFilter {
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

        let mut ex = 0.0;
        let mut ey = 0.0;
        let mut ez = 0.0;

        let a_norm = accel.norm();
        if a_norm > 0.001 {
            let ax = accel.x / a_norm;
            let ay = accel.y / a_norm;
            let az = accel.z / a_norm;

            // Estimated gravity direction from the quaternion
            let vx = 2.0 * (q1 * q3 - q0 * q2);
            let vy = 2.0 * (q0 * q1 + q2 * q3);
            let vz = q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3;

            // accel × estimated_gravity
            ex += ay * vz - az * vy;
            ey += az * vx - ax * vz;
            ez += ax * vy - ay * vx;
        }

        if use_mag {
            let m_norm = mag.norm();
            if m_norm > 0.001 {
                let mx = mag.x / m_norm;
                let my = mag.y / m_norm;
                let mz = mag.z / m_norm;

                // Reference direction of Earth's field (mag rotated to the
                // Earth frame, flattened into the horizontal/vertical plane)
                let hx = 2.0
                    * (mx * (0.5 - q2 * q2 - q3 * q3)
                        + my * (q1 * q2 - q0 * q3)
                        + mz * (q1 * q3 + q0 * q2));
                let hy = 2.0
                    * (mx * (q1 * q2 + q0 * q3)
                        + my * (0.5 - q1 * q1 - q3 * q3)
                        + mz * (q2 * q3 - q0 * q1));
                let bx = (hx * hx + hy * hy).sqrt();
                let bz = 2.0
                    * (mx * (q1 * q3 - q0 * q2)
                        + my * (q2 * q3 + q0 * q1)
                        + mz * (0.5 - q1 * q1 - q2 * q2));

                // Estimated field direction from the quaternion
                let wx = bx * (0.5 - q2 * q2 - q3 * q3) + bz * (q1 * q3 - q0 * q2);
                let wy = bx * (q1 * q2 - q0 * q3) + bz * (q0 * q1 + q2 * q3);
                let wz = bx * (q0 * q2 + q1 * q3) + bz * (0.5 - q1 * q1 - q2 * q2);

                // mag × estimated_mag
                ex += my * wz - mz * wy;
                ey += mz * wx - mx * wz;
                ez += mx * wy - my * wx;
            }
        }

        let mut gx = gyro.x;
        let mut gy = gyro.y;
        let mut gz = gyro.z;

        if self.ki > 0.0 {
            self.integral_fb.x += self.ki * ex * dt;
            self.integral_fb.y += self.ki * ey * dt;
            self.integral_fb.z += self.ki * ez * dt;
            gx += self.integral_fb.x;
            gy += self.integral_fb.y;
            gz += self.integral_fb.z;
        }

        gx += self.kp * ex;
        gy += self.kp * ey;
        gz += self.kp * ez;

        // Integrate rate of change of quaternion
        let q_dot0 = 0.5 * (-q1 * gx - q2 * gy - q3 * gz);
        let q_dot1 = 0.5 * (q0 * gx + q2 * gz - q3 * gy);
        let q_dot2 = 0.5 * (q0 * gy - q1 * gz + q3 * gx);
        let q_dot3 = 0.5 * (q0 * gz + q1 * gy - q2 * gx);

        self.q.w = q0 + q_dot0 * dt;
        self.q.x = q1 + q_dot1 * dt;
        self.q.y = q2 + q_dot2 * dt;
        self.q.z = q3 + q_dot3 * dt;
        self.q.normalize();
    }

    fn reset(&mut self) {
        self.q = Quaternion::IDENTITY;
        self.integral_fb = Vector3::zeros();
    }

    fn quaternion(&self) -> Quaternion {
        self.q
    }
}

impl Default for MahonyFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GRAVITY;

    #[test]
    fn test_flat_and_still_stays_level() {
        let mut f = MahonyFilter::new();
        for _ in 0..500 {
            f.update(
                Vector3::new(0.0, 0.0, GRAVITY),
                Vector3::zeros(),
                Vector3::zeros(),
                false,
                0.01,
            );
        }
        let q = f.quaternion();
        assert!(q.pitch().abs() < 1e-6);
        assert!(q.roll().abs() < 1e-6);
    }

    #[test]
    fn test_norm_preserved_over_long_run() {
        let mut f = MahonyFilter::new();
        for _ in 0..2000 {
            f.update(
                Vector3::new(0.2, 0.4, GRAVITY),
                Vector3::new(-0.02, 0.01, 0.04),
                Vector3::new(18.0, -3.0, -45.0),
                true,
                0.005,
            );
            assert!((f.quaternion().norm() - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_converges_toward_gravity_alignment() {
        let mut f = MahonyFilter::new();
        let accel = Vector3::new(-GRAVITY * 0.5, 0.0, GRAVITY * 0.866);
        for _ in 0..2000 {
            f.update(accel, Vector3::zeros(), Vector3::zeros(), false, 0.01);
        }
        let pitch_deg = f.quaternion().pitch().to_degrees();
        assert!((pitch_deg - 30.0).abs() < 2.0, "pitch = {pitch_deg}");
    }

    #[test]
    fn test_reset_clears_integrator() {
        let mut f = MahonyFilter::new();
        for _ in 0..100 {
            f.update(
                Vector3::new(1.0, 0.0, GRAVITY),
                Vector3::new(0.1, 0.0, 0.0),
                Vector3::zeros(),
                false,
                0.01,
            );
        }
        f.reset();
        let q = f.quaternion();
        assert_eq!((q.w, q.x, q.y, q.z), (1.0, 0.0, 0.0, 0.0));
        assert_eq!(f.integral_fb, Vector3::zeros());
    }
}
