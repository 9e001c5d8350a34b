//! Point-mass trajectory integrator.
//!
//! Adaptive fourth-order Runge-Kutta over position and velocity, with a
//! per-meter trajectory table and a binary-search zero-angle solver.
//!
//! Coordinate frame:
//! - X = downrange (horizontal)
//! - Y = vertical (up positive)
//! - Z = lateral (right positive)
//!
//! The trajectory table is a fixed-capacity scratch area owned by the
//! solver, allocated once at construction and overwritten in place on every
//! full integrate call.

use log::debug;

use crate::constants::{
    DEG_TO_RAD, DT_MAX, DT_MIN, GRAVITY, MAX_RANGE_M, MAX_SOLVER_ITERATIONS, MAX_STEP_DISTANCE_M,
    MIN_VELOCITY, OMEGA_EARTH, RAD_TO_MOA, TRAJ_TABLE_SIZE, ZERO_MAX_ITERATIONS, ZERO_TOLERANCE_M,
};
use crate::drag;
use crate::types::DragFamily;

/// Per-meter trajectory record.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct TrajectoryPoint {
    /// Vertical drop from the bore line (m, negative = below).
    pub drop_m: f64,
    /// Lateral deflection (m, positive = right).
    pub windage_m: f64,
    /// Velocity at this range (m/s).
    pub velocity_ms: f64,
    /// Time of flight to this range (s).
    pub tof_s: f64,
    /// Kinetic energy at this range (J).
    pub energy_j: f64,
}

/// Everything the solver needs for one trajectory solution.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolverParams {
    /// Ballistic coefficient, already atmosphere-corrected.
    pub bc: f64,
    pub drag_family: DragFamily,
    pub muzzle_velocity_ms: f64,
    /// Projectile mass (kg, converted from grains by the caller).
    pub bullet_mass_kg: f64,
    /// Sight height above the bore axis (m).
    pub sight_height_m: f64,

    pub air_density: f64,
    pub speed_of_sound: f64,
    /// 1.0 = legacy baseline; < 1.0 reduces modeled retardation.
    pub drag_reference_scale: f64,

    /// Launch angle above horizontal (rad); set by the zero solver or the
    /// orchestrator.
    pub launch_angle_rad: f64,

    pub target_range_m: f64,

    /// Wind components, already decomposed into the bore frame.
    pub headwind_ms: f64,
    pub crosswind_ms: f64,

    /// Shooter latitude (rad); only read when `coriolis_enabled`.
    pub coriolis_lat_rad: f64,
    /// Firing azimuth (rad); only read when `coriolis_enabled`.
    pub azimuth_rad: f64,
    pub coriolis_enabled: bool,

    /// Signed twist rate (inches per turn, positive = right-hand).
    pub twist_rate_inches: f64,
    pub spin_drift_enabled: bool,
}

/// Result of a single full trajectory integration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolverResult {
    pub valid: bool,
    pub drop_at_target_m: f64,
    pub windage_at_target_m: f64,
    pub tof_s: f64,
    pub velocity_at_target_ms: f64,
    pub energy_at_target_j: f64,
    pub horizontal_range_m: f64,

    /// Correction components in MOA.
    pub coriolis_elev_moa: f64,
    pub coriolis_wind_moa: f64,
    pub spin_drift_moa: f64,
}

/// The integrator and its trajectory table.
pub struct BallisticSolver {
    table: Box<[TrajectoryPoint; TRAJ_TABLE_SIZE]>,
    max_valid_range: usize,
}

impl BallisticSolver {
    /// One heap allocation; nothing else allocates after this.
    pub fn new() -> Self {
        Self {
            table: Box::new([TrajectoryPoint::default(); TRAJ_TABLE_SIZE]),
            max_valid_range: 0,
        }
    }

    /// Clear the table and its valid prefix.
    pub fn reset(&mut self) {
        self.table.fill(TrajectoryPoint::default());
        self.max_valid_range = 0;
    }

    /// Solve the launch angle that zeroes the sight at `zero_range_m`.
    ///
    /// Binary search over [-5°, +5°] for the angle where the drop at the
    /// zero range equals `-sight_height` (the bore sits below the sight
    /// line by the sight height). When the trajectory fails to reach the
    /// zero range the lower bracket is raised. Returns `None` when the
    /// search does not converge.
    pub fn solve_zero_angle(&mut self, mut params: SolverParams, zero_range_m: f64) -> Option<f64> {
        if !(1.0..=MAX_RANGE_M).contains(&zero_range_m) {
            return None;
        }

        let mut lo = -5.0 * DEG_TO_RAD;
        let mut hi = 5.0 * DEG_TO_RAD;

        let target_drop = -params.sight_height_m;

        let mut best_angle = 0.0;
        let mut solved = false;

        for _ in 0..ZERO_MAX_ITERATIONS {
            let mid = (lo + hi) * 0.5;
            params.launch_angle_rad = mid;

            let drop = match self.integrate_to_range(&params, zero_range_m, false) {
                Some(d) => d,
                None => {
                    // Didn't reach: the trajectory decayed early. More angle.
                    lo = mid;
                    continue;
                }
            };

            // Hit too low → need more launch angle
            if drop > target_drop {
                hi = mid;
            } else {
                lo = mid;
            }

            best_angle = mid;

            if (drop - target_drop).abs() < ZERO_TOLERANCE_M {
                solved = true;
                break;
            }
        }

        if !solved {
            // The bracket may have tightened onto the answer without the
            // in-loop check firing
            params.launch_angle_rad = best_angle;
            if let Some(drop) = self.integrate_to_range(&params, zero_range_m, false) {
                if (drop - target_drop).abs() < ZERO_TOLERANCE_M {
                    solved = true;
                }
            }
        }

        if solved {
            Some(best_angle)
        } else {
            debug!("zero angle search failed to converge at {zero_range_m} m");
            None
        }
    }

    /// Integrate a full trajectory, refilling the table, and report the
    /// state at the target range. `valid` is false when the range is out of
    /// bounds or the projectile decays before reaching it.
    pub fn integrate(&mut self, params: &SolverParams) -> SolverResult {
        let mut result = SolverResult::default();

        if !(1.0..=MAX_RANGE_M).contains(&params.target_range_m) {
            return result;
        }

        if self.integrate_to_range(params, params.target_range_m, true).is_none() {
            return result;
        }

        let target_idx = params.target_range_m as usize;
        if target_idx >= TRAJ_TABLE_SIZE {
            return result;
        }

        let tp = self.table[target_idx];

        result.valid = true;
        result.drop_at_target_m = tp.drop_m;
        result.windage_at_target_m = tp.windage_m;
        result.tof_s = tp.tof_s;
        result.velocity_at_target_ms = tp.velocity_ms;
        result.energy_at_target_j = tp.energy_j;
        result.horizontal_range_m = params.target_range_m * params.launch_angle_rad.cos();

        // Spin drift: Litz approximation, drift ∝ TOF^1.83 with the
        // gyroscopic stability factor held at an average 1.5. Sign follows
        // the twist direction (right-hand twist drifts right).
        result.spin_drift_moa = 0.0;
        if params.spin_drift_enabled && params.twist_rate_inches.abs() > 0.1 {
            let sg = 1.5;
            let mut drift_m = 0.0254 * 1.25 * (sg + 1.2) * tp.tof_s.powf(1.83);
            if params.twist_rate_inches < 0.0 {
                drift_m = -drift_m;
            }
            let range = params.target_range_m;
            if range > 0.0 {
                result.spin_drift_moa = (drift_m / range) * RAD_TO_MOA;
            }
        }

        // Coriolis (horizontal) and Eötvös (vertical) deflections from
        // Earth rotation, small-arms approximation over the full flight
        result.coriolis_elev_moa = 0.0;
        result.coriolis_wind_moa = 0.0;
        if params.coriolis_enabled {
            let lat = params.coriolis_lat_rad;
            let azi = params.azimuth_rad;
            let tof = tp.tof_s;
            let range = params.target_range_m;

            let coriolis_hz = OMEGA_EARTH * range * tof * lat.sin();
            let coriolis_vt = OMEGA_EARTH * range * tof * lat.cos() * azi.sin();

            if range > 0.0 {
                result.coriolis_wind_moa = (coriolis_hz / range) * RAD_TO_MOA;
                result.coriolis_elev_moa = (coriolis_vt / range) * RAD_TO_MOA;
            }
        }

        result
    }

    /// Trajectory point at an integer range, if inside the valid prefix of
    /// the last full integration.
    pub fn point_at(&self, range_m: usize) -> Option<&TrajectoryPoint> {
        if range_m > self.max_valid_range || range_m >= TRAJ_TABLE_SIZE {
            return None;
        }
        Some(&self.table[range_m])
    }

    /// Length of the table's valid prefix (meters).
    pub fn max_valid_range(&self) -> usize {
        self.max_valid_range
    }

    /// RK4 integration out to `range_m`. Returns the drop at that range, or
    /// `None` if the projectile decayed or the iteration cap was hit first.
    fn integrate_to_range(
        &mut self,
        params: &SolverParams,
        range_m: f64,
        fill_table: bool,
    ) -> Option<f64> {
        let mut vx = params.muzzle_velocity_ms * params.launch_angle_rad.cos();
        let mut vy = params.muzzle_velocity_ms * params.launch_angle_rad.sin();
        let mut vz = 0.0f64;

        let mut x = 0.0f64;
        let mut y = 0.0f64;
        let mut z = 0.0f64;
        let mut t = 0.0f64;

        let mut last_range_index = 0usize;
        if fill_table {
            self.table[0] = TrajectoryPoint {
                drop_m: 0.0,
                windage_m: 0.0,
                velocity_ms: params.muzzle_velocity_ms,
                tof_s: 0.0,
                energy_j: 0.5
                    * params.bullet_mass_kg
                    * params.muzzle_velocity_ms
                    * params.muzzle_velocity_ms,
            };
        }

        let accel = |vxn: f64, vyn: f64, vzn: f64| -> (f64, f64, f64) {
            let vx_rel = vxn + params.headwind_ms;
            let vz_rel = vzn - params.crosswind_ms;
            let v_rel = (vx_rel * vx_rel + vyn * vyn + vz_rel * vz_rel).sqrt();

            if v_rel < 1.0 {
                return (0.0, -GRAVITY, 0.0);
            }

            let mut decel = drag::deceleration(
                v_rel,
                params.speed_of_sound,
                params.bc,
                params.drag_family,
                params.air_density,
            );
            let mut drag_scale = params.drag_reference_scale;
            if !drag_scale.is_finite() || drag_scale <= 0.0 {
                drag_scale = 1.0;
            }
            decel *= drag_scale.clamp(0.2, 2.0);

            (
                -decel * (vx_rel / v_rel),
                -decel * (vyn / v_rel) - GRAVITY,
                -decel * (vz_rel / v_rel),
            )
        };

        let mut iteration: u32 = 0;
        while x < range_m && iteration < MAX_SOLVER_ITERATIONS {
            iteration += 1;

            let v = (vx * vx + vy * vy + vz * vz).sqrt();
            if v < MIN_VELOCITY {
                break;
            }

            // Adaptive timestep: smallest in the transonic band, otherwise
            // scaled so each step covers roughly constant ground
            let mach = v / params.speed_of_sound;
            let mut dt = if (0.9..=1.2).contains(&mach) {
                DT_MIN
            } else {
                0.5 / v
            };

            let dt_from_step = MAX_STEP_DISTANCE_M / v;
            if dt > dt_from_step {
                dt = dt_from_step;
            }
            dt = dt.clamp(DT_MIN, DT_MAX);

            // Classical RK4 over position and velocity
            let (ax1, ay1, az1) = accel(vx, vy, vz);
            let (k1_x, k1_y, k1_z) = (vx, vy, vz);

            let (vx2, vy2, vz2) = (
                vx + 0.5 * dt * ax1,
                vy + 0.5 * dt * ay1,
                vz + 0.5 * dt * az1,
            );
            let (ax2, ay2, az2) = accel(vx2, vy2, vz2);
            let (k2_x, k2_y, k2_z) = (vx2, vy2, vz2);

            let (vx3, vy3, vz3) = (
                vx + 0.5 * dt * ax2,
                vy + 0.5 * dt * ay2,
                vz + 0.5 * dt * az2,
            );
            let (ax3, ay3, az3) = accel(vx3, vy3, vz3);
            let (k3_x, k3_y, k3_z) = (vx3, vy3, vz3);

            let (vx4, vy4, vz4) = (vx + dt * ax3, vy + dt * ay3, vz + dt * az3);
            let (ax4, ay4, az4) = accel(vx4, vy4, vz4);
            let (k4_x, k4_y, k4_z) = (vx4, vy4, vz4);

            let sixth = dt / 6.0;
            x += sixth * (k1_x + 2.0 * k2_x + 2.0 * k3_x + k4_x);
            y += sixth * (k1_y + 2.0 * k2_y + 2.0 * k3_y + k4_y);
            z += sixth * (k1_z + 2.0 * k2_z + 2.0 * k3_z + k4_z);
            vx += sixth * (ax1 + 2.0 * ax2 + 2.0 * ax3 + ax4);
            vy += sixth * (ay1 + 2.0 * ay2 + 2.0 * ay3 + ay4);
            vz += sixth * (az1 + 2.0 * az2 + 2.0 * az3 + az4);
            t += dt;

            // Emit table entries for every whole meter the step advanced
            if fill_table {
                let current_range = x as usize;
                while last_range_index < current_range && last_range_index < TRAJ_TABLE_SIZE - 1 {
                    last_range_index += 1;
                    let v_current = (vx * vx + vy * vy + vz * vz).sqrt();
                    self.table[last_range_index] = TrajectoryPoint {
                        drop_m: y,
                        windage_m: z,
                        velocity_ms: v_current,
                        tof_s: t,
                        energy_j: 0.5 * params.bullet_mass_kg * v_current * v_current,
                    };
                }
                self.max_valid_range = last_range_index;
            }
        }

        if x < range_m {
            return None;
        }

        Some(y)
    }
}

impl Default for BallisticSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{GRAINS_TO_KG, SPEED_OF_SOUND_15C, STD_AIR_DENSITY};

    fn reference_params(target_range_m: f64) -> SolverParams {
        SolverParams {
            bc: 0.505,
            drag_family: DragFamily::G1,
            muzzle_velocity_ms: 792.0,
            bullet_mass_kg: 175.0 * GRAINS_TO_KG,
            sight_height_m: 0.0381,
            air_density: STD_AIR_DENSITY,
            speed_of_sound: SPEED_OF_SOUND_15C,
            drag_reference_scale: 1.0,
            launch_angle_rad: 0.0,
            target_range_m,
            ..Default::default()
        }
    }

    #[test]
    fn test_flat_fire_drops_and_slows() {
        let mut solver = BallisticSolver::new();
        let result = solver.integrate(&reference_params(500.0));
        assert!(result.valid);
        assert!(result.drop_at_target_m < -1.0, "drop = {}", result.drop_at_target_m);
        assert!(result.drop_at_target_m > -6.0);
        assert!(result.velocity_at_target_ms < 792.0);
        assert!(result.velocity_at_target_ms > 400.0);
        assert!(result.tof_s > 0.5 && result.tof_s < 1.0, "tof = {}", result.tof_s);
    }

    #[test]
    fn test_table_monotonicity() {
        let mut solver = BallisticSolver::new();
        let result = solver.integrate(&reference_params(800.0));
        assert!(result.valid);
        assert!(solver.max_valid_range() >= 800);

        let mut prev_tof = 0.0;
        let mut prev_vel = f64::INFINITY;
        let mut prev_energy = f64::INFINITY;
        for r in 1..=800 {
            let p = solver.point_at(r).unwrap();
            assert!(p.tof_s > prev_tof, "tof not increasing at {r}");
            assert!(p.velocity_ms < prev_vel, "velocity not decreasing at {r}");
            assert!(p.energy_j < prev_energy, "energy not decreasing at {r}");
            prev_tof = p.tof_s;
            prev_vel = p.velocity_ms;
            prev_energy = p.energy_j;
        }
    }

    #[test]
    fn test_point_beyond_valid_prefix_is_none() {
        let mut solver = BallisticSolver::new();
        solver.integrate(&reference_params(300.0));
        assert!(solver.point_at(0).is_some());
        assert!(solver.point_at(300).is_some());
        assert!(solver.point_at(2000).is_none());
        assert!(solver.point_at(TRAJ_TABLE_SIZE).is_none());
    }

    #[test]
    fn test_invalid_target_range() {
        let mut solver = BallisticSolver::new();
        assert!(!solver.integrate(&reference_params(0.0)).valid);
        assert!(!solver.integrate(&reference_params(-5.0)).valid);
        assert!(!solver.integrate(&reference_params(MAX_RANGE_M + 1.0)).valid);
    }

    #[test]
    fn test_unreachable_range_reports_invalid() {
        let mut solver = BallisticSolver::new();
        let mut params = reference_params(2500.0);
        // A slow, draggy projectile decays below MIN_VELOCITY long before
        // 2500 m
        params.muzzle_velocity_ms = 250.0;
        params.bc = 0.1;
        let result = solver.integrate(&params);
        assert!(!result.valid);
    }

    #[test]
    fn test_zero_angle_is_fixed_point() {
        let mut solver = BallisticSolver::new();
        let params = reference_params(100.0);
        let angle = solver
            .solve_zero_angle(params, 100.0)
            .expect("zero should solve");
        assert!(angle > 0.0, "zeroing must tilt the bore up");

        let mut check = params;
        check.launch_angle_rad = angle;
        let result = solver.integrate(&check);
        assert!(result.valid);
        // Drop at the zero range equals -sight_height within tolerance
        let relative = result.drop_at_target_m - (-params.sight_height_m);
        assert!(relative.abs() <= ZERO_TOLERANCE_M, "relative = {relative}");
    }

    #[test]
    fn test_zero_angle_rejects_bad_range() {
        let mut solver = BallisticSolver::new();
        let params = reference_params(100.0);
        assert!(solver.solve_zero_angle(params, 0.0).is_none());
        assert!(solver.solve_zero_angle(params, MAX_RANGE_M + 1.0).is_none());
    }

    #[test]
    fn test_crosswind_deflects_downwind() {
        let mut solver = BallisticSolver::new();
        let mut params = reference_params(600.0);
        // Wind blowing right-to-left (positive crosswind) pushes the bullet
        // left (negative z)
        params.crosswind_ms = 5.0;
        let result = solver.integrate(&params);
        assert!(result.valid);
        assert!(result.windage_at_target_m < -0.05, "windage = {}", result.windage_at_target_m);
    }

    #[test]
    fn test_headwind_increases_tof() {
        let mut solver = BallisticSolver::new();
        let baseline = solver.integrate(&reference_params(600.0));
        let mut params = reference_params(600.0);
        params.headwind_ms = 10.0;
        let with_headwind = solver.integrate(&params);
        assert!(with_headwind.tof_s > baseline.tof_s);
    }

    #[test]
    fn test_external_reference_scale_flattens_trajectory() {
        let mut solver = BallisticSolver::new();
        let baseline = solver.integrate(&reference_params(800.0));
        let mut params = reference_params(800.0);
        params.drag_reference_scale = 0.84;
        let scaled = solver.integrate(&params);
        assert!(scaled.valid);
        assert!(scaled.tof_s < baseline.tof_s);
        assert!(scaled.drop_at_target_m > baseline.drop_at_target_m);
        assert!(scaled.velocity_at_target_ms > baseline.velocity_at_target_ms);
    }

    #[test]
    fn test_spin_drift_sign_follows_twist() {
        let mut solver = BallisticSolver::new();
        let mut params = reference_params(600.0);
        params.spin_drift_enabled = true;
        params.twist_rate_inches = 10.0;
        let right = solver.integrate(&params);
        assert!(right.spin_drift_moa > 0.0);

        params.twist_rate_inches = -10.0;
        let left = solver.integrate(&params);
        assert!(left.spin_drift_moa < 0.0);
        assert!((right.spin_drift_moa + left.spin_drift_moa).abs() < 1e-12);
    }

    #[test]
    fn test_spin_drift_needs_twist() {
        let mut solver = BallisticSolver::new();
        let mut params = reference_params(600.0);
        params.spin_drift_enabled = true;
        params.twist_rate_inches = 0.05;
        let result = solver.integrate(&params);
        assert_eq!(result.spin_drift_moa, 0.0);
    }

    #[test]
    fn test_coriolis_components() {
        let mut solver = BallisticSolver::new();
        let mut params = reference_params(1000.0);
        params.coriolis_enabled = true;
        params.coriolis_lat_rad = 45.0 * DEG_TO_RAD;
        params.azimuth_rad = 90.0 * DEG_TO_RAD; // firing east
        let result = solver.integrate(&params);
        assert!(result.valid);
        // Northern hemisphere: rightward horizontal deflection
        assert!(result.coriolis_wind_moa > 0.0);
        // Firing east: Eötvös lifts the impact
        assert!(result.coriolis_elev_moa > 0.0);

        params.coriolis_enabled = false;
        let without = solver.integrate(&params);
        assert_eq!(without.coriolis_wind_moa, 0.0);
        assert_eq!(without.coriolis_elev_moa, 0.0);
    }

    #[test]
    fn test_iteration_cap_sufficient_for_max_range() {
        // Worst case: full range at the minimum step distance must fit in
        // the iteration cap with margin
        let mut solver = BallisticSolver::new();
        let mut params = reference_params(2500.0);
        params.bc = 1.0;
        params.muzzle_velocity_ms = 900.0;
        let result = solver.integrate(&params);
        assert!(result.valid);
        assert!(solver.max_valid_range() >= 2500);
    }
}
