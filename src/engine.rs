//! Engine orchestrator: per-frame pipeline, state machine, and solution
//! assembly.
//!
//! Pipeline per update:
//! 1. IMU/magnetometer → attitude manager
//! 2. Barometer → atmosphere (may raise a zero-dirty hint)
//! 3. Rangefinder → gated acceptance, IIR smoothing, quaternion snapshot
//! 4. State evaluation; when the data suffices, run the solver, apply
//!    corrections, and publish the firing solution

use log::{debug, warn};
use nalgebra::{Matrix3, Vector3};

use crate::atmosphere::Atmosphere;
use crate::attitude::{AttitudeManager, Quaternion};
use crate::cant;
use crate::constants::{
    DEFAULT_DRAG_REFERENCE_SCALE, DEG_TO_RAD, EXTERNAL_REFERENCE_DRAG_SCALE, FPS_TO_MPS,
    GRAINS_TO_KG, LRF_FILTER_ALPHA, LRF_MIN_CONFIDENCE, LRF_STALE_US, MAX_RANGE_M, MM_TO_M,
    MPS_TO_FPS, RAD_TO_DEG, RAD_TO_MOA,
};
use crate::mag::MagCalibration;
use crate::solver::{BallisticSolver, SolverParams, TrajectoryPoint};
use crate::types::{
    diag, fault, AttitudeAlgorithm, BulletProfile, DefaultOverrides, FiringSolution, Mode,
    OffsetMoa, SensorFrame, ZeroConfig,
};
use crate::wind::WindCorrection;

/// The Ballistic Core Engine.
///
/// One owned instance holds all state; construction performs full
/// initialization (ISA atmosphere, IDLE, dirty zero). The caller drives it
/// from a single thread: configuration setters, [`Engine::update`] once per
/// sensor frame, and the readers. Configuration takes effect on the next
/// update; readers never observe a partially assembled solution.
pub struct Engine {
    attitude: AttitudeManager,
    mag: MagCalibration,
    atmosphere: Atmosphere,
    solver: BallisticSolver,
    wind: WindCorrection,

    mode: Mode,
    fault_flags: u32,
    diag_flags: u32,

    solution: FiringSolution,

    bullet: BulletProfile,
    zero: ZeroConfig,

    has_bullet: bool,
    has_zero: bool,
    has_range: bool,
    has_latitude: bool,

    zero_angle_rad: f64,
    zero_dirty: bool,
    /// Latched when the last zero search failed; cleared by the next
    /// successful recompute.
    zero_unsolvable: bool,

    lrf_range_m: f64,
    lrf_range_filtered_m: f64,
    lrf_timestamp_us: u64,
    lrf_quaternion: Quaternion,

    latitude_deg: f64,
    boresight: OffsetMoa,
    reticle: OffsetMoa,

    last_gyro: Vector3<f64>,
    last_imu_timestamp_us: u64,
    first_update: bool,
    had_invalid_sensor_input: bool,
    external_reference_mode: bool,
}

impl Engine {
    /// Fully initialized engine: zeroed state, ISA defaults, IDLE mode,
    /// zero marked dirty.
    pub fn new() -> Self {
        let mut engine = Self {
            attitude: AttitudeManager::new(),
            mag: MagCalibration::new(),
            atmosphere: Atmosphere::new(),
            solver: BallisticSolver::new(),
            wind: WindCorrection::new(),
            mode: Mode::Idle,
            fault_flags: 0,
            diag_flags: 0,
            solution: FiringSolution::default(),
            bullet: BulletProfile::default(),
            zero: ZeroConfig::default(),
            has_bullet: false,
            has_zero: false,
            has_range: false,
            has_latitude: false,
            zero_angle_rad: 0.0,
            zero_dirty: true,
            zero_unsolvable: false,
            lrf_range_m: 0.0,
            lrf_range_filtered_m: 0.0,
            lrf_timestamp_us: 0,
            lrf_quaternion: Quaternion::IDENTITY,
            latitude_deg: 0.0,
            boresight: OffsetMoa::default(),
            reticle: OffsetMoa::default(),
            last_gyro: Vector3::zeros(),
            last_imu_timestamp_us: 0,
            first_update: true,
            had_invalid_sensor_input: false,
            external_reference_mode: false,
        };
        engine.solution.solution_mode = Mode::Idle;
        engine
    }

    /// Re-initialize in place; equivalent to replacing the engine with a
    /// fresh one.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    // -----------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------

    /// Replace the bullet profile. Dirties the zero.
    pub fn set_bullet(&mut self, profile: BulletProfile) {
        self.bullet = profile;
        self.has_bullet = true;
        self.zero_dirty = true;
    }

    /// Replace the zero configuration. Dirties the zero.
    pub fn set_zero(&mut self, config: ZeroConfig) {
        self.zero = config;
        self.has_zero = true;
        self.zero_dirty = true;
    }

    /// Latch a manual wind observation; clears the default-wind diagnostic.
    pub fn set_wind_manual(&mut self, speed_ms: f64, heading_deg: f64) {
        self.wind.set_wind(speed_ms, heading_deg);
    }

    /// Set the shooter latitude for Coriolis. `NaN` disables it.
    pub fn set_latitude(&mut self, latitude_deg: f64) {
        if latitude_deg.is_nan() {
            self.has_latitude = false;
        } else {
            self.latitude_deg = latitude_deg;
            self.has_latitude = true;
        }
    }

    /// Apply per-channel default overrides. Dirties the zero (the
    /// atmosphere may have moved).
    pub fn set_default_overrides(&mut self, defaults: DefaultOverrides) {
        self.atmosphere.apply_defaults(&defaults);

        if defaults.use_latitude {
            self.set_latitude(defaults.latitude_deg);
        }
        if defaults.use_wind {
            self.wind.set_wind(defaults.wind_speed_ms, defaults.wind_heading_deg);
        }

        self.zero_dirty = true;
    }

    /// Set IMU biases; `None` means a zero vector.
    pub fn set_imu_bias(
        &mut self,
        accel_bias: Option<Vector3<f64>>,
        gyro_bias: Option<Vector3<f64>>,
    ) {
        self.attitude.set_accel_bias(accel_bias.unwrap_or_else(Vector3::zeros));
        self.attitude.set_gyro_bias(gyro_bias.unwrap_or_else(Vector3::zeros));
    }

    /// Set magnetometer calibration; `None` means zero offset / identity.
    pub fn set_mag_calibration(
        &mut self,
        hard_iron: Option<Vector3<f64>>,
        soft_iron: Option<Matrix3<f64>>,
    ) {
        self.mag.set_calibration(hard_iron, soft_iron);
    }

    /// Capture the last raw gyro reading as the gyro bias. The caller is
    /// expected to ensure the device is still.
    pub fn calibrate_gyro(&mut self) {
        self.attitude.capture_gyro_bias(self.last_gyro);
    }

    /// Boresight offset (MOA).
    pub fn set_boresight(&mut self, vertical_moa: f64, horizontal_moa: f64) {
        self.boresight = OffsetMoa {
            vertical_moa,
            horizontal_moa,
        };
    }

    /// Reticle offset (MOA).
    pub fn set_reticle(&mut self, vertical_moa: f64, horizontal_moa: f64) {
        self.reticle = OffsetMoa {
            vertical_moa,
            horizontal_moa,
        };
    }

    /// Field-calibrate the barometer so the current pressure reads at the
    /// standard sea-level reference. Dirties the zero.
    pub fn calibrate_baro(&mut self) {
        self.atmosphere.calibrate_baro();
        self.zero_dirty = true;
    }

    /// Hot-swap the attitude filter.
    pub fn set_attitude_algorithm(&mut self, algorithm: AttitudeAlgorithm) {
        self.attitude.set_algorithm(algorithm);
    }

    /// Magnetic declination (deg east positive).
    pub fn set_mag_declination(&mut self, declination_deg: f64) {
        self.mag.set_declination(declination_deg);
    }

    /// Toggle the external-reference drag scale (0.84 vs 1.0).
    pub fn set_external_reference_mode(&mut self, enabled: bool) {
        self.external_reference_mode = enabled;
    }

    // -----------------------------------------------------------------
    // Readers
    // -----------------------------------------------------------------

    /// Copy of the latest firing solution. Always complete; its
    /// `solution_mode` mirrors the operating mode.
    pub fn solution(&self) -> FiringSolution {
        self.solution
    }

    /// Current operating mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current fault bitmap.
    pub fn fault_flags(&self) -> u32 {
        self.fault_flags
    }

    /// Current diagnostic bitmap.
    pub fn diag_flags(&self) -> u32 {
        self.diag_flags
    }

    /// Trajectory record at an integer range from the last full solve, if
    /// inside the table's valid prefix.
    pub fn trajectory_point(&self, range_m: usize) -> Option<TrajectoryPoint> {
        self.solver.point_at(range_m).copied()
    }

    /// Valid prefix length of the trajectory table (meters).
    pub fn max_valid_range(&self) -> usize {
        self.solver.max_valid_range()
    }

    /// Orientation snapshot captured with the last accepted rangefinder
    /// reading.
    pub fn range_quaternion(&self) -> Quaternion {
        self.lrf_quaternion
    }

    /// Current computed air density (kg/m³).
    pub fn air_density(&self) -> f64 {
        self.atmosphere.air_density()
    }

    /// Current computed speed of sound (m/s).
    pub fn speed_of_sound(&self) -> f64 {
        self.atmosphere.speed_of_sound()
    }

    // -----------------------------------------------------------------
    // Frame ingestion
    // -----------------------------------------------------------------

    /// Advance the pipeline by one sensor frame.
    pub fn update(&mut self, frame: &SensorFrame) {
        self.had_invalid_sensor_input = false;

        let now_us = frame.timestamp_us;

        // --- 1. IMU path ---
        if frame.imu_valid {
            let imu_finite = frame.accel.iter().all(|v| v.is_finite())
                && frame.gyro.iter().all(|v| v.is_finite());
            if !imu_finite {
                self.had_invalid_sensor_input = true;
            }

            let mut dt = 0.01; // default 100 Hz
            if !self.first_update && now_us > self.last_imu_timestamp_us {
                dt = ((now_us - self.last_imu_timestamp_us) as f64 * 1e-6).clamp(1e-4, 0.1);
            }
            self.first_update = false;
            self.last_imu_timestamp_us = now_us;

            if imu_finite {
                self.last_gyro = frame.gyro;
            }

            // Magnetometer: calibrate, suppress when disturbed
            let mut mag_vec = frame.mag;
            let mut use_mag = false;
            if frame.mag_valid {
                if frame.mag.iter().all(|v| v.is_finite()) {
                    let (corrected, usable) = self.mag.apply(frame.mag);
                    mag_vec = corrected;
                    use_mag = usable;
                } else {
                    self.had_invalid_sensor_input = true;
                }
            }

            if imu_finite {
                self.attitude.update(frame.accel, frame.gyro, mag_vec, use_mag, dt);
            }
        }

        // --- 2. Barometer path ---
        if frame.baro_valid {
            let humidity = frame.baro_humidity_valid.then_some(frame.baro_humidity);
            self.atmosphere.update_from_baro(
                frame.baro_pressure_pa,
                frame.baro_temperature_c,
                humidity,
            );
            if self.atmosphere.consume_zero_recompute_hint() {
                debug!("atmosphere shift marks zero dirty");
                self.zero_dirty = true;
            }
        }

        // --- 3. Rangefinder path ---
        if frame.lrf_valid {
            if !frame.lrf_range_m.is_finite() {
                self.had_invalid_sensor_input = true;
            }

            let range_valid = frame.lrf_range_m.is_finite()
                && frame.lrf_range_m > 0.0
                && frame.lrf_range_m <= MAX_RANGE_M;

            let confidence = frame.lrf_confidence;
            let confidence_provided = confidence > 0.0;
            let confidence_in_range =
                confidence.is_finite() && (0.0..=1.0).contains(&confidence);
            let confidence_valid = !confidence_provided
                || (confidence_in_range && confidence >= LRF_MIN_CONFIDENCE);

            if confidence_provided && !confidence_in_range {
                self.had_invalid_sensor_input = true;
            }

            if range_valid && confidence_valid {
                if self.has_range {
                    self.lrf_range_filtered_m = LRF_FILTER_ALPHA * frame.lrf_range_m
                        + (1.0 - LRF_FILTER_ALPHA) * self.lrf_range_filtered_m;
                } else {
                    // First accepted range seeds the filter
                    self.lrf_range_filtered_m = frame.lrf_range_m;
                }
                self.lrf_range_m = frame.lrf_range_m;
                self.lrf_timestamp_us = frame.lrf_timestamp_us;
                self.lrf_quaternion = self.attitude.quaternion();
                self.has_range = true;
            }
        }

        // --- 4. State evaluation and solve ---
        self.evaluate_state(now_us);
    }

    // -----------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------

    fn evaluate_state(&mut self, now_us: u64) {
        self.fault_flags = 0;
        self.diag_flags = self.atmosphere.diag_flags();

        if !self.has_range {
            self.fault_flags |= fault::NO_RANGE;
        } else if now_us > self.lrf_timestamp_us + LRF_STALE_US {
            // Stale range is no range; remember why
            self.has_range = false;
            self.fault_flags |= fault::NO_RANGE;
            self.diag_flags |= diag::LRF_STALE;
        }

        if !self.has_bullet {
            self.fault_flags |= fault::NO_BULLET;
        } else {
            if self.bullet.muzzle_velocity_ms < 1.0 {
                self.fault_flags |= fault::NO_MV;
            }
            if self.bullet.bc < 0.001 {
                self.fault_flags |= fault::NO_BC;
            }
            if self.has_zero
                && !(1.0..=MAX_RANGE_M).contains(&self.zero.zero_range_m)
            {
                self.fault_flags |= fault::ZERO_UNSOLVABLE;
            }
        }

        if self.zero_unsolvable {
            self.fault_flags |= fault::ZERO_UNSOLVABLE;
        }

        if !self.attitude.is_stable() {
            self.fault_flags |= fault::AHRS_UNSTABLE;
        }

        if !self.has_latitude {
            self.diag_flags |= diag::CORIOLIS_DISABLED;
        }

        if self.mag.is_disturbed() {
            self.diag_flags |= diag::MAG_SUPPRESSED;
        }

        if !self.wind.is_set() {
            self.diag_flags |= diag::DEFAULT_WIND;
        }

        if self.atmosphere.had_invalid_input() || self.had_invalid_sensor_input {
            self.fault_flags |= fault::SENSOR_INVALID;
        }

        if self.fault_flags & fault::HARD_MASK != 0 {
            self.publish_status(Mode::Fault);
            return;
        }

        let new_mode = if self.has_range
            && self.has_bullet
            && self.bullet.muzzle_velocity_ms > 1.0
            && self.bullet.bc > 0.001
        {
            if self.compute_solution() {
                Mode::SolutionReady
            } else {
                // A solve failure surfaces as an unsolvable zero
                Mode::Fault
            }
        } else {
            Mode::Idle
        };

        if new_mode == Mode::SolutionReady {
            self.set_mode(Mode::SolutionReady);
        } else {
            self.publish_status(new_mode);
        }
    }

    fn set_mode(&mut self, new_mode: Mode) {
        if new_mode != self.mode {
            if new_mode == Mode::Fault {
                warn!(
                    "entering fault mode, faults={:#x} diags={:#x}",
                    self.fault_flags, self.diag_flags
                );
            } else {
                debug!("mode {} -> {}", self.mode.label(), new_mode.label());
            }
        }
        self.mode = new_mode;
    }

    /// Publish a status-only snapshot: mode and bitmaps change, the numeric
    /// solution fields keep their last computed values for caller display.
    fn publish_status(&mut self, new_mode: Mode) {
        self.set_mode(new_mode);
        self.solution.solution_mode = new_mode;
        self.solution.fault_flags = self.fault_flags;
        self.solution.diag_flags = self.diag_flags;
    }

    // -----------------------------------------------------------------
    // Solution assembly
    // -----------------------------------------------------------------

    /// Run the solver and assemble the firing solution. Returns false when
    /// the zero or the integration fails; the fault bitmap then carries
    /// `ZERO_UNSOLVABLE` and the caller assigns the final mode.
    fn compute_solution(&mut self) -> bool {
        if self.zero_dirty {
            self.recompute_zero();
        }

        if self.fault_flags & fault::ZERO_UNSOLVABLE != 0 {
            return false;
        }

        // Current orientation: bore elevation, cant, true heading
        let pitch = self.attitude.pitch();
        let roll = self.attitude.roll();
        let yaw = self.attitude.yaw();
        let heading_true = self.mag.compute_heading(yaw);

        let mut params = self.build_solver_params(self.lrf_range_filtered_m);
        params.launch_angle_rad = self.zero_angle_rad + pitch;

        let result = self.solver.integrate(&params);
        if !result.valid {
            self.fault_flags |= fault::ZERO_UNSOLVABLE;
            return false;
        }

        // Translate bore-relative drop into a sight-line-relative hold
        let range = self.lrf_range_m;
        let mut drop_moa = 0.0;
        let mut wind_from_wind_moa = 0.0;

        if range > 0.0 {
            // The solver reports drop from the bore line; the hold is
            // relative to the sight line, which starts sight_height above
            // the bore and crosses it at the zero range.
            let sight_h = if self.has_zero {
                self.zero.sight_height_mm * MM_TO_M
            } else {
                0.0
            };
            let zero_range_m = if self.has_zero && self.zero.zero_range_m > 0.0 {
                self.zero.zero_range_m
            } else {
                range
            };
            let sight_line_drop = sight_h - (sight_h / zero_range_m) * range;
            let relative_drop = result.drop_at_target_m - sight_line_drop;

            drop_moa = -(relative_drop / range) * RAD_TO_MOA;
            wind_from_wind_moa = -(result.windage_at_target_m / range) * RAD_TO_MOA;
        }

        let windage_earth_spin_moa = result.coriolis_wind_moa + result.spin_drift_moa;
        let windage_offsets_moa = self.boresight.horizontal_moa + self.reticle.horizontal_moa;

        drop_moa += result.coriolis_elev_moa;
        let mut windage_moa = wind_from_wind_moa + windage_earth_spin_moa;

        drop_moa += self.boresight.vertical_moa + self.reticle.vertical_moa;
        windage_moa += windage_offsets_moa;

        // Cant rotates the vertical hold into the horizontal plane
        let windage_before_cant_moa = windage_moa;
        let (cant_elev, cant_wind) = cant::apply(roll, drop_moa);
        drop_moa = cant_elev;
        windage_moa += cant_wind;
        let windage_cant_moa = windage_moa - windage_before_cant_moa;

        // Assemble locally, then copy out: the published snapshot is never
        // torn
        self.solution = FiringSolution {
            solution_mode: Mode::SolutionReady,
            fault_flags: self.fault_flags,
            diag_flags: self.diag_flags,

            hold_elevation_moa: drop_moa,
            hold_windage_moa: windage_moa,

            range_m: range,
            horizontal_range_m: result.horizontal_range_m,
            tof_ms: result.tof_s * 1000.0,
            velocity_at_target_ms: result.velocity_at_target_ms,
            energy_at_target_j: result.energy_at_target_j,

            coriolis_windage_moa: result.coriolis_wind_moa,
            coriolis_elevation_moa: result.coriolis_elev_moa,
            spin_drift_moa: result.spin_drift_moa,
            wind_only_windage_moa: wind_from_wind_moa,
            earth_spin_windage_moa: windage_earth_spin_moa,
            offsets_windage_moa: windage_offsets_moa,
            cant_windage_moa: windage_cant_moa,

            cant_angle_deg: roll * RAD_TO_DEG,
            heading_deg_true: heading_true,

            air_density_kgm3: self.atmosphere.air_density(),
        };

        true
    }

    /// Consume the dirty flag and recompute the cached zero angle.
    fn recompute_zero(&mut self) {
        self.zero_dirty = false;

        if !self.has_bullet || !self.has_zero {
            self.zero_angle_rad = 0.0;
            self.zero_unsolvable = false;
            return;
        }

        if !(1.0..=MAX_RANGE_M).contains(&self.zero.zero_range_m) {
            self.fault_flags |= fault::ZERO_UNSOLVABLE;
            self.zero_unsolvable = true;
            self.zero_angle_rad = 0.0;
            return;
        }

        let params = self.build_solver_params(self.zero.zero_range_m);
        match self.solver.solve_zero_angle(params, self.zero.zero_range_m) {
            Some(angle) => {
                debug!(
                    "zero recomputed: {:.4} mrad at {} m",
                    angle * 1000.0,
                    self.zero.zero_range_m
                );
                self.zero_angle_rad = angle;
                self.zero_unsolvable = false;
            }
            None => {
                self.fault_flags |= fault::ZERO_UNSOLVABLE;
                self.zero_unsolvable = true;
                self.zero_angle_rad = 0.0;
            }
        }
    }

    /// Assemble solver parameters from the current configuration and
    /// atmosphere.
    fn build_solver_params(&self, range_m: f64) -> SolverParams {
        let mut p = SolverParams {
            bc: self.atmosphere.correct_bc(self.bullet.bc),
            drag_family: self.bullet.drag_family,
            ..Default::default()
        };

        // Muzzle velocity adjusted for barrel length: the adjustment factor
        // is fps per inch of deviation from the 24-inch reference barrel
        let base_mv_fps = self.bullet.muzzle_velocity_ms * MPS_TO_FPS;
        let barrel_length_delta_in = self.bullet.barrel_length_in - 24.0;
        let mv_adjustment_fps_per_in = self.bullet.mv_adjustment_factor.abs();
        let adjusted_mv_fps = base_mv_fps + barrel_length_delta_in * mv_adjustment_fps_per_in;
        p.muzzle_velocity_ms = adjusted_mv_fps * FPS_TO_MPS;

        p.bullet_mass_kg = self.bullet.mass_grains * GRAINS_TO_KG;
        p.sight_height_m = if self.has_zero {
            self.zero.sight_height_mm * MM_TO_M
        } else {
            0.0
        };

        p.air_density = self.atmosphere.air_density();
        p.speed_of_sound = self.atmosphere.speed_of_sound();
        p.drag_reference_scale = if self.external_reference_mode {
            EXTERNAL_REFERENCE_DRAG_SCALE
        } else {
            DEFAULT_DRAG_REFERENCE_SCALE
        };
        p.target_range_m = range_m;
        p.launch_angle_rad = 0.0; // set by the caller

        // Wind decomposed against the current true heading
        let heading = self.mag.compute_heading(self.attitude.yaw());
        let (headwind, crosswind) = self.wind.decompose(heading);
        p.headwind_ms = headwind;
        p.crosswind_ms = crosswind;

        if self.has_latitude {
            p.coriolis_enabled = true;
            p.coriolis_lat_rad = self.latitude_deg * DEG_TO_RAD;
            p.azimuth_rad = heading * DEG_TO_RAD;
        }

        if self.bullet.twist_rate_inches.abs() > 0.1 {
            p.spin_drift_enabled = true;
            p.twist_rate_inches = self.bullet.twist_rate_inches;
        }

        p
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GRAVITY;

    fn reference_bullet() -> BulletProfile {
        BulletProfile {
            bc: 0.505,
            drag_family: crate::types::DragFamily::G1,
            muzzle_velocity_ms: 792.0,
            barrel_length_in: 24.0,
            mv_adjustment_factor: 0.0,
            mass_grains: 175.0,
            length_mm: 31.2,
            caliber_inches: 0.308,
            twist_rate_inches: 10.0,
        }
    }

    fn flat_frame(timestamp_us: u64) -> SensorFrame {
        SensorFrame {
            timestamp_us,
            accel: Vector3::new(0.0, 0.0, GRAVITY),
            gyro: Vector3::zeros(),
            imu_valid: true,
            baro_pressure_pa: 101325.0,
            baro_temperature_c: 15.0,
            baro_humidity: 0.5,
            baro_valid: true,
            baro_humidity_valid: true,
            ..Default::default()
        }
    }

    fn ranging_frame(timestamp_us: u64, range_m: f64) -> SensorFrame {
        let mut f = flat_frame(timestamp_us);
        f.lrf_valid = true;
        f.lrf_range_m = range_m;
        f.lrf_timestamp_us = timestamp_us;
        f.lrf_confidence = 1.0;
        f
    }

    fn settle(engine: &mut Engine, frames: usize, range_m: f64) {
        for i in 0..frames {
            engine.update(&ranging_frame((i as u64 + 1) * 10_000, range_m));
        }
    }

    #[test]
    fn test_initial_mode_is_idle() {
        let engine = Engine::new();
        assert_eq!(engine.mode(), Mode::Idle);
        assert_eq!(engine.solution().solution_mode, Mode::Idle);
    }

    #[test]
    fn test_full_configuration_reaches_solution_ready() {
        let mut engine = Engine::new();
        engine.set_bullet(reference_bullet());
        engine.set_zero(ZeroConfig {
            zero_range_m: 100.0,
            sight_height_mm: 38.1,
        });
        settle(&mut engine, 100, 500.0);

        assert_eq!(engine.mode(), Mode::SolutionReady);
        let sol = engine.solution();
        assert_eq!(sol.solution_mode, Mode::SolutionReady);
        assert_eq!(sol.range_m, 500.0);
        assert!(sol.hold_elevation_moa > 0.0);
        assert!(sol.tof_ms > 0.0);
        assert!(sol.velocity_at_target_ms > 0.0);
        assert!(sol.energy_at_target_j > 0.0);
        assert!(sol.air_density_kgm3 > 0.0);
    }

    #[test]
    fn test_unstable_attitude_blocks_solution() {
        let mut engine = Engine::new();
        engine.set_bullet(reference_bullet());
        engine.set_zero(ZeroConfig {
            zero_range_m: 100.0,
            sight_height_mm: 38.1,
        });
        // Fewer frames than the static window
        settle(&mut engine, 10, 500.0);
        assert_eq!(engine.mode(), Mode::Fault);
        assert_ne!(engine.fault_flags() & fault::AHRS_UNSTABLE, 0);
    }

    #[test]
    fn test_low_confidence_lrf_rejected() {
        let mut engine = Engine::new();
        engine.set_bullet(reference_bullet());
        engine.set_zero(ZeroConfig {
            zero_range_m: 100.0,
            sight_height_mm: 38.1,
        });
        for i in 0..100u64 {
            let mut f = ranging_frame((i + 1) * 10_000, 500.0);
            f.lrf_confidence = 0.3;
            engine.update(&f);
        }
        assert_eq!(engine.mode(), Mode::Fault);
        assert_ne!(engine.fault_flags() & fault::NO_RANGE, 0);
    }

    #[test]
    fn test_unprovided_confidence_accepted() {
        let mut engine = Engine::new();
        engine.set_bullet(reference_bullet());
        engine.set_zero(ZeroConfig {
            zero_range_m: 100.0,
            sight_height_mm: 38.1,
        });
        for i in 0..100u64 {
            let mut f = ranging_frame((i + 1) * 10_000, 500.0);
            f.lrf_confidence = 0.0;
            engine.update(&f);
        }
        assert_eq!(engine.mode(), Mode::SolutionReady);
    }

    #[test]
    fn test_lrf_range_is_iir_filtered() {
        let mut engine = Engine::new();
        engine.set_bullet(reference_bullet());
        engine.set_zero(ZeroConfig {
            zero_range_m: 100.0,
            sight_height_mm: 38.1,
        });
        settle(&mut engine, 100, 500.0);
        // One jump reading moves the filtered range by α of the step
        engine.update(&ranging_frame(1_010_000 + 10_000, 600.0));
        let filtered = engine.lrf_range_filtered_m;
        assert!((filtered - (0.2 * 600.0 + 0.8 * 500.0)).abs() < 1e-9);
        // The published slant range tracks the raw reading
        assert_eq!(engine.solution().range_m, 600.0);
    }

    #[test]
    fn test_nonfinite_imu_latches_sensor_invalid() {
        let mut engine = Engine::new();
        engine.set_bullet(reference_bullet());
        engine.set_zero(ZeroConfig {
            zero_range_m: 100.0,
            sight_height_mm: 38.1,
        });
        settle(&mut engine, 100, 500.0);
        assert_eq!(engine.mode(), Mode::SolutionReady);
        let good_quat = engine.attitude.quaternion();

        let mut f = ranging_frame(1_010_000 + 10_000, 500.0);
        f.accel.x = f64::NAN;
        engine.update(&f);

        assert_ne!(engine.fault_flags() & fault::SENSOR_INVALID, 0);
        // The bad frame never reached the filter
        assert_eq!(engine.attitude.quaternion(), good_quat);
        // And SENSOR_INVALID alone does not force FAULT
        assert_eq!(engine.mode(), Mode::SolutionReady);
    }

    #[test]
    fn test_sensor_invalid_clears_next_frame() {
        let mut engine = Engine::new();
        engine.set_bullet(reference_bullet());
        engine.set_zero(ZeroConfig {
            zero_range_m: 100.0,
            sight_height_mm: 38.1,
        });
        settle(&mut engine, 100, 500.0);

        let mut f = ranging_frame(1_020_000, 500.0);
        f.gyro.y = f64::INFINITY;
        engine.update(&f);
        assert_ne!(engine.fault_flags() & fault::SENSOR_INVALID, 0);

        engine.update(&ranging_frame(1_030_000, 500.0));
        assert_eq!(engine.fault_flags() & fault::SENSOR_INVALID, 0);
    }

    #[test]
    fn test_mv_adjustment_for_barrel_length() {
        let mut engine = Engine::new();
        let mut bullet = reference_bullet();
        bullet.barrel_length_in = 20.0;
        bullet.mv_adjustment_factor = 25.0; // fps per inch
        engine.set_bullet(bullet);
        let params = engine.build_solver_params(500.0);
        // 4 inches short of reference: 100 fps slower
        let expected = (792.0 * MPS_TO_FPS - 100.0) * FPS_TO_MPS;
        assert!((params.muzzle_velocity_ms - expected).abs() < 1e-9);
    }

    #[test]
    fn test_config_before_update_is_deferred() {
        let mut engine = Engine::new();
        engine.set_bullet(reference_bullet());
        engine.set_zero(ZeroConfig {
            zero_range_m: 100.0,
            sight_height_mm: 38.1,
        });
        // Nothing published until a frame arrives
        assert_eq!(engine.mode(), Mode::Idle);
        settle(&mut engine, 100, 500.0);
        assert_eq!(engine.mode(), Mode::SolutionReady);
    }

    #[test]
    fn test_new_bullet_dirties_zero() {
        let mut engine = Engine::new();
        engine.set_bullet(reference_bullet());
        engine.set_zero(ZeroConfig {
            zero_range_m: 100.0,
            sight_height_mm: 38.1,
        });
        settle(&mut engine, 100, 500.0);
        assert!(!engine.zero_dirty);
        let first_zero = engine.zero_angle_rad;

        let mut faster = reference_bullet();
        faster.muzzle_velocity_ms = 900.0;
        engine.set_bullet(faster);
        assert!(engine.zero_dirty);

        engine.update(&ranging_frame(1_010_000 + 10_000, 500.0));
        assert!(!engine.zero_dirty);
        assert!(engine.zero_angle_rad < first_zero, "faster bullet needs less angle");
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut engine = Engine::new();
        engine.set_bullet(reference_bullet());
        engine.set_zero(ZeroConfig {
            zero_range_m: 100.0,
            sight_height_mm: 38.1,
        });
        settle(&mut engine, 100, 500.0);
        assert_eq!(engine.mode(), Mode::SolutionReady);

        engine.reset();
        assert_eq!(engine.mode(), Mode::Idle);
        assert_eq!(engine.fault_flags(), 0);
        assert!(engine.zero_dirty);
    }
}
