//! Physical constants, ISA defaults, and solver tuning parameters.
//!
//! The solver constants define wire-level compatibility with deployed
//! devices and must not be retuned casually.

use std::f64::consts::PI;

// ---------------------------------------------------------------------------
// Range limits
// ---------------------------------------------------------------------------

/// Maximum solvable range (meters).
pub const MAX_RANGE_M: f64 = 2500.0;

/// Trajectory table size: 1-meter resolution from 0 to `MAX_RANGE_M`.
pub const TRAJ_TABLE_SIZE: usize = 2501;

// ---------------------------------------------------------------------------
// ISA standard atmosphere defaults
// ---------------------------------------------------------------------------

/// Default station altitude (m).
pub const DEFAULT_ALTITUDE_M: f64 = 0.0;

/// ISA sea-level pressure (Pa).
pub const DEFAULT_PRESSURE_PA: f64 = 101325.0;

/// ISA sea-level temperature (°C).
pub const DEFAULT_TEMPERATURE_C: f64 = 15.0;

/// Default relative humidity (fraction).
pub const DEFAULT_HUMIDITY: f64 = 0.50;

// ---------------------------------------------------------------------------
// Physical constants
// ---------------------------------------------------------------------------

/// Earth rotation rate (rad/s).
pub const OMEGA_EARTH: f64 = 7.2921e-5;

/// Gravitational acceleration (m/s²).
pub const GRAVITY: f64 = 9.80665;

/// Specific gas constant for dry air (J/(kg·K)).
pub const R_DRY_AIR: f64 = 287.05;

/// Speed of sound at 15 °C (m/s).
pub const SPEED_OF_SOUND_15C: f64 = 340.29;

/// Standard air density at sea level ISA (kg/m³).
pub const STD_AIR_DENSITY: f64 = 1.225;

/// Reference barometric pressure at sea level (Pa).
pub const STD_PRESSURE_PA: f64 = 101325.0;

/// Celsius → Kelvin offset.
pub const KELVIN_OFFSET: f64 = 273.15;

// ---------------------------------------------------------------------------
// Conversion factors
// ---------------------------------------------------------------------------

pub const DEG_TO_RAD: f64 = PI / 180.0;
pub const RAD_TO_DEG: f64 = 180.0 / PI;
pub const RAD_TO_MOA: f64 = (180.0 * 60.0) / PI;

/// Conversion factor: grains to kilograms.
pub const GRAINS_TO_KG: f64 = 6.479891e-5;

/// Conversion factor: inches to meters.
pub const INCHES_TO_M: f64 = 0.0254;

/// Conversion factor: millimeters to meters.
pub const MM_TO_M: f64 = 0.001;

/// Conversion factor: meters per second to feet per second.
pub const MPS_TO_FPS: f64 = 3.28084;

/// Conversion factor: feet per second to meters per second.
pub const FPS_TO_MPS: f64 = 0.3048;

// ---------------------------------------------------------------------------
// Attitude configuration
// ---------------------------------------------------------------------------

/// Sliding window size for static/dynamic detection (samples).
pub const AHRS_STATIC_WINDOW: usize = 64;

/// Accel-magnitude variance threshold for static detection (m/s²)².
pub const AHRS_STATIC_THRESHOLD: f64 = 0.05;

/// Default gradient-descent filter gain (β).
pub const MADGWICK_DEFAULT_BETA: f64 = 0.1;

/// Default complementary filter proportional gain.
pub const MAHONY_DEFAULT_KP: f64 = 2.0;

/// Default complementary filter integral gain.
pub const MAHONY_DEFAULT_KI: f64 = 0.005;

// ---------------------------------------------------------------------------
// Rangefinder gating
// ---------------------------------------------------------------------------

/// Rangefinder staleness threshold (µs).
pub const LRF_STALE_US: u64 = 2_000_000;

/// Minimum accepted rangefinder confidence when provided (≤ 0 means
/// unprovided).
pub const LRF_MIN_CONFIDENCE: f64 = 0.50;

/// IIR smoothing factor for accepted range readings.
pub const LRF_FILTER_ALPHA: f64 = 0.2;

// ---------------------------------------------------------------------------
// Solver configuration
// ---------------------------------------------------------------------------

/// Minimum velocity before the integrator terminates (m/s).
pub const MIN_VELOCITY: f64 = 30.0;

/// Ballistic drag conversion constant used by the point-mass retardation
/// model. A legacy tuning parameter, not physically based; retained exactly
/// so solutions remain comparable across firmware generations.
pub const BALLISTIC_DRAG_CONSTANT: f64 = 900.0;

/// External-reference calibration mode applies a drag scale below 1.0 to
/// reduce modeled retardation while preserving legacy default behavior.
pub const EXTERNAL_REFERENCE_DRAG_SCALE: f64 = 0.84;
pub const DEFAULT_DRAG_REFERENCE_SCALE: f64 = 1.0;

/// Maximum integrator iterations (safety limit).
pub const MAX_SOLVER_ITERATIONS: u32 = 500_000;

/// Adaptive timestep lower bound (s).
pub const DT_MIN: f64 = 1e-5;

/// Adaptive timestep upper bound (s).
pub const DT_MAX: f64 = 1e-3;

/// Maximum downrange distance advanced per integration step (m).
pub const MAX_STEP_DISTANCE_M: f64 = 0.25;

/// Zero-angle binary search tolerance (meters of drop at zero range).
pub const ZERO_TOLERANCE_M: f64 = 0.001;

/// Zero-angle binary search iteration cap.
pub const ZERO_MAX_ITERATIONS: u32 = 50;

// Thresholds for flagging zero-angle recomputation when the atmosphere moves
pub const ZERO_RECOMPUTE_BC_FACTOR_DELTA: f64 = 0.0015;
pub const ZERO_RECOMPUTE_DENSITY_DELTA: f64 = 0.005;
pub const ZERO_RECOMPUTE_SOS_DELTA: f64 = 0.75;

// ---------------------------------------------------------------------------
// Magnetometer configuration
// ---------------------------------------------------------------------------

/// Minimum plausible Earth field magnitude (µT).
pub const MAG_MIN_FIELD_UT: f64 = 20.0;

/// Maximum plausible Earth field magnitude (µT).
pub const MAG_MAX_FIELD_UT: f64 = 70.0;
