//! Data model: sensor frames, configuration, and the firing solution.
//!
//! All types are plain values. The engine copies them in and out; no
//! references escape past the next update.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Operating modes
// ---------------------------------------------------------------------------

/// Engine operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum Mode {
    /// Insufficient data for a solution.
    #[default]
    Idle = 0,
    /// Valid firing solution available.
    SolutionReady = 1,
    /// Required inputs missing or invalid.
    Fault = 2,
}

impl Mode {
    /// Human-readable label for the mode.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SolutionReady => "solution-ready",
            Self::Fault => "fault",
        }
    }
}

// ---------------------------------------------------------------------------
// Fault flags (bitfield)
// ---------------------------------------------------------------------------

/// Fault bit positions. The layout is part of the external contract.
pub mod fault {
    pub const NONE: u32 = 0;
    pub const NO_RANGE: u32 = 1 << 0;
    pub const NO_BULLET: u32 = 1 << 1;
    pub const NO_MV: u32 = 1 << 2;
    pub const NO_BC: u32 = 1 << 3;
    pub const ZERO_UNSOLVABLE: u32 = 1 << 4;
    pub const AHRS_UNSTABLE: u32 = 1 << 5;
    /// A sensor channel sanitised a non-finite or out-of-range input this
    /// frame. Flagged, never a hard fault on its own.
    pub const SENSOR_INVALID: u32 = 1 << 6;

    /// The subset that forces `Mode::Fault`.
    pub const HARD_MASK: u32 =
        NO_RANGE | NO_BULLET | NO_MV | NO_BC | ZERO_UNSOLVABLE | AHRS_UNSTABLE;
}

/// Diagnostic bit positions — informational, never faults.
pub mod diag {
    pub const NONE: u32 = 0;
    pub const CORIOLIS_DISABLED: u32 = 1 << 0;
    pub const DEFAULT_PRESSURE: u32 = 1 << 1;
    pub const DEFAULT_TEMP: u32 = 1 << 2;
    pub const DEFAULT_HUMIDITY: u32 = 1 << 3;
    pub const DEFAULT_ALTITUDE: u32 = 1 << 4;
    pub const DEFAULT_WIND: u32 = 1 << 5;
    pub const MAG_SUPPRESSED: u32 = 1 << 6;
    pub const LRF_STALE: u32 = 1 << 7;
}

// ---------------------------------------------------------------------------
// Drag families
// ---------------------------------------------------------------------------

/// Standard reference drag curve selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DragFamily {
    #[default]
    G1,
    G2,
    G3,
    G4,
    G5,
    G6,
    G7,
    G8,
}

impl DragFamily {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "G1" => Some(Self::G1),
            "G2" => Some(Self::G2),
            "G3" => Some(Self::G3),
            "G4" => Some(Self::G4),
            "G5" => Some(Self::G5),
            "G6" => Some(Self::G6),
            "G7" => Some(Self::G7),
            "G8" => Some(Self::G8),
            _ => None,
        }
    }
}

impl std::fmt::Display for DragFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ---------------------------------------------------------------------------
// Attitude algorithm selection
// ---------------------------------------------------------------------------

/// Which orientation filter the attitude manager runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttitudeAlgorithm {
    /// Gradient-descent filter (β gain).
    #[default]
    Madgwick,
    /// Complementary filter (Kp/Ki gains).
    Mahony,
}

// ---------------------------------------------------------------------------
// Sensor frame
// ---------------------------------------------------------------------------

/// One tick of sensor input. Value semantics; an invalid channel's numeric
/// payload never affects engine state.
#[derive(Debug, Clone, Copy)]
pub struct SensorFrame {
    /// Monotonic timestamp (µs since boot).
    pub timestamp_us: u64,

    /// Accelerometer (m/s²).
    pub accel: Vector3<f64>,
    /// Gyroscope (rad/s).
    pub gyro: Vector3<f64>,
    pub imu_valid: bool,

    /// Magnetometer (µT).
    pub mag: Vector3<f64>,
    pub mag_valid: bool,

    /// Barometer pressure (Pa).
    pub baro_pressure_pa: f64,
    /// Barometer temperature (°C).
    pub baro_temperature_c: f64,
    /// Relative humidity (0–1). Only meaningful when `baro_humidity_valid`.
    pub baro_humidity: f64,
    pub baro_valid: bool,
    pub baro_humidity_valid: bool,

    /// Rangefinder slant range (m).
    pub lrf_range_m: f64,
    /// Timestamp of the rangefinder reading (µs).
    pub lrf_timestamp_us: u64,
    /// Rangefinder confidence in [0, 1]; ≤ 0 means unprovided.
    pub lrf_confidence: f64,
    pub lrf_valid: bool,

    /// Zoom encoder focal length (mm).
    pub encoder_focal_length_mm: f64,
    pub encoder_valid: bool,
}

impl Default for SensorFrame {
    fn default() -> Self {
        Self {
            timestamp_us: 0,
            accel: Vector3::zeros(),
            gyro: Vector3::zeros(),
            imu_valid: false,
            mag: Vector3::zeros(),
            mag_valid: false,
            baro_pressure_pa: 0.0,
            baro_temperature_c: 0.0,
            baro_humidity: 0.0,
            baro_valid: false,
            baro_humidity_valid: false,
            lrf_range_m: 0.0,
            lrf_timestamp_us: 0,
            lrf_confidence: 0.0,
            lrf_valid: false,
            encoder_focal_length_mm: 0.0,
            encoder_valid: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Bullet profile
// ---------------------------------------------------------------------------

/// Cartridge description supplied by the caller. Replacing the profile marks
/// the zero solution dirty.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BulletProfile {
    /// Ballistic coefficient at standard conditions.
    pub bc: f64,
    /// Reference drag curve (G1–G8).
    pub drag_family: DragFamily,
    /// Muzzle velocity (m/s) from a 24-inch reference barrel.
    pub muzzle_velocity_ms: f64,
    /// Actual barrel length (inches).
    pub barrel_length_in: f64,
    /// Muzzle-velocity adjustment (fps per inch of deviation from 24").
    pub mv_adjustment_factor: f64,
    /// Projectile mass (grains).
    pub mass_grains: f64,
    /// Projectile length (mm).
    pub length_mm: f64,
    /// Caliber (inches).
    pub caliber_inches: f64,
    /// Signed twist rate in inches per turn; positive = right-hand.
    pub twist_rate_inches: f64,
}

// ---------------------------------------------------------------------------
// Zero configuration
// ---------------------------------------------------------------------------

/// Sight zeroing: a single range plus sight height above bore.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ZeroConfig {
    /// Zero range (m). Valid: 1 ≤ r ≤ `MAX_RANGE_M`.
    pub zero_range_m: f64,
    /// Sight height above the bore axis (mm).
    pub sight_height_mm: f64,
}

// ---------------------------------------------------------------------------
// Default overrides
// ---------------------------------------------------------------------------

/// Per-channel default overrides. An override only affects a channel while
/// the corresponding sensor has never produced a reading.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DefaultOverrides {
    pub use_altitude: bool,
    pub altitude_m: f64,

    pub use_pressure: bool,
    pub pressure_pa: f64,

    pub use_temperature: bool,
    pub temperature_c: f64,

    pub use_humidity: bool,
    pub humidity_fraction: f64,

    pub use_wind: bool,
    pub wind_speed_ms: f64,
    pub wind_heading_deg: f64,

    pub use_latitude: bool,
    pub latitude_deg: f64,
}

// ---------------------------------------------------------------------------
// Mechanical offsets
// ---------------------------------------------------------------------------

/// An affine hold offset in MOA (boresight or reticle).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OffsetMoa {
    pub vertical_moa: f64,
    pub horizontal_moa: f64,
}

// ---------------------------------------------------------------------------
// Firing solution
// ---------------------------------------------------------------------------

/// Complete output snapshot. Assembled in a local value and copied out;
/// callers never observe a torn solution.
///
/// Sign conventions: positive windage = right hold, positive elevation =
/// up hold.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FiringSolution {
    /// Mirrors the operating mode at assembly time.
    pub solution_mode: Mode,
    /// Fault bitfield (see [`fault`]).
    pub fault_flags: u32,
    /// Diagnostic bitfield (see [`diag`]).
    pub diag_flags: u32,

    /// Total elevation hold (MOA).
    pub hold_elevation_moa: f64,
    /// Total windage hold (MOA).
    pub hold_windage_moa: f64,

    /// Slant range to target (m).
    pub range_m: f64,
    /// Horizontal component of the range (m).
    pub horizontal_range_m: f64,
    /// Time of flight (ms).
    pub tof_ms: f64,
    /// Remaining velocity at the target (m/s).
    pub velocity_at_target_ms: f64,
    /// Remaining kinetic energy at the target (J).
    pub energy_at_target_j: f64,

    /// Coriolis windage component (MOA).
    pub coriolis_windage_moa: f64,
    /// Eötvös elevation component (MOA).
    pub coriolis_elevation_moa: f64,
    /// Spin drift component (MOA).
    pub spin_drift_moa: f64,
    /// Windage from wind alone (MOA).
    pub wind_only_windage_moa: f64,
    /// Coriolis + spin drift total (MOA).
    pub earth_spin_windage_moa: f64,
    /// Boresight + reticle horizontal offsets (MOA).
    pub offsets_windage_moa: f64,
    /// Windage contribution induced by cant (MOA).
    pub cant_windage_moa: f64,

    /// Current cant / roll angle (deg).
    pub cant_angle_deg: f64,
    /// True heading from attitude + declination (deg).
    pub heading_deg_true: f64,

    /// Computed air density (kg/m³).
    pub air_density_kgm3: f64,
}
