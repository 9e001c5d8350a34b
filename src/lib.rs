//! # Ballistic Core Engine
//!
//! A deterministic, fixed-footprint firing-solution library. The engine
//! ingests a stream of sensor frames (IMU, magnetometer, barometer, laser
//! rangefinder, zoom encoder) plus cartridge and zero configuration, and
//! continuously publishes elevation/windage holds, time of flight,
//! remaining velocity and energy, and an itemised breakdown of corrections
//! (wind, spin drift, Coriolis/Eötvös, cant, mechanical offsets).
//!
//! The pipeline per frame: attitude estimation from IMU + magnetometer →
//! atmospheric model (density, speed of sound, BC correction) → rangefinder
//! gating → state machine → adaptive RK4 trajectory integration with a
//! 1-meter trajectory table and a binary-search zero-angle solver.
//!
//! Hard real-time discipline: a single heap allocation at construction
//! (the trajectory table), bounded iteration counts everywhere, and
//! deterministic single-threaded execution. Errors surface through the
//! mode / fault / diagnostic bitmaps, never through panics or `Result`s.
//!
//! ```no_run
//! use ballistic_core::{BulletProfile, DragFamily, Engine, SensorFrame, ZeroConfig};
//!
//! let mut engine = Engine::new();
//! engine.set_bullet(BulletProfile {
//!     bc: 0.505,
//!     drag_family: DragFamily::G1,
//!     muzzle_velocity_ms: 792.0,
//!     mass_grains: 175.0,
//!     caliber_inches: 0.308,
//!     twist_rate_inches: 10.0,
//!     ..Default::default()
//! });
//! engine.set_zero(ZeroConfig { zero_range_m: 100.0, sight_height_mm: 38.1 });
//!
//! // One frame per tick from the sensor stack:
//! let frame = SensorFrame::default();
//! engine.update(&frame);
//! let solution = engine.solution();
//! println!("{} MOA up", solution.hold_elevation_moa);
//! ```

pub mod atmosphere;
pub mod attitude;
pub mod cant;
pub mod constants;
pub mod drag;
pub mod engine;
pub mod madgwick;
pub mod mag;
pub mod mahony;
pub mod solver;
pub mod types;
pub mod wind;

pub use attitude::{AttitudeFilter, AttitudeManager, Quaternion};
pub use engine::Engine;
pub use madgwick::MadgwickFilter;
pub use mahony::MahonyFilter;
pub use solver::{BallisticSolver, SolverParams, SolverResult, TrajectoryPoint};
pub use types::{
    diag, fault, AttitudeAlgorithm, BulletProfile, DefaultOverrides, DragFamily, FiringSolution,
    Mode, OffsetMoa, SensorFrame, ZeroConfig,
};
