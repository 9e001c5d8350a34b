use anyhow::{bail, Result};
use ballistic_core::{
    constants, fault, AttitudeAlgorithm, BulletProfile, DefaultOverrides, DragFamily, Engine,
    FiringSolution, Mode, SensorFrame, ZeroConfig,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use nalgebra::Vector3;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "bce")]
#[command(version)]
#[command(about = "Ballistic core engine driver", long_about = None)]
struct Cli {
    /// Output format
    #[arg(short = 'f', long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, PartialEq, ValueEnum)]
enum DragFamilyArg {
    G1,
    G2,
    G3,
    G4,
    G5,
    G6,
    G7,
    G8,
}

impl From<DragFamilyArg> for DragFamily {
    fn from(arg: DragFamilyArg) -> Self {
        match arg {
            DragFamilyArg::G1 => DragFamily::G1,
            DragFamilyArg::G2 => DragFamily::G2,
            DragFamilyArg::G3 => DragFamily::G3,
            DragFamilyArg::G4 => DragFamily::G4,
            DragFamilyArg::G5 => DragFamily::G5,
            DragFamilyArg::G6 => DragFamily::G6,
            DragFamilyArg::G7 => DragFamily::G7,
            DragFamilyArg::G8 => DragFamily::G8,
        }
    }
}

#[derive(Clone, Copy, PartialEq, ValueEnum)]
enum AttitudeArg {
    Madgwick,
    Mahony,
}

#[derive(Args)]
struct Scenario {
    /// Ballistic coefficient
    #[arg(short = 'b', long)]
    bc: f64,

    /// Drag model
    #[arg(long, default_value = "g1")]
    drag_model: DragFamilyArg,

    /// Muzzle velocity (m/s)
    #[arg(short = 'v', long)]
    mv: f64,

    /// Bullet mass (grains)
    #[arg(short = 'm', long)]
    mass: f64,

    /// Caliber (inches)
    #[arg(short = 'd', long, default_value = "0.308")]
    caliber: f64,

    /// Twist rate (inches per turn, negative = left-hand)
    #[arg(short = 't', long, default_value = "0")]
    twist: f64,

    /// Barrel length (inches)
    #[arg(long, default_value = "24")]
    barrel_length: f64,

    /// Muzzle velocity adjustment (fps per inch from the 24 in reference)
    #[arg(long, default_value = "0")]
    mv_adjustment: f64,

    /// Target range (m)
    #[arg(short = 'r', long)]
    range: f64,

    /// Zero range (m)
    #[arg(short = 'z', long, default_value = "100")]
    zero_range: f64,

    /// Sight height above bore (mm)
    #[arg(long, default_value = "38.1")]
    sight_height: f64,

    /// Station pressure (Pa)
    #[arg(long)]
    pressure: Option<f64>,

    /// Temperature (°C)
    #[arg(long)]
    temperature: Option<f64>,

    /// Relative humidity (0-1)
    #[arg(long)]
    humidity: Option<f64>,

    /// Station altitude (m)
    #[arg(long)]
    altitude: Option<f64>,

    /// Wind speed (m/s)
    #[arg(long, default_value = "0")]
    wind_speed: f64,

    /// Wind heading the wind blows from (deg true)
    #[arg(long, default_value = "0")]
    wind_heading: f64,

    /// Shooter latitude (deg) for Coriolis
    #[arg(long)]
    latitude: Option<f64>,

    /// Attitude filter
    #[arg(long, default_value = "madgwick")]
    attitude: AttitudeArg,

    /// External-reference calibration mode (0.84 drag reference scale)
    #[arg(long)]
    external_reference: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a firing solution for a single target range
    Solve {
        #[command(flatten)]
        scenario: Scenario,
    },

    /// Print the per-meter trajectory table
    Table {
        #[command(flatten)]
        scenario: Scenario,

        /// Table stride (m)
        #[arg(long, default_value = "50")]
        step: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve { scenario } => {
            let engine = run_scenario(&scenario)?;
            print_solution(&engine.solution(), cli.format)?;
        }
        Commands::Table { scenario, step } => {
            let engine = run_scenario(&scenario)?;
            print_table(&engine, scenario.range, step.max(1), cli.format)?;
        }
    }

    Ok(())
}

/// Configure an engine and stream synthetic static frames until the
/// attitude window settles and a solution is published.
fn run_scenario(scenario: &Scenario) -> Result<Engine> {
    let mut engine = Engine::new();

    engine.set_bullet(BulletProfile {
        bc: scenario.bc,
        drag_family: scenario.drag_model.into(),
        muzzle_velocity_ms: scenario.mv,
        barrel_length_in: scenario.barrel_length,
        mv_adjustment_factor: scenario.mv_adjustment,
        mass_grains: scenario.mass,
        length_mm: 0.0,
        caliber_inches: scenario.caliber,
        twist_rate_inches: scenario.twist,
    });
    engine.set_zero(ZeroConfig {
        zero_range_m: scenario.zero_range,
        sight_height_mm: scenario.sight_height,
    });
    engine.set_attitude_algorithm(match scenario.attitude {
        AttitudeArg::Madgwick => AttitudeAlgorithm::Madgwick,
        AttitudeArg::Mahony => AttitudeAlgorithm::Mahony,
    });
    engine.set_external_reference_mode(scenario.external_reference);

    if let Some(lat) = scenario.latitude {
        engine.set_latitude(lat);
    }
    if scenario.wind_speed > 0.0 {
        engine.set_wind_manual(scenario.wind_speed, scenario.wind_heading);
    }
    if let Some(altitude) = scenario.altitude {
        engine.set_default_overrides(DefaultOverrides {
            use_altitude: true,
            altitude_m: altitude,
            ..Default::default()
        });
    }

    let pressure = scenario.pressure.unwrap_or(constants::DEFAULT_PRESSURE_PA);
    let temperature = scenario
        .temperature
        .unwrap_or(constants::DEFAULT_TEMPERATURE_C);

    // Flat, stationary device; enough frames for the static window
    for i in 0..100u64 {
        let timestamp_us = (i + 1) * 10_000;
        let mut frame = SensorFrame {
            timestamp_us,
            accel: Vector3::new(0.0, 0.0, constants::GRAVITY),
            gyro: Vector3::zeros(),
            imu_valid: true,
            baro_pressure_pa: pressure,
            baro_temperature_c: temperature,
            baro_valid: true,
            ..Default::default()
        };
        if let Some(h) = scenario.humidity {
            frame.baro_humidity = h;
            frame.baro_humidity_valid = true;
        }
        frame.lrf_valid = true;
        frame.lrf_range_m = scenario.range;
        frame.lrf_timestamp_us = timestamp_us;
        frame.lrf_confidence = 1.0;

        engine.update(&frame);
    }

    if engine.mode() != Mode::SolutionReady {
        bail!(
            "no solution: mode={} faults=[{}]",
            engine.mode().label(),
            fault_names(engine.fault_flags()).join(", ")
        );
    }

    Ok(engine)
}

fn fault_names(flags: u32) -> Vec<&'static str> {
    let table = [
        (fault::NO_RANGE, "no-range"),
        (fault::NO_BULLET, "no-bullet"),
        (fault::NO_MV, "no-mv"),
        (fault::NO_BC, "no-bc"),
        (fault::ZERO_UNSOLVABLE, "zero-unsolvable"),
        (fault::AHRS_UNSTABLE, "ahrs-unstable"),
        (fault::SENSOR_INVALID, "sensor-invalid"),
    ];
    table
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

fn print_solution(solution: &FiringSolution, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(solution)?),
        OutputFormat::Table => {
            println!("Firing solution @ {:.0} m", solution.range_m);
            println!("  elevation hold:  {:+.2} MOA", solution.hold_elevation_moa);
            println!("  windage hold:    {:+.2} MOA", solution.hold_windage_moa);
            println!("  time of flight:  {:.0} ms", solution.tof_ms);
            println!(
                "  at target:       {:.0} m/s, {:.0} J",
                solution.velocity_at_target_ms, solution.energy_at_target_j
            );
            println!("  corrections (MOA):");
            println!("    wind:          {:+.2}", solution.wind_only_windage_moa);
            println!("    spin drift:    {:+.2}", solution.spin_drift_moa);
            println!(
                "    coriolis:      {:+.2} elev, {:+.2} wind",
                solution.coriolis_elevation_moa, solution.coriolis_windage_moa
            );
            println!("    offsets:       {:+.2}", solution.offsets_windage_moa);
            println!("    cant:          {:+.2}", solution.cant_windage_moa);
            println!(
                "  cant {:.1}°, heading {:.1}°, air density {:.3} kg/m³",
                solution.cant_angle_deg, solution.heading_deg_true, solution.air_density_kgm3
            );
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct TableRow {
    range_m: usize,
    drop_m: f64,
    windage_m: f64,
    velocity_ms: f64,
    tof_s: f64,
    energy_j: f64,
}

fn print_table(engine: &Engine, range: f64, step: usize, format: OutputFormat) -> Result<()> {
    let end = (range as usize).min(engine.max_valid_range());
    let rows: Vec<TableRow> = (0..=end)
        .step_by(step)
        .filter_map(|r| {
            engine.trajectory_point(r).map(|p| TableRow {
                range_m: r,
                drop_m: p.drop_m,
                windage_m: p.windage_m,
                velocity_ms: p.velocity_ms,
                tof_s: p.tof_s,
                energy_j: p.energy_j,
            })
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Table => {
            println!(
                "{:>7} {:>10} {:>10} {:>9} {:>8} {:>9}",
                "range", "drop", "windage", "velocity", "tof", "energy"
            );
            for row in rows {
                println!(
                    "{:>6}m {:>9.3}m {:>9.3}m {:>7.1}m/s {:>7.3}s {:>8.0}J",
                    row.range_m, row.drop_m, row.windage_m, row.velocity_ms, row.tof_s, row.energy_j
                );
            }
        }
    }
    Ok(())
}
