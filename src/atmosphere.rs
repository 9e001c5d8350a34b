//! Atmospheric model: air density, speed of sound, and BC correction.
//!
//! Density follows the ideal gas law for dry air with a humidity correction
//! via virtual temperature:
//!
//! ```text
//! Tv = T · (1 + 0.378 · e / P)        e = RH · e_sat (Buck)
//! ρ  = P / (R_dry · Tv)
//! c  ≈ 20.05 · √Tv
//! ```
//!
//! The ballistic coefficient correction is the classical 4-factor form
//! (altitude, temperature, pressure, humidity) against the reference
//! atmosphere. Internal imperial conversions are confined to that formula.

use log::trace;

use crate::constants::{
    DEFAULT_ALTITUDE_M, DEFAULT_HUMIDITY, DEFAULT_PRESSURE_PA, DEFAULT_TEMPERATURE_C,
    KELVIN_OFFSET, R_DRY_AIR, SPEED_OF_SOUND_15C, STD_AIR_DENSITY, STD_PRESSURE_PA,
    ZERO_RECOMPUTE_BC_FACTOR_DELTA, ZERO_RECOMPUTE_DENSITY_DELTA, ZERO_RECOMPUTE_SOS_DELTA,
};
use crate::types::{diag, DefaultOverrides};

// Imperial conversion factors for the reference BC formula
const M_TO_FT: f64 = 3.28084;
const PA_TO_INHG: f64 = 0.00029530;
const C_TO_F_OFFSET: f64 = 32.0;
const C_TO_F_SCALE: f64 = 1.8;

/// Atmospheric state and derived quantities.
///
/// Every update or default application triggers a recompute; if the derived
/// quantities move past their thresholds a pending zero-recompute hint is
/// raised for the orchestrator to consume.
#[derive(Debug, Clone)]
pub struct Atmosphere {
    pressure_pa: f64,
    temperature_c: f64,
    humidity: f64,
    altitude_m: f64,

    air_density: f64,
    speed_of_sound: f64,

    baro_offset_pa: f64,

    has_baro_pressure: bool,
    has_baro_temperature: bool,
    has_baro_humidity: bool,
    has_override_altitude: bool,
    has_override_pressure: bool,
    has_override_temp: bool,
    has_override_humidity: bool,
    had_invalid_input: bool,
    zero_recompute_hint: bool,

    last_bc_factor: f64,

    diag_flags: u32,
}

impl Atmosphere {
    /// ISA defaults, no sensor history.
    pub fn new() -> Self {
        let mut atmo = Self {
            pressure_pa: DEFAULT_PRESSURE_PA,
            temperature_c: DEFAULT_TEMPERATURE_C,
            humidity: DEFAULT_HUMIDITY,
            altitude_m: DEFAULT_ALTITUDE_M,
            air_density: STD_AIR_DENSITY,
            speed_of_sound: SPEED_OF_SOUND_15C,
            baro_offset_pa: 0.0,
            has_baro_pressure: false,
            has_baro_temperature: false,
            has_baro_humidity: false,
            has_override_altitude: false,
            has_override_pressure: false,
            has_override_temp: false,
            has_override_humidity: false,
            had_invalid_input: false,
            zero_recompute_hint: false,
            last_bc_factor: 1.0,
            diag_flags: 0,
        };
        atmo.recompute();
        atmo.zero_recompute_hint = false;
        atmo
    }

    /// Ingest a barometer reading. `humidity` is the relative humidity
    /// fraction when the frame carried one.
    ///
    /// Pressure is clamped to [1 000, 120 000] Pa, temperature to
    /// [-80, +80] °C, humidity to [0, 1]; non-finite values fall back to
    /// ISA defaults. Any sanitisation latches the invalid-input flag.
    pub fn update_from_baro(&mut self, pressure_pa: f64, temperature_c: f64, humidity: Option<f64>) {
        self.had_invalid_input = false;

        self.has_baro_pressure = true;
        self.has_baro_temperature = true;

        let mut corrected_pressure = pressure_pa + self.baro_offset_pa;
        if !corrected_pressure.is_finite() {
            corrected_pressure = DEFAULT_PRESSURE_PA;
            self.had_invalid_input = true;
        }
        if corrected_pressure < 1000.0 {
            corrected_pressure = 1000.0;
            self.had_invalid_input = true;
        }
        if corrected_pressure > 120_000.0 {
            corrected_pressure = 120_000.0;
            self.had_invalid_input = true;
        }
        self.pressure_pa = corrected_pressure;

        let mut safe_temp = temperature_c;
        if !safe_temp.is_finite() {
            safe_temp = DEFAULT_TEMPERATURE_C;
            self.had_invalid_input = true;
        }
        if safe_temp < -80.0 {
            safe_temp = -80.0;
            self.had_invalid_input = true;
        }
        if safe_temp > 80.0 {
            safe_temp = 80.0;
            self.had_invalid_input = true;
        }
        self.temperature_c = safe_temp;

        if let Some(h) = humidity {
            if h.is_finite() {
                self.has_baro_humidity = true;
                if (0.0..=1.0).contains(&h) {
                    self.humidity = h;
                } else {
                    self.humidity = h.clamp(0.0, 1.0);
                    self.had_invalid_input = true;
                }
            } else {
                // Non-finite on a channel marked present: flag it, keep the
                // last good humidity.
                self.had_invalid_input = true;
            }
        }

        if self.had_invalid_input {
            trace!(
                "baro input sanitised: p={pressure_pa} t={temperature_c} rh={humidity:?}"
            );
        }

        self.recompute();
    }

    /// Apply per-channel default overrides. Channels with sensor history
    /// keep their sensor values.
    pub fn apply_defaults(&mut self, ovr: &DefaultOverrides) {
        if ovr.use_altitude {
            self.has_override_altitude = true;
            self.altitude_m = ovr.altitude_m;
        }
        if ovr.use_pressure {
            self.has_override_pressure = true;
            if !self.has_baro_pressure {
                self.pressure_pa = ovr.pressure_pa;
            }
        }
        if ovr.use_temperature {
            self.has_override_temp = true;
            if !self.has_baro_temperature {
                self.temperature_c = ovr.temperature_c;
            }
        }
        if ovr.use_humidity {
            self.has_override_humidity = true;
            if !self.has_baro_humidity {
                self.humidity = ovr.humidity_fraction;
            }
        }
        self.recompute();
    }

    /// Field calibration: shift the offset so the current reading lands on
    /// the standard sea-level reference after the next recompute.
    pub fn calibrate_baro(&mut self) {
        self.baro_offset_pa = STD_PRESSURE_PA - (self.pressure_pa - self.baro_offset_pa);
        self.recompute();
    }

    /// Current air density (kg/m³).
    pub fn air_density(&self) -> f64 {
        self.air_density
    }

    /// Current speed of sound (m/s).
    pub fn speed_of_sound(&self) -> f64 {
        self.speed_of_sound
    }

    /// Current pressure (Pa).
    pub fn pressure(&self) -> f64 {
        self.pressure_pa
    }

    /// Current temperature (°C).
    pub fn temperature(&self) -> f64 {
        self.temperature_c
    }

    /// Current humidity fraction.
    pub fn humidity(&self) -> f64 {
        self.humidity
    }

    /// Station altitude (m).
    pub fn altitude(&self) -> f64 {
        self.altitude_m
    }

    /// Which atmosphere channels are still running on defaults.
    pub fn diag_flags(&self) -> u32 {
        self.diag_flags
    }

    /// True if the most recent baro update contained non-physical inputs
    /// that were sanitised.
    pub fn had_invalid_input(&self) -> bool {
        self.had_invalid_input
    }

    /// Returns and clears the pending zero-recompute hint.
    pub fn consume_zero_recompute_hint(&mut self) -> bool {
        let pending = self.zero_recompute_hint;
        self.zero_recompute_hint = false;
        pending
    }

    fn recompute(&mut self) {
        let prev_density = self.air_density;
        let prev_sos = self.speed_of_sound;
        let prev_bc_factor = self.last_bc_factor;

        self.diag_flags = 0;
        if !self.has_baro_pressure && !self.has_override_pressure {
            self.diag_flags |= diag::DEFAULT_PRESSURE;
        }
        if !self.has_baro_temperature && !self.has_override_temp {
            self.diag_flags |= diag::DEFAULT_TEMP;
        }
        if !self.has_baro_humidity && !self.has_override_humidity {
            self.diag_flags |= diag::DEFAULT_HUMIDITY;
        }
        if !self.has_override_altitude {
            self.diag_flags |= diag::DEFAULT_ALTITUDE;
        }

        let mut t_kelvin = self.temperature_c + KELVIN_OFFSET;
        if t_kelvin < 1.0 {
            t_kelvin = 1.0;
        }

        let mut pressure_pa = self.pressure_pa;
        if !pressure_pa.is_finite() || pressure_pa < 1000.0 {
            pressure_pa = 1000.0;
            self.had_invalid_input = true;
        }

        let mut humidity = self.humidity;
        if !humidity.is_finite() {
            humidity = DEFAULT_HUMIDITY;
            self.had_invalid_input = true;
        }
        if humidity < 0.0 {
            humidity = 0.0;
            self.had_invalid_input = true;
        }
        if humidity > 1.0 {
            humidity = 1.0;
            self.had_invalid_input = true;
        }

        // Saturation vapor pressure, Buck approximation (Pa)
        let t = self.temperature_c;
        let e_sat = 611.21 * ((18.678 - t / 234.5) * (t / (257.14 + t))).exp();
        let e_vapor = humidity * e_sat;

        let mut t_virtual = t_kelvin * (1.0 + 0.378 * e_vapor / pressure_pa);
        if !t_virtual.is_finite() || t_virtual < 1.0 {
            t_virtual = 1.0;
            self.had_invalid_input = true;
        }

        self.air_density = pressure_pa / (R_DRY_AIR * t_virtual);
        self.speed_of_sound = 20.05 * t_virtual.sqrt();

        let current_bc_factor = self.correct_bc(1.0);
        if (current_bc_factor - prev_bc_factor).abs() >= ZERO_RECOMPUTE_BC_FACTOR_DELTA
            || (self.air_density - prev_density).abs() >= ZERO_RECOMPUTE_DENSITY_DELTA
            || (self.speed_of_sound - prev_sos).abs() >= ZERO_RECOMPUTE_SOS_DELTA
        {
            self.zero_recompute_hint = true;
        }
        self.last_bc_factor = current_bc_factor;
    }

    /// Corrected BC for the current atmosphere.
    ///
    /// Combines four dimensionless factors against the reference atmosphere:
    ///
    /// ```text
    /// BC' = BC · FA · (1 + FT − FP) · FR
    /// ```
    ///
    /// FA altitude, FT temperature, FP pressure, FR humidity. The corrected
    /// value never drops below 0.01.
    pub fn correct_bc(&self, bc_standard: f64) -> f64 {
        let alt_ft = self.altitude_m * M_TO_FT;
        let press_inhg = self.pressure_pa * PA_TO_INHG;
        let temp_f = self.temperature_c * C_TO_F_SCALE + C_TO_F_OFFSET;

        // Reference values at sea level, 15 °C
        const STD_PRESS_INHG: f64 = 29.5300;
        const STD_TEMP_F: f64 = 59.0;

        let mut fa = 1.0 - 3.158e-5 * alt_ft;
        if fa < 0.5 {
            fa = 0.5;
        }

        let ft = (temp_f - STD_TEMP_F) / (STD_TEMP_F + 460.0);
        let fp = (STD_PRESS_INHG - press_inhg) / STD_PRESS_INHG;

        let humidity_pct = self.humidity * 100.0;
        let fr = 1.0 + 0.00002 * (humidity_pct - 50.0);

        let bc_corrected = bc_standard * fa * (1.0 + ft - fp) * fr;

        bc_corrected.max(0.01)
    }
}

impl Default for Atmosphere {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isa_density_and_speed_of_sound() {
        let mut atmo = Atmosphere::new();
        atmo.update_from_baro(101325.0, 15.0, Some(0.0));
        assert!((atmo.air_density() - 1.225).abs() < 0.01);
        assert!((atmo.speed_of_sound() - 340.0).abs() < 2.0);
    }

    #[test]
    fn test_humid_air_is_less_dense() {
        let mut dry = Atmosphere::new();
        dry.update_from_baro(101325.0, 15.0, Some(0.0));
        let mut humid = Atmosphere::new();
        humid.update_from_baro(101325.0, 15.0, Some(1.0));
        assert!(humid.air_density() < dry.air_density());
        assert!(humid.speed_of_sound() > dry.speed_of_sound());
    }

    #[test]
    fn test_pressure_clamped_and_flagged() {
        let mut atmo = Atmosphere::new();
        atmo.update_from_baro(100.0, 15.0, None);
        assert!(atmo.had_invalid_input());
        assert_eq!(atmo.pressure(), 1000.0);

        atmo.update_from_baro(500_000.0, 15.0, None);
        assert!(atmo.had_invalid_input());
        assert_eq!(atmo.pressure(), 120_000.0);
    }

    #[test]
    fn test_nonfinite_inputs_fall_back_to_defaults() {
        let mut atmo = Atmosphere::new();
        atmo.update_from_baro(f64::NAN, f64::INFINITY, Some(f64::NAN));
        assert!(atmo.had_invalid_input());
        assert_eq!(atmo.pressure(), DEFAULT_PRESSURE_PA);
        assert_eq!(atmo.temperature(), DEFAULT_TEMPERATURE_C);
        assert!(atmo.air_density().is_finite());
        assert!(atmo.speed_of_sound().is_finite());
    }

    #[test]
    fn test_valid_update_clears_invalid_flag() {
        let mut atmo = Atmosphere::new();
        atmo.update_from_baro(f64::NAN, 15.0, None);
        assert!(atmo.had_invalid_input());
        atmo.update_from_baro(101325.0, 15.0, Some(0.5));
        assert!(!atmo.had_invalid_input());
    }

    #[test]
    fn test_default_diag_flags() {
        let atmo = Atmosphere::new();
        let flags = atmo.diag_flags();
        assert_ne!(flags & diag::DEFAULT_PRESSURE, 0);
        assert_ne!(flags & diag::DEFAULT_TEMP, 0);
        assert_ne!(flags & diag::DEFAULT_HUMIDITY, 0);
        assert_ne!(flags & diag::DEFAULT_ALTITUDE, 0);
    }

    #[test]
    fn test_baro_reading_clears_default_flags() {
        let mut atmo = Atmosphere::new();
        atmo.update_from_baro(101325.0, 15.0, Some(0.5));
        let flags = atmo.diag_flags();
        assert_eq!(flags & diag::DEFAULT_PRESSURE, 0);
        assert_eq!(flags & diag::DEFAULT_TEMP, 0);
        assert_eq!(flags & diag::DEFAULT_HUMIDITY, 0);
        // Altitude has no sensor; still on its default
        assert_ne!(flags & diag::DEFAULT_ALTITUDE, 0);
    }

    #[test]
    fn test_override_does_not_shadow_sensor() {
        let mut atmo = Atmosphere::new();
        atmo.update_from_baro(95_000.0, 20.0, Some(0.3));
        let ovr = DefaultOverrides {
            use_pressure: true,
            pressure_pa: 80_000.0,
            use_temperature: true,
            temperature_c: -10.0,
            ..Default::default()
        };
        atmo.apply_defaults(&ovr);
        assert_eq!(atmo.pressure(), 95_000.0);
        assert_eq!(atmo.temperature(), 20.0);
    }

    #[test]
    fn test_override_applies_without_sensor() {
        let mut atmo = Atmosphere::new();
        let ovr = DefaultOverrides {
            use_pressure: true,
            pressure_pa: 80_000.0,
            ..Default::default()
        };
        atmo.apply_defaults(&ovr);
        assert_eq!(atmo.pressure(), 80_000.0);
        assert_eq!(atmo.diag_flags() & diag::DEFAULT_PRESSURE, 0);
    }

    #[test]
    fn test_zero_recompute_hint_on_big_change() {
        let mut atmo = Atmosphere::new();
        atmo.update_from_baro(101325.0, 15.0, Some(0.5));
        atmo.consume_zero_recompute_hint();

        // Large pressure drop moves density well past its threshold
        atmo.update_from_baro(76_000.0, 35.0, Some(0.1));
        assert!(atmo.consume_zero_recompute_hint());
        // Consumption clears it
        assert!(!atmo.consume_zero_recompute_hint());
    }

    #[test]
    fn test_no_hint_on_identical_reading() {
        let mut atmo = Atmosphere::new();
        atmo.update_from_baro(101325.0, 15.0, Some(0.5));
        atmo.consume_zero_recompute_hint();
        atmo.update_from_baro(101325.0, 15.0, Some(0.5));
        assert!(!atmo.consume_zero_recompute_hint());
    }

    #[test]
    fn test_bc_correction_near_unity_at_reference() {
        // The reference pressure is the 29.53 inHg Army Metro standard, so
        // ISA sea level sits a hair above unity
        let mut atmo = Atmosphere::new();
        atmo.update_from_baro(101325.0, 15.0, Some(0.5));
        let factor = atmo.correct_bc(1.0);
        assert!((factor - 1.0).abs() < 0.02, "factor = {factor}");
    }

    #[test]
    fn test_bc_correction_never_below_floor() {
        let mut atmo = Atmosphere::new();
        atmo.update_from_baro(1000.0, -80.0, Some(0.0));
        assert!(atmo.correct_bc(0.001) >= 0.01);
    }

    #[test]
    fn test_bc_correction_factor_directions() {
        // Hot air at standard pressure raises the corrected BC
        let mut hot = Atmosphere::new();
        hot.update_from_baro(101325.0, 35.0, Some(0.5));
        assert!(hot.correct_bc(0.5) > 0.5);

        // Low station pressure lowers it: the density change itself is
        // carried by the drag term, the correction tracks the reference
        // formula's pressure factor
        let mut thin = Atmosphere::new();
        thin.update_from_baro(76_000.0, 15.0, Some(0.5));
        assert!(thin.correct_bc(0.5) < 0.5);
    }

    #[test]
    fn test_baro_calibration_shifts_to_reference() {
        let mut atmo = Atmosphere::new();
        atmo.update_from_baro(95_000.0, 15.0, None);
        atmo.calibrate_baro();
        atmo.update_from_baro(95_000.0, 15.0, None);
        assert!((atmo.pressure() - STD_PRESSURE_PA).abs() < 1e-6);
    }
}
