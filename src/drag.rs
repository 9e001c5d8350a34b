//! Standard drag curve lookup and retardation.
//!
//! Each reference family (G1–G8) is a tabulation of drag coefficient versus
//! Mach number for a standard projectile shape. Lookup is a binary search
//! over the `(Mach, Cd)` points followed by linear interpolation; values
//! outside the tabulated span clamp to the end points.

use crate::constants::{BALLISTIC_DRAG_CONSTANT, STD_AIR_DENSITY};
use crate::types::DragFamily;

/// G1 — flat-base spitzer reference projectile.
const G1_TABLE: &[(f64, f64)] = &[
    (0.0, 0.2629),
    (0.5, 0.2695),
    (0.6, 0.2752),
    (0.7, 0.2817),
    (0.8, 0.2902),
    (0.9, 0.3012),
    (1.0, 0.4805),
    (1.1, 0.5933),
    (1.2, 0.6318),
    (1.3, 0.6440),
    (1.4, 0.6444),
    (1.5, 0.6372),
    (1.6, 0.6252),
    (1.7, 0.6105),
    (1.8, 0.5956),
    (1.9, 0.5815),
    (2.0, 0.5934),
    (2.5, 0.5598),
    (3.0, 0.5133),
    (4.0, 0.4811),
    (5.0, 0.4988),
];

/// G2 — Aberdeen J conical-point boattail.
const G2_TABLE: &[(f64, f64)] = &[
    (0.0, 0.2303),
    (0.5, 0.2256),
    (0.7, 0.2217),
    (0.8, 0.2243),
    (0.9, 0.2467),
    (0.95, 0.2777),
    (1.0, 0.3199),
    (1.05, 0.3651),
    (1.1, 0.3984),
    (1.2, 0.4190),
    (1.3, 0.4218),
    (1.4, 0.4165),
    (1.5, 0.4067),
    (1.75, 0.3760),
    (2.0, 0.3474),
    (2.5, 0.3056),
    (3.0, 0.2764),
    (4.0, 0.2420),
    (5.0, 0.2213),
];

/// G3 — short blunt-nose reference shape.
const G3_TABLE: &[(f64, f64)] = &[
    (0.0, 0.2520),
    (0.5, 0.2491),
    (0.7, 0.2473),
    (0.8, 0.2524),
    (0.9, 0.2830),
    (0.95, 0.3350),
    (1.0, 0.4580),
    (1.1, 0.6411),
    (1.2, 0.6962),
    (1.3, 0.7059),
    (1.4, 0.7002),
    (1.5, 0.6882),
    (1.75, 0.6526),
    (2.0, 0.6166),
    (2.5, 0.5530),
    (3.0, 0.5042),
    (4.0, 0.4465),
    (5.0, 0.4096),
];

/// G4 — long conical-point flat-base shape.
const G4_TABLE: &[(f64, f64)] = &[
    (0.0, 0.2932),
    (0.5, 0.2875),
    (0.7, 0.2829),
    (0.8, 0.2855),
    (0.9, 0.3055),
    (0.95, 0.3440),
    (1.0, 0.4370),
    (1.1, 0.5880),
    (1.2, 0.6333),
    (1.3, 0.6417),
    (1.4, 0.6362),
    (1.5, 0.6247),
    (1.75, 0.5908),
    (2.0, 0.5565),
    (2.5, 0.4955),
    (3.0, 0.4474),
    (4.0, 0.3849),
    (5.0, 0.3448),
];

/// G5 — short boattail with 6.19-caliber tangent ogive.
const G5_TABLE: &[(f64, f64)] = &[
    (0.0, 0.1710),
    (0.5, 0.1719),
    (0.8, 0.1769),
    (0.9, 0.1886),
    (0.95, 0.2008),
    (1.0, 0.2901),
    (1.1, 0.3415),
    (1.2, 0.3669),
    (1.3, 0.3734),
    (1.4, 0.3723),
    (1.5, 0.3670),
    (1.75, 0.3457),
    (2.0, 0.3237),
    (2.5, 0.2839),
    (3.0, 0.2523),
    (4.0, 0.2103),
    (5.0, 0.1844),
];

/// G6 — flat-base spire point.
const G6_TABLE: &[(f64, f64)] = &[
    (0.0, 0.2617),
    (0.5, 0.2546),
    (0.8, 0.2510),
    (0.9, 0.2578),
    (0.95, 0.2713),
    (1.0, 0.3236),
    (1.1, 0.3898),
    (1.2, 0.4082),
    (1.3, 0.4072),
    (1.4, 0.3991),
    (1.5, 0.3878),
    (1.75, 0.3594),
    (2.0, 0.3337),
    (2.5, 0.2939),
    (3.0, 0.2658),
    (4.0, 0.2287),
    (5.0, 0.2069),
];

/// G7 — boat-tail spitzer reference projectile (modern long-range match).
const G7_TABLE: &[(f64, f64)] = &[
    (0.0, 0.1198),
    (0.5, 0.1197),
    (0.6, 0.1202),
    (0.7, 0.1213),
    (0.8, 0.1240),
    (0.9, 0.1294),
    (1.0, 0.3803),
    (1.1, 0.4015),
    (1.2, 0.4043),
    (1.3, 0.3956),
    (1.4, 0.3814),
    (1.5, 0.3663),
    (1.6, 0.3520),
    (1.7, 0.3398),
    (1.8, 0.3297),
    (1.9, 0.3221),
    (2.0, 0.2980),
    (2.5, 0.2731),
    (3.0, 0.2424),
    (4.0, 0.2196),
    (5.0, 0.1618),
];

/// G8 — flat-base with 10-caliber secant ogive.
const G8_TABLE: &[(f64, f64)] = &[
    (0.0, 0.2105),
    (0.5, 0.2054),
    (0.875, 0.2022),
    (0.925, 0.2181),
    (0.975, 0.2785),
    (1.0, 0.3211),
    (1.05, 0.3562),
    (1.1, 0.3669),
    (1.2, 0.3652),
    (1.3, 0.3555),
    (1.4, 0.3430),
    (1.5, 0.3300),
    (1.75, 0.3015),
    (2.0, 0.2772),
    (2.5, 0.2424),
    (3.0, 0.2173),
    (4.0, 0.1850),
    (5.0, 0.1672),
];

fn table_for(family: DragFamily) -> &'static [(f64, f64)] {
    match family {
        DragFamily::G1 => G1_TABLE,
        DragFamily::G2 => G2_TABLE,
        DragFamily::G3 => G3_TABLE,
        DragFamily::G4 => G4_TABLE,
        DragFamily::G5 => G5_TABLE,
        DragFamily::G6 => G6_TABLE,
        DragFamily::G7 => G7_TABLE,
        DragFamily::G8 => G8_TABLE,
    }
}

/// Drag coefficient `Cd(M)` for the given family.
///
/// Mach numbers below the first table point return the first Cd; above the
/// last point, the last Cd. Negative inputs are treated as zero.
pub fn drag_coefficient(family: DragFamily, mach: f64) -> f64 {
    let table = table_for(family);
    let mach = mach.max(0.0);

    let (first_mach, first_cd) = table[0];
    if mach <= first_mach {
        return first_cd;
    }
    let (last_mach, last_cd) = table[table.len() - 1];
    if mach >= last_mach {
        return last_cd;
    }

    // Binary search for the bracketing interval
    let mut lo = 0;
    let mut hi = table.len() - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if table[mid].0 <= mach {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let (m0, cd0) = table[lo];
    let (m1, cd1) = table[hi];
    let frac = (mach - m0) / (m1 - m0);
    cd0 + frac * (cd1 - cd0)
}

/// Drag deceleration (m/s²) for a projectile at the given velocity.
///
/// `bc_corrected` must already carry the atmospheric correction. The
/// conversion constant absorbs the reference projectile's sectional density
/// and area; see [`BALLISTIC_DRAG_CONSTANT`].
///
/// Velocities below 1 m/s and BCs below 1e-3 yield zero deceleration.
pub fn deceleration(
    velocity_ms: f64,
    speed_of_sound: f64,
    bc_corrected: f64,
    family: DragFamily,
    air_density: f64,
) -> f64 {
    if velocity_ms < 1.0 {
        return 0.0;
    }
    if bc_corrected < 1e-3 {
        return 0.0;
    }

    let mach = velocity_ms / speed_of_sound;
    let cd = drag_coefficient(family, mach);

    let density_ratio = air_density / STD_AIR_DENSITY;
    (cd * density_ratio * velocity_ms * velocity_ms) / (bc_corrected * BALLISTIC_DRAG_CONSTANT)
}
