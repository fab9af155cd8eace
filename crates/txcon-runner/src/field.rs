//! Magnetic field around a straight wire, tabulated by the `custom` command.

use std::f64::consts::PI;

/// Vacuum permeability μ0, in T·m/A.
pub const VACUUM_PERMEABILITY: f64 = 4.0 * PI * 1e-7;

/// Largest current in the table, exclusive.
pub const MAX_CURRENT_A: f64 = 2.0;

/// One row of the table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSample {
    pub field_ut: f64,
    pub distance_mm: f64,
    pub current_a: f64,
}

/// Field in microtesla at `distance_m` from a wire carrying `current_a`:
/// B = μ0·I / (2π·d).
pub fn magnetic_field_ut(current_a: f64, distance_m: f64) -> f64 {
    VACUUM_PERMEABILITY * current_a / (2.0 * PI * distance_m) * 1e6
}

/// Currents 0.2 A to 1.8 A in 0.2 A steps, each at 0.1 mm to 0.9 mm in
/// 0.1 mm steps.
pub fn field_table() -> Vec<FieldSample> {
    let current_step = MAX_CURRENT_A / 10.0;
    (1..10)
        .flat_map(|i| {
            let current_a = current_step * i as f64;
            (1..10).map(move |j| {
                let distance_m = 0.0001 * j as f64;
                FieldSample {
                    field_ut: magnetic_field_ut(current_a, distance_m),
                    distance_mm: distance_m * 1000.0,
                    current_a,
                }
            })
        })
        .collect()
}
