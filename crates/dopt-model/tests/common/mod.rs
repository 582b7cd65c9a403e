//! Fixtures shared by the dispatch integration tests.
//!
//! Horizons are kept short: the default backend is a pure-Rust branch and
//! bound, and every step adds at least one binary.

#![allow(dead_code)]

use dopt_core::DispatchConfig;
use dopt_model::{DispatchResult, SeriesTable};
use polars::prelude::*;

pub const HOUR: i64 = 3600;

/// Hourly timestamps starting 2024-07-01 00:00 UTC.
pub fn hourly(count: usize) -> Vec<i64> {
    let start = 1_719_792_000;
    (0..count as i64).map(|i| start + i * HOUR).collect()
}

/// Parse a configuration from JSON, the same way a file would be read.
pub fn config(json: serde_json::Value) -> DispatchConfig {
    serde_json::from_value(json).expect("fixture config must deserialize")
}

/// Flat $0.10/kWh tariff with a zero demand charge, PV enabled.
pub fn flat_tariff_config() -> serde_json::Value {
    serde_json::json!({
        "system": { "pv": true },
        "tariff": {
            "energy": { "0": 0.10 },
            "demand": { "0": 0.0 }
        }
    })
}

/// Load and PV for a sunny day: PV exceeds load around noon.
pub fn day_profile(count: usize) -> (Vec<f64>, Vec<f64>) {
    let load = (0..count).map(|t| 20.0 + 5.0 * ((t % 24) as f64 / 6.0).floor()).collect();
    let pv = (0..count)
        .map(|t| {
            let h = (t % 24) as f64;
            if (6.0..=18.0).contains(&h) {
                40.0 * (1.0 - ((h - 12.0) / 6.0).powi(2))
            } else {
                0.0
            }
        })
        .collect();
    (load, pv)
}

pub fn inputs(timestamps: Vec<i64>, columns: Vec<(&str, Vec<f64>)>) -> SeriesTable {
    SeriesTable::from_columns(timestamps, columns).expect("fixture inputs must build")
}

/// Single-node inputs with a period-0 energy map.
pub fn site_inputs(load: Vec<f64>, pv: Vec<f64>) -> SeriesTable {
    let n = load.len();
    inputs(
        hourly(n),
        vec![
            ("load_demand", load),
            ("generation_pv", pv),
            ("tariff_energy_map", vec![0.0; n]),
        ],
    )
}

pub fn column(result: &DispatchResult, name: &str) -> Vec<f64> {
    result
        .table
        .column(name)
        .unwrap_or_else(|_| panic!("missing column {}", name))
        .f64()
        .expect("numeric column")
        .into_no_null_iter()
        .collect()
}

pub fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {} got {} (tol {})",
        expected,
        actual,
        tol
    );
}
