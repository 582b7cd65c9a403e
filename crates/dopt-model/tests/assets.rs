//! Battery, genset, load-control and degradation behaviour on a single node.

#![cfg(feature = "solver-microlp")]

mod common;

use common::*;
use dopt_model::{DispatchModel, OutputSpec};
use serde_json::json;

fn battery(self_discharging: f64, soc_final: serde_json::Value) -> serde_json::Value {
    json!({
        "name": "b1",
        "capacity": 100.0,
        "efficiency_charging": 0.96,
        "efficiency_discharging": 0.96,
        "power_charge": 50.0,
        "power_discharge": 50.0,
        "self_discharging": self_discharging,
        "soc_initial": 0.5,
        "soc_min": 0.1,
        "soc_max": 1.0,
        "soc_final": soc_final
    })
}

fn battery_config(battery: serde_json::Value) -> serde_json::Value {
    json!({
        "system": { "pv": false, "battery": true },
        "tariff": { "energy": { "0": 0.10 }, "demand": { "0": 0.0 } },
        "batteries": [battery]
    })
}

fn flat_load_inputs(n: usize, load: f64) -> dopt_model::SeriesTable {
    inputs(
        hourly(n),
        vec![("load_demand", vec![load; n]), ("tariff_energy_map", vec![0.0; n])],
    )
}

fn battery_outputs() -> Vec<OutputSpec> {
    vec![
        OutputSpec::indexed("soc", "battery_soc", "batteries", "soc_"),
        OutputSpec::indexed("charge", "battery_charge_grid_power", "batteries", "charge_"),
        OutputSpec::indexed("discharge", "battery_discharge_grid_power", "batteries", "discharge_"),
        OutputSpec::new("import", "grid_import_site", "import"),
    ]
}

#[test]
fn test_idle_battery_without_spread_costs_nothing() {
    let n = 7;
    let baseline = (n - 1) as f64 * 10.0 * 0.10;
    let mut model = DispatchModel::new(&config(battery_config(battery(0.0, json!(true))))).unwrap();
    let result = model.run(&flat_load_inputs(n, 10.0), None).unwrap();
    assert_close(result.summary.objective.unwrap(), baseline, 1e-6);
}

#[test]
fn test_battery_losses_raise_the_objective() {
    let n = 7;
    let baseline = (n - 1) as f64 * 10.0 * 0.10;
    let mut model = DispatchModel::new(&config(battery_config(battery(0.01, json!(true))))).unwrap();
    let result = model.run(&flat_load_inputs(n, 10.0), None).unwrap();
    let objective = result.summary.objective.unwrap();
    assert!(
        objective > baseline + 1e-6,
        "self-discharge must be bought back: {} vs {}",
        objective,
        baseline
    );
}

#[test]
fn test_self_discharge_follows_the_step_length() {
    let n = 3;
    let mut idle = battery(0.1, json!(null));
    idle["power_charge"] = json!(0.0);
    idle["power_discharge"] = json!(0.0);
    let cfg = config(battery_config(idle));
    let outputs = battery_outputs();
    let start = hourly(1)[0];

    let mut hourly_model = DispatchModel::new(&cfg).unwrap();
    let hourly_result = hourly_model.run(&flat_load_inputs(n, 10.0), Some(&outputs)).unwrap();
    let soc = column(&hourly_result, "soc_b1");
    assert_close(soc[1], 0.45, 1e-9);

    let half_hourly = inputs(
        (0..n as i64).map(|i| start + i * HOUR / 2).collect(),
        vec![("load_demand", vec![10.0; n]), ("tariff_energy_map", vec![0.0; n])],
    );
    let mut model = DispatchModel::new(&cfg).unwrap();
    let result = model.run(&half_hourly, Some(&outputs)).unwrap();
    assert!(result.is_optimal());
    // Loss power is energy * rate / 2, held for half an hour.
    let soc = column(&result, "soc_b1");
    assert_close(soc[1], 0.4875, 1e-9);
    assert_close(soc[2], 0.4875 * (1.0 - 0.025), 1e-9);
}

#[test]
fn test_soc_limits_final_soc_and_exclusion() {
    let n = 7;
    let cfg = json!({
        "system": { "pv": false, "battery": true },
        "tariff": {
            "energy": { "0": 0.05, "1": 0.30 },
            "demand": { "0": 0.0, "1": 0.0 }
        },
        "batteries": [battery(0.0, json!(0.3))]
    });
    let inputs = inputs(
        hourly(n),
        vec![
            ("load_demand", vec![20.0; n]),
            ("tariff_energy_map", vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]),
        ],
    );
    let mut model = DispatchModel::new(&config(cfg)).unwrap();
    let result = model.run(&inputs, Some(&battery_outputs())).unwrap();
    assert!(result.is_optimal());
    assert!(model
        .program()
        .unwrap()
        .violations(&result.solution.values, 1e-6)
        .is_empty());

    let soc = column(&result, "soc_b1");
    let charge = column(&result, "charge_b1");
    let discharge = column(&result, "discharge_b1");
    assert_close(soc[0], 0.5, 1e-9);
    assert_close(soc[n - 1], 0.3, 1e-6);
    for t in 0..n {
        assert!(soc[t] >= 0.1 - 1e-9 && soc[t] <= 1.0 + 1e-9, "soc out of bounds at {}", t);
        assert!(charge[t] * discharge[t] < 1e-6, "charge and discharge overlap at {}", t);
    }
    // Cheap hours fill the battery, expensive hours drain it.
    assert!(charge[..3].iter().sum::<f64>() > 0.0);
    assert!(discharge[3..n - 1].iter().sum::<f64>() > 0.0);
}

fn genset_config(reserves_litres: f64) -> serde_json::Value {
    json!({
        "system": { "pv": false, "genset": true },
        "tariff": { "energy": { "0": 0.10 }, "demand": { "0": 0.0 } },
        "gensets": [{
            "name": "g1",
            "capacity": 20.0,
            "backupOnly": false,
            "efficiency": 0.3,
            "fuel": "diesel",
            "omVar": 0.0,
            "maxRampUp": 1.0,
            "maxRampDown": 1.0,
            "timeToStart": 0.0,
            "regulation": false
        }],
        "fuels": [{
            "name": "diesel",
            "unit": "l",
            "rate": 1.0,
            "conversion": 10.0,
            "co2": 2.7,
            "reserves": reserves_litres
        }]
    })
}

fn outage_inputs(n: usize, outage_from: usize) -> dopt_model::SeriesTable {
    let available: Vec<f64> = (0..n).map(|t| if t < outage_from { 1.0 } else { 0.0 }).collect();
    inputs(
        hourly(n),
        vec![
            ("load_demand", vec![10.0; n]),
            ("tariff_energy_map", vec![0.0; n]),
            ("grid_available", available.clone()),
            ("fuel_available", available),
        ],
    )
}

#[test]
fn test_fuel_outage_draws_on_reserves_only() {
    let n = 9;
    let mut model = DispatchModel::new(&config(genset_config(30.0))).unwrap();
    let outputs = vec![
        OutputSpec::indexed("import", "fuel_import", "fuels", "import_"),
        OutputSpec::indexed("reserves", "fuel_reserves", "fuels", "reserves_"),
        OutputSpec::new("grid", "grid_import_site", "grid"),
        OutputSpec::new("genset", "sum_genset_power_site", "genset"),
    ];
    let result = model.run(&outage_inputs(n, 4), Some(&outputs)).unwrap();
    assert!(result.is_optimal());

    let fuel_import = column(&result, "import_diesel");
    let reserves = column(&result, "reserves_diesel");
    let grid = column(&result, "grid");
    let genset = column(&result, "genset");
    for t in 4..n {
        assert_close(fuel_import[t], 0.0, 1e-9);
        assert_close(grid[t], 0.0, 1e-9);
        assert_close(genset[t], 10.0, 1e-6);
        assert_close(reserves[t], 10.0 / 0.3, 1e-6);
    }
    // 30 l at 10 kWh/l; the closing step is not counted against reserves.
    let drawn: f64 = reserves[..n - 1].iter().sum();
    assert!(drawn <= 300.0 + 1e-6);

    // Grid at $0.10 beats fuel at $0.10/0.3 while both are available.
    let expected = 4.0 * 10.0 * 0.10 + 4.0 * (10.0 / 0.3) * 0.10;
    assert_close(result.summary.objective.unwrap(), expected, 1e-5);
    assert_close(result.costs.unwrap().fuel, 4.0 * (10.0 / 0.3) * 0.10, 1e-5);
}

#[test]
fn test_insufficient_reserves_is_infeasible() {
    let mut model = DispatchModel::new(&config(genset_config(1.0))).unwrap();
    let result = model.run(&outage_inputs(9, 4), None).unwrap();
    assert!(!result.is_optimal());
    assert!(result.summary.objective.is_none());
    assert_eq!(result.table.height(), 0);
}

fn shed_config(outage_only: bool) -> serde_json::Value {
    json!({
        "system": { "pv": false, "load_control": true },
        "tariff": { "energy": { "0": 1.0 }, "demand": { "0": 0.0 } },
        "load_control": [{ "name": "hvac", "cost": 0.5, "outageOnly": outage_only }]
    })
}

fn shed_inputs(n: usize) -> dopt_model::SeriesTable {
    inputs(
        hourly(n),
        vec![
            ("load_demand", vec![10.0; n]),
            ("tariff_energy_map", vec![0.0; n]),
            ("load_shed_potential_hvac", vec![5.0; n]),
        ],
    )
}

#[test]
fn test_cheap_shedding_is_used() {
    let n = 5;
    let mut model = DispatchModel::new(&config(shed_config(false))).unwrap();
    let result = model.run(&shed_inputs(n), None).unwrap();
    let shed = column(&result, "Total Shed Load [kW]");
    let served = column(&result, "Load Power [kW]");
    for t in 0..n - 1 {
        assert_close(shed[t], 5.0, 1e-6);
        assert_close(served[t], 5.0, 1e-6);
    }
    let per_step = 5.0 * 1.0 + 5.0 * 0.5;
    assert_close(result.summary.objective.unwrap(), per_step * (n - 1) as f64, 1e-6);
}

#[test]
fn test_outage_only_circuit_stays_on_with_grid() {
    let n = 5;
    let mut model = DispatchModel::new(&config(shed_config(true))).unwrap();
    let result = model.run(&shed_inputs(n), None).unwrap();
    assert!(column(&result, "Total Shed Load [kW]").iter().all(|s| s.abs() < 1e-9));
    assert_close(result.summary.objective.unwrap(), 10.0 * (n - 1) as f64, 1e-6);
}

#[test]
fn test_missing_shed_potential_is_an_error() {
    let n = 3;
    let inputs = inputs(
        hourly(n),
        vec![("load_demand", vec![10.0; n]), ("tariff_energy_map", vec![0.0; n])],
    );
    let mut model = DispatchModel::new(&config(shed_config(false))).unwrap();
    assert!(model.build(&inputs).is_err());
}

#[test]
fn test_degradation_tracks_cell_temperature() {
    let n = 4;
    let mut bat = battery(0.0, json!(true));
    for (key, value) in [
        ("thermal_R", 0.01),
        ("thermal_C", 100_000.0),
        ("temperature_initial", 25.0),
        ("nominal_V", 400.0),
        ("degradation_replacementcost", 20_000.0),
    ] {
        bat[key] = json!(value);
    }
    let mut cfg = battery_config(bat);
    cfg["degradation"] = json!({ "enabled": true });

    let mut model = DispatchModel::new(&config(cfg)).unwrap();
    let outputs = vec![OutputSpec::indexed(
        "temperature",
        "battery_temperature",
        "batteries",
        "T_",
    )];
    let result = model.run(&flat_load_inputs(n, 10.0), Some(&outputs)).unwrap();
    assert!(result.is_optimal());

    let temperature = column(&result, "T_b1");
    assert_close(temperature[0], 25.0, 1e-9);
    // An idle cell relaxes toward the 20 °C ambient default.
    assert!(temperature[1] < 25.0 && temperature[1] > 20.0);
    assert!(result.costs.unwrap().degradation > 0.0);
}
