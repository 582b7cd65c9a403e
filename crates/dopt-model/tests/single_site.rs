//! Single-node dispatch with grid and PV only.

#![cfg(feature = "solver-microlp")]

mod common;

use common::*;
use dopt_core::DoptError;
use dopt_model::{DispatchModel, ModelError, OutputSpec};

fn expected_energy_cost(load: &[f64], pv: &[f64], price: f64) -> f64 {
    // The last timestamp closes the horizon and is not billed.
    load.iter()
        .zip(pv)
        .take(load.len() - 1)
        .map(|(l, p)| (l - p).max(0.0) * price)
        .sum()
}

#[test]
fn test_pv_only_objective_is_net_import_cost() {
    let (load, pv) = day_profile(25);
    let inputs = site_inputs(load.clone(), pv.clone());
    let mut model = DispatchModel::new(&config(flat_tariff_config())).unwrap();
    let result = model.run(&inputs, None).unwrap();

    assert!(result.is_optimal());
    assert_eq!(result.summary.termination, "optimal");
    let objective = result.summary.objective.unwrap();
    assert_close(objective, expected_energy_cost(&load, &pv, 0.10), 1e-6);

    let costs = result.costs.as_ref().unwrap();
    assert_close(costs.energy, objective, 1e-6);
    assert_close(costs.demand, 0.0, 1e-9);
    assert_close(costs.fuel, 0.0, 1e-9);
}

#[test]
fn test_grid_serves_load_without_generation() {
    let n = 4;
    let cfg = config(serde_json::json!({
        "system": { "pv": false },
        "tariff": { "energy": { "0": 0.10 }, "demand": { "0": 0.0 } }
    }));
    let inputs = inputs(
        hourly(n),
        vec![("load_demand", vec![20.0; n]), ("tariff_energy_map", vec![0.0; n])],
    );
    let mut model = DispatchModel::new(&cfg).unwrap();
    let result = model.run(&inputs, None).unwrap();

    assert!(result.is_optimal());
    assert_close(result.summary.objective.unwrap(), 3.0 * 20.0 * 0.10, 1e-6);
    for (t, import) in column(&result, "Import Power [kW]").iter().enumerate() {
        assert_close(*import, 20.0, 1e-6);
        assert_close(column(&result, "Export Power [kW]")[t], 0.0, 1e-9);
    }
}

#[test]
fn test_balance_and_grid_exclusion_hold() {
    let (load, pv) = day_profile(13);
    let inputs = site_inputs(load.clone(), pv.clone());
    let mut model = DispatchModel::new(&config(flat_tariff_config())).unwrap();
    let result = model.run(&inputs, None).unwrap();

    let program = model.program().unwrap();
    assert!(program.violations(&result.solution.values, 1e-6).is_empty());

    let import = column(&result, "Import Power [kW]");
    let export = column(&result, "Export Power [kW]");
    let served = column(&result, "Load Power [kW]");
    let generation = column(&result, "PV Power [kW]");
    for t in 0..load.len() {
        assert!(import[t] * export[t] < 1e-6, "import and export both active at {}", t);
        assert_close(import[t] + generation[t], served[t] + export[t], 1e-6);
        assert_close(served[t], load[t], 1e-6);
    }
}

#[test]
fn test_default_outputs_and_effective_tariff() {
    let (load, pv) = day_profile(7);
    let inputs = site_inputs(load, pv);
    let mut model = DispatchModel::new(&config(flat_tariff_config())).unwrap();
    let result = model.run(&inputs, None).unwrap();

    let names: Vec<String> = result
        .table
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(names[0], "timestamp");
    for label in [
        "Import Power [kW]",
        "Export Power [kW]",
        "Load Power [kW]",
        "Tariff Energy Period [-]",
        "Tariff Power Period [-]",
        "Temperature [C]",
        "PV Power [kW]",
        "Tariff Energy [$/kWh]",
    ] {
        assert!(names.iter().any(|n| n == label), "missing {}", label);
    }
    assert!(!names.iter().any(|n| n.starts_with("Battery")));
    assert!(column(&result, "Tariff Energy [$/kWh]").iter().all(|p| (*p - 0.10).abs() < 1e-12));
    assert!(column(&result, "Temperature [C]").iter().all(|t| *t == 20.0));
    assert!(model.diagnostics().has_category("defaults"));
}

#[test]
fn test_custom_output_list() {
    let (load, pv) = day_profile(5);
    let inputs = site_inputs(load, pv);
    let mut model = DispatchModel::new(&config(flat_tariff_config())).unwrap();
    let outputs = vec![
        OutputSpec::new("cost", "energy_cost", "Energy Cost [$]"),
        OutputSpec::indexed("import", "grid_import", "nodes", "import[%s]"),
    ];
    let result = model.run(&inputs, Some(&outputs)).unwrap();
    assert_eq!(result.table.width(), 3);
    assert!(result.table.column("import[singleNode]").is_ok());
    let cost: f64 = column(&result, "Energy Cost [$]").iter().sum();
    assert_close(cost, result.summary.objective.unwrap(), 1e-6);
}

#[test]
fn test_resolve_is_idempotent() {
    let (load, pv) = day_profile(9);
    let inputs = site_inputs(load, pv);
    let mut model = DispatchModel::new(&config(flat_tariff_config())).unwrap();
    let first = model.run(&inputs, None).unwrap();
    let second = model.solve(None).unwrap();

    assert_close(
        first.summary.objective.unwrap(),
        second.summary.objective.unwrap(),
        1e-9,
    );
    assert_eq!(
        column(&first, "Import Power [kW]"),
        column(&second, "Import Power [kW]")
    );
}

#[test]
fn test_previous_peak_only_bills_the_increment() {
    let load = vec![10.0, 30.0, 50.0, 20.0, 10.0];
    let pv = vec![0.0; 5];
    let demand_config = |prev: f64| {
        config(serde_json::json!({
            "system": { "pv": true },
            "site": { "demand_periods_prev": { "0": prev } },
            "tariff": { "energy": { "0": 0.10 }, "demand": { "0": 10.0 } }
        }))
    };
    let inputs = site_inputs(load.clone(), pv.clone());

    let mut fresh = DispatchModel::new(&demand_config(0.0)).unwrap();
    let fresh = fresh.run(&inputs, None).unwrap();
    let mut partial = DispatchModel::new(&demand_config(40.0)).unwrap();
    let partial = partial.run(&inputs, None).unwrap();
    let mut covered = DispatchModel::new(&demand_config(100.0)).unwrap();
    let covered = covered.run(&inputs, None).unwrap();

    let energy = expected_energy_cost(&load, &pv, 0.10);
    assert_close(fresh.summary.objective.unwrap(), energy + 10.0 * 50.0, 1e-6);
    assert_close(partial.summary.objective.unwrap(), energy + 10.0 * 10.0, 1e-6);
    assert_close(covered.summary.objective.unwrap(), energy, 1e-6);
}

#[test]
fn test_demand_periods_bill_their_own_peaks() {
    // The 90 kW step closes the horizon and sets no peak.
    let load = vec![10.0, 30.0, 50.0, 20.0, 90.0];
    let pv = vec![0.0; 5];
    let cfg = config(serde_json::json!({
        "system": { "pv": true },
        "site": { "demand_periods_prev": { "1": 40.0 } },
        "tariff": {
            "energy": { "0": 0.10 },
            "demand": { "0": 10.0, "1": 20.0 },
            "demand_coincident": 5.0
        }
    }));
    let inputs = inputs(
        hourly(load.len()),
        vec![
            ("load_demand", load.clone()),
            ("generation_pv", pv.clone()),
            ("tariff_energy_map", vec![0.0; 5]),
            ("tariff_power_map", vec![0.0, 0.0, 1.0, 1.0, 1.0]),
        ],
    );
    let mut model = DispatchModel::new(&cfg).unwrap();
    let result = model.run(&inputs, None).unwrap();
    assert!(result.is_optimal());

    let program = model.program().unwrap();
    let peak = |name: &str| {
        let id = program.find(name).unwrap_or_else(|| panic!("missing {}", name));
        result.solution.value(id).unwrap()
    };
    let off_peak = peak("demand_charge_periods[0]");
    let on_peak = peak("demand_charge_periods[1]");
    let overall = peak("demand_charge_overall");
    assert_close(off_peak, 30.0, 1e-6);
    assert_close(on_peak, 10.0, 1e-6);
    assert_close(overall, 50.0, 1e-6);

    let import = column(&result, "Import Power [kW]");
    for t in 0..2 {
        assert!(off_peak >= import[t] - 1e-6, "period 0 peak below import at {}", t);
    }
    for t in 2..4 {
        assert!(on_peak + 40.0 >= import[t] - 1e-6, "period 1 peak below import at {}", t);
    }

    let demand = 10.0 * 30.0 + 20.0 * (50.0 - 40.0) + 5.0 * 50.0;
    assert_close(result.costs.as_ref().unwrap().demand, demand, 1e-6);
    assert_close(
        result.summary.objective.unwrap(),
        expected_energy_cost(&load, &pv, 0.10) + demand,
        1e-6,
    );
}

#[test]
fn test_residential_customer_pays_no_demand_charge() {
    let load = vec![10.0, 30.0, 50.0, 20.0];
    let pv = vec![0.0; 4];
    let cfg = config(serde_json::json!({
        "system": { "pv": true },
        "site": { "customer": "Residential" },
        "tariff": { "energy": { "0": 0.10 }, "demand": { "0": 10.0 } }
    }));
    let mut model = DispatchModel::new(&cfg).unwrap();
    let result = model.run(&site_inputs(load.clone(), pv.clone()), None).unwrap();
    assert_close(
        result.summary.objective.unwrap(),
        expected_energy_cost(&load, &pv, 0.10),
        1e-6,
    );
    assert_close(result.costs.unwrap().demand, 0.0, 1e-9);
}

#[test]
fn test_build_twice_is_rejected() {
    let (load, pv) = day_profile(4);
    let inputs = site_inputs(load, pv);
    let mut model = DispatchModel::new(&config(flat_tariff_config())).unwrap();
    model.build(&inputs).unwrap();
    assert!(matches!(model.build(&inputs), Err(ModelError::AlreadyBuilt)));
}

#[test]
fn test_missing_load_column_is_named() {
    let n = 4;
    let inputs = inputs(
        hourly(n),
        vec![("generation_pv", vec![0.0; n]), ("tariff_energy_map", vec![0.0; n])],
    );
    let mut model = DispatchModel::new(&config(flat_tariff_config())).unwrap();
    match model.build(&inputs) {
        Err(ModelError::Core(DoptError::MissingColumn(name))) => assert_eq!(name, "load_demand"),
        other => panic!("expected missing column, got {:?}", other.err()),
    }
}

#[test]
fn test_unpriced_energy_period_fails_fast() {
    let n = 3;
    let inputs = inputs(
        hourly(n),
        vec![
            ("load_demand", vec![1.0; n]),
            ("generation_pv", vec![0.0; n]),
            ("tariff_energy_map", vec![0.0, 3.0, 0.0]),
        ],
    );
    let mut model = DispatchModel::new(&config(flat_tariff_config())).unwrap();
    let err = model.build(&inputs).err().unwrap();
    assert!(matches!(err, ModelError::Core(DoptError::Config { .. })));
}
