//! Multi-node models: simple lossy exchange and the linearized power flow.

mod common;

use common::*;
use dopt_core::DoptError;
use dopt_model::{DispatchModel, ModelError, OutputSpec};
use serde_json::json;

fn two_node_config(capacity: f64, power_flow: bool) -> serde_json::Value {
    json!({
        "system": { "pv": false },
        "tariff": { "energy": { "0": 0.10 }, "demand": { "0": 0.0 } },
        "network": {
            "settings": { "simpleNetworkLosses": 0.05, "enablePowerFlow": power_flow },
            "nodes": [
                {
                    "node_id": "N1", "pcc": true, "slack": true, "load_id": "load_n1",
                    "connections": [{ "node": "N2", "line": "l1" }]
                },
                {
                    "node_id": "N2", "load_id": ["load_n2"],
                    "connections": [{ "node": "N1", "line": "l1" }]
                }
            ],
            "lines": [{
                "line_id": "l1", "power_capacity": capacity, "length": 0.1,
                "resistance": 0.2, "inductance": 0.1, "ampacity": 200.0
            }]
        }
    })
}

fn two_node_inputs(n: usize) -> dopt_model::SeriesTable {
    inputs(
        hourly(n),
        vec![
            ("load_n1", vec![0.0; n]),
            ("load_n2", vec![10.0; n]),
            ("tariff_energy_map", vec![0.0; n]),
        ],
    )
}

#[cfg(feature = "solver-microlp")]
#[test]
fn test_remote_load_is_served_through_the_pcc_with_losses() {
    let n = 4;
    let mut model = DispatchModel::new(&config(two_node_config(50.0, false))).unwrap();
    let result = model.run(&two_node_inputs(n), None).unwrap();
    assert!(result.is_optimal());

    let import = column(&result, "gridImport_N1");
    let remote_import = column(&result, "gridImport_N2");
    let injected = column(&result, "powerInj_N1");
    let absorbed = column(&result, "powerAbs_N2");
    for t in 0..n {
        assert_close(import[t], 10.5, 1e-6);
        assert_close(remote_import[t], 0.0, 1e-9);
        assert_close(injected[t], 10.0, 1e-6);
        assert_close(absorbed[t], 10.0, 1e-6);
    }
    assert_close(column(&result, "Import Power [kW]")[0], 10.5, 1e-6);
    assert_close(
        result.summary.objective.unwrap(),
        (n - 1) as f64 * 10.5 * 0.10,
        1e-6,
    );
}

#[cfg(feature = "solver-microlp")]
#[test]
fn test_line_capacity_limits_exchange() {
    let mut model = DispatchModel::new(&config(two_node_config(5.0, false))).unwrap();
    let result = model.run(&two_node_inputs(3), None).unwrap();
    assert!(!result.is_optimal());
    assert!(result.summary.objective.is_none());
}

#[cfg(feature = "solver-microlp")]
#[test]
fn test_two_pccs_never_import_and_export_together() {
    let n = 4;
    let mut cfg = two_node_config(50.0, false);
    cfg["network"]["nodes"][1]["pcc"] = json!(true);
    cfg["tariff"]["export"] = json!({ "0": 0.20 });
    let mut model = DispatchModel::new(&config(cfg)).unwrap();
    let result = model.run(&two_node_inputs(n), None).unwrap();
    assert!(result.is_optimal());

    let import = column(&result, "Import Power [kW]");
    let export = column(&result, "Export Power [kW]");
    for t in 0..n {
        assert!(import[t] * export[t] < 1e-6, "site imports and exports at {}", t);
    }
    // Each node's own PCC serves its load, with nothing to sell.
    assert_close(column(&result, "gridImport_N2")[0], 10.0, 1e-6);
    assert_close(
        result.summary.objective.unwrap(),
        (n - 1) as f64 * 10.0 * 0.10,
        1e-6,
    );
}

#[test]
fn test_grid_exclusion_uses_one_binary_per_step() {
    let n = 3;
    let mut cfg = two_node_config(50.0, false);
    cfg["network"]["nodes"][1]["pcc"] = json!(true);
    let mut model = DispatchModel::new(&config(cfg)).unwrap();
    let built = model.build(&two_node_inputs(n)).unwrap();
    let lp = &built.lp;
    for t in 0..n {
        assert!(lp.find(&format!("grid_import_xor_export[{}]", t)).is_some());
        assert!(lp.find(&format!("grid_import_xor_export[N1,{}]", t)).is_none());
        // Grid exchange stays free within the site limits.
        let import = lp.find(&format!("grid_import[N2,{}]", t)).unwrap();
        assert!(lp.var(import).upper > 0.0);
    }
}

#[cfg(feature = "solver-microlp")]
#[test]
fn test_power_flow_solves_inside_the_voltage_and_current_limits() {
    let n = 3;
    let mut model = DispatchModel::new(&config(two_node_config(50.0, true))).unwrap();
    let outputs = vec![
        OutputSpec::indexed("vre", "voltage_real", "nodes", "vre_"),
        OutputSpec::indexed("vim", "voltage_imag", "nodes", "vim_"),
        OutputSpec::new("import", "grid_import_site", "import"),
    ];
    let result = model.run(&two_node_inputs(n), Some(&outputs)).unwrap();
    assert!(result.is_optimal());

    let program = model.program().unwrap();
    let values = &result.solution.values;
    assert!(program.violations(values, 1e-6).is_empty());

    let (re1, im1) = (column(&result, "vre_N1"), column(&result, "vim_N1"));
    let (re2, im2) = (column(&result, "vre_N2"), column(&result, "vim_N2"));
    let import = column(&result, "import");
    for t in 0..n {
        assert_close(re1[t], 1.0, 1e-9);
        assert_close(im1[t], 0.0, 1e-9);
        let magnitude = re2[t].hypot(im2[t]);
        assert!((0.8..=1.1).contains(&magnitude), "N2 voltage {} out of band at {}", magnitude, t);

        let current = |name: &str| {
            let id = program
                .find(&format!("{}[N1,N2,{}]", name, t))
                .unwrap_or_else(|| panic!("missing {} at {}", name, t));
            values[id.index()]
        };
        let flow = current("current_real").hypot(current("current_imag"));
        assert!(flow <= 200.0 + 1e-6, "branch current {} above ampacity at {}", flow, t);

        // The remote load plus non-negative losses comes through the PCC.
        assert!(import[t] >= 10.0 - 1e-6, "import {} short of load at {}", import[t], t);
    }
}

#[test]
fn test_power_flow_fixes_the_slack_voltage() {
    let n = 3;
    let mut model = DispatchModel::new(&config(two_node_config(50.0, true))).unwrap();
    let built = model.build(&two_node_inputs(n)).unwrap();
    let lp = &built.lp;

    for t in 0..n {
        let re = lp.find(&format!("voltage_real[N1,{}]", t)).unwrap();
        let im = lp.find(&format!("voltage_imag[N1,{}]", t)).unwrap();
        assert_eq!((lp.var(re).lower, lp.var(re).upper), (1.0, 1.0));
        assert_eq!((lp.var(im).lower, lp.var(im).upper), (0.0, 0.0));
        assert!(lp
            .constraints
            .iter()
            .any(|c| c.name == format!("network_balance_real[{}]", t)));
        assert!(lp
            .constraints
            .iter()
            .any(|c| c.name == format!("voltage_real_def[N2,{}]", t)));
    }
    // Simple exchange variables belong to the other formulation.
    assert!(lp.find("power_in[N1,N2,0]").is_none());
    assert!(built.output("voltage_real").is_some());
}

#[test]
fn test_power_flow_without_slack_fails_fast() {
    let mut cfg = two_node_config(50.0, true);
    cfg["network"]["nodes"][0]["slack"] = json!(false);
    match DispatchModel::new(&config(cfg)) {
        Err(ModelError::Core(DoptError::Config { .. })) => {}
        other => panic!("expected a configuration error, got {:?}", other.err()),
    }
}

#[test]
fn test_asymmetric_line_is_reported() {
    let mut cfg = two_node_config(50.0, false);
    cfg["network"]["lines"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "line_id": "l2", "power_capacity": 80.0 }));
    cfg["network"]["nodes"][1]["connections"][0]["line"] = json!("l2");

    let mut model = DispatchModel::new(&config(cfg)).unwrap();
    let built = model.build(&two_node_inputs(3)).unwrap();
    let inflow = built.lp.find("power_in[N1,N2,0]").unwrap();
    assert_eq!(built.lp.var(inflow).upper, 80.0);
    assert!(model.diagnostics().has_category("network"));
}
