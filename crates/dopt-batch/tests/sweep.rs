//! Parallel scenario sweeps write one result per scenario and a manifest.

#![cfg(feature = "solver-microlp")]

use dopt_batch::{load_batch_manifest, run_batch, BatchRunnerConfig, Scenario};
use dopt_core::DispatchConfig;
use dopt_model::SeriesTable;
use serde_json::json;
use tempfile::tempdir;

fn inputs(n: usize) -> SeriesTable {
    SeriesTable::from_columns(
        (0..n as i64).map(|i| 1_719_792_000 + i * 3600).collect(),
        vec![
            ("load_demand", vec![10.0; n]),
            ("tariff_energy_map", vec![0.0; n]),
        ],
    )
    .unwrap()
}

#[test]
fn test_sweep_records_successes_and_failures() {
    let base: DispatchConfig = serde_json::from_value(json!({
        "system": { "pv": false },
        "tariff": { "energy": { "0": 0.10 }, "demand": { "0": 0.0 } }
    }))
    .unwrap();
    let dir = tempdir().unwrap();
    let config = BatchRunnerConfig {
        base,
        scenarios: vec![
            Scenario::new("base", json!({})),
            Scenario::new("expensive", json!({ "tariff": { "energy": { "0": 0.30 } } })),
            // PV without a generation column cannot build.
            Scenario::new("broken", json!({ "system": { "pv": true } })),
        ],
        inputs: inputs(4),
        outputs: None,
        output_root: dir.path().join("sweep"),
        threads: 2,
    };

    let summary = run_batch(&config).unwrap();
    assert_eq!(summary.success, 2);
    assert_eq!(summary.failure, 1);
    assert!(summary.manifest_path.exists());

    let manifest = load_batch_manifest(&summary.manifest_path).unwrap();
    assert_eq!(manifest.num_scenarios, 3);
    let by_id = |id: &str| {
        manifest
            .scenarios
            .iter()
            .find(|s| s.scenario_id == id)
            .unwrap()
            .clone()
    };

    let base = by_id("base");
    assert!(base.is_ok());
    assert!((base.objective.unwrap() - 3.0 * 10.0 * 0.10).abs() < 1e-6);
    assert!(std::path::Path::new(&base.output).exists());

    let expensive = by_id("expensive");
    assert!((expensive.objective.unwrap() - 3.0 * 10.0 * 0.30).abs() < 1e-6);

    let broken = by_id("broken");
    assert_eq!(broken.status, "error");
    assert!(broken.error.unwrap().contains("generation_pv"));
    assert!(broken.output.is_empty());
}
