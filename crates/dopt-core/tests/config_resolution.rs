//! Configuration loading and resolution tests

use dopt_core::config::load_config_from_path;
use dopt_core::{Diagnostics, DoptError, ResolvedConfig, SINGLE_NODE};
use std::io::Write;

const BATTERY_SITE: &str = r#"
system:
  pv: true
  battery: true
site:
  customer: Commercial
  import_max: 500
  export_max: 0
tariff:
  energy: {0: 0.1, 1: 0.3}
  demand: {0: 0.0, 1: 12.0}
  export: {0: 0.0}
batteries:
  - name: libat01
    capacity: 200
    efficiency_charging: 0.96
    efficiency_discharging: 0.96
    power_charge: 50
    power_discharge: 50
    self_discharging: 0.0
    soc_initial: 0.5
    soc_max: 1.0
    soc_min: 0.2
    soc_final: true
"#;

fn write_config(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn test_yaml_single_node_resolution() {
    let file = write_config(BATTERY_SITE, ".yaml");
    let config = load_config_from_path(file.path()).expect("load yaml");
    let mut diag = Diagnostics::new();
    let resolved = ResolvedConfig::resolve(&config, &mut diag).expect("resolve");

    assert!(!resolved.topology.is_multi_node());
    let node = &resolved.topology.nodes[0];
    assert_eq!(node.id, SINGLE_NODE);
    assert!(node.is_pcc);
    assert!(node.batteries.contains("libat01"));
    assert!(node.pv_columns.contains("generation_pv"));

    let bat = &resolved.batteries.enabled().expect("batteries enabled")[0];
    assert_eq!(bat.soc_final, Some(0.5));
    // max_s falls back to the charge rating
    assert_eq!(bat.max_s, 50.0);
    assert!(!resolved.gensets.is_enabled());
    assert!(resolved.demand_charges_apply());
}

#[test]
fn test_json_config_loads() {
    let json = r#"{
        "system": {"pv": false, "load_control": true},
        "load_control": [{"name": "hvac", "cost": 2.0, "outageOnly": true}]
    }"#;
    let file = write_config(json, ".json");
    let config = load_config_from_path(file.path()).expect("load json");
    let mut diag = Diagnostics::new();
    let resolved = ResolvedConfig::resolve(&config, &mut diag).expect("resolve");

    let circuits = resolved.load_control.enabled().expect("load control");
    assert_eq!(circuits[0].name, "hvac");
    assert!(circuits[0].outage_only);
    assert!(resolved.topology.nodes[0].pv_columns.is_empty());
}

#[test]
fn test_missing_battery_field_names_path() {
    let yaml = BATTERY_SITE.replace("    power_charge: 50\n", "");
    let file = write_config(&yaml, ".yaml");
    let config = load_config_from_path(file.path()).unwrap();
    let err = ResolvedConfig::resolve(&config, &mut Diagnostics::new()).unwrap_err();
    match err {
        DoptError::Config { field, .. } => assert_eq!(field, "batteries[libat01].power_charge"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_soc_initial_below_min_rejected() {
    let yaml = BATTERY_SITE.replace("soc_initial: 0.5", "soc_initial: 0.1");
    let file = write_config(&yaml, ".yaml");
    let config = load_config_from_path(file.path()).unwrap();
    let err = ResolvedConfig::resolve(&config, &mut Diagnostics::new()).unwrap_err();
    assert!(err.to_string().contains("SOC initial 0.1 is below soc_min 0.2"));
}

#[test]
fn test_disabled_block_may_be_incomplete() {
    let yaml = BATTERY_SITE
        .replace("battery: true", "battery: false")
        .replace("    capacity: 200\n", "");
    let file = write_config(&yaml, ".yaml");
    let config = load_config_from_path(file.path()).unwrap();
    let resolved = ResolvedConfig::resolve(&config, &mut Diagnostics::new()).unwrap();
    assert!(!resolved.batteries.is_enabled());
    assert!(resolved.topology.nodes[0].batteries.is_empty());
}

#[test]
fn test_genset_fuel_conversion() {
    let yaml = r#"
system: {pv: false, genset: true}
fuels:
  - {name: diesel, unit: gal, rate: 3.5, conversion: 35.0, co2: 10.0, reserves: 10}
gensets:
  - name: gen1
    capacity: 100
    backupOnly: false
    efficiency: 0.35
    fuel: diesel
    omVar: 0.0
    maxRampUp: 1.0
    maxRampDown: 1.0
    timeToStart: 0
    regulation: false
"#;
    let file = write_config(yaml, ".yml");
    let config = load_config_from_path(file.path()).unwrap();
    let resolved = ResolvedConfig::resolve(&config, &mut Diagnostics::new()).unwrap();
    let fleet = resolved.gensets.enabled().unwrap();
    assert!((fleet.fuels[0].price - 0.1).abs() < 1e-12);
    assert!((fleet.fuels[0].reserves - 350.0).abs() < 1e-9);
    assert_eq!(fleet.gensets[0].max_s, 100.0);
}

#[test]
fn test_unknown_fuel_rejected() {
    let yaml = r#"
system: {genset: true}
fuels: [{name: diesel, rate: 3.5, conversion: 35.0, co2: 10.0}]
gensets:
  - {name: g, capacity: 1, backupOnly: true, efficiency: 0.3, fuel: gas, omVar: 0,
     maxRampUp: 1, maxRampDown: 1, timeToStart: 0, regulation: false}
"#;
    let file = write_config(yaml, ".yaml");
    let config = load_config_from_path(file.path()).unwrap();
    let mut diag = Diagnostics::new();
    let err = ResolvedConfig::resolve(&config, &mut diag).unwrap_err();
    assert!(err.to_string().contains("unknown fuel 'gas'"));
}

#[test]
fn test_network_membership_and_orphans() {
    let yaml = format!(
        "{}{}",
        BATTERY_SITE,
        r#"
network:
  settings: {simpleNetworkLosses: 0.02}
  lines:
    - {line_id: L1, power_capacity: 100}
  nodes:
    - node_id: N1
      pcc: true
      load_id: load_n1
      connections: [{node: N2, line: L1}]
    - node_id: N2
      load_id: [load_n2a, load_n2b]
      ders: {pv_id: pv_n2}
      connections: [{node: N1, line: L1}]
"#
    );
    let file = write_config(&yaml, ".yaml");
    let config = load_config_from_path(file.path()).unwrap();
    let mut diag = Diagnostics::new();
    let resolved = ResolvedConfig::resolve(&config, &mut diag).unwrap();

    assert!(resolved.topology.is_multi_node());
    let n2 = &resolved.topology.nodes[1];
    assert_eq!(n2.load_columns.len(), 2);
    assert!(n2.pv_columns.contains("pv_n2"));
    let network = resolved.topology.network.as_ref().unwrap();
    assert_eq!(network.connections.len(), 2);
    assert_eq!(network.settings.simple_network_losses, 0.02);
    // libat01 is enabled but not placed on a node
    assert!(diag
        .issues_by_category("network")
        .any(|i| i.entity.as_deref() == Some("libat01")));
}

#[test]
fn test_power_flow_requires_one_slack() {
    let yaml = r#"
network:
  settings: {enablePowerFlow: 1}
  lines: [{line_id: L1, power_capacity: 100}]
  nodes:
    - {node_id: N1, pcc: true, connections: [{node: N2, line: L1}]}
    - {node_id: N2, connections: [{node: N1, line: L1}]}
"#;
    let file = write_config(yaml, ".yaml");
    let config = load_config_from_path(file.path()).unwrap();
    let err = ResolvedConfig::resolve(&config, &mut Diagnostics::new()).unwrap_err();
    assert!(err.to_string().contains("exactly one slack node"));
}

#[test]
fn test_degradation_requires_thermal_fields() {
    let yaml = format!("{}\ndegradation:\n  enabled: true\n", BATTERY_SITE);
    let file = write_config(&yaml, ".yaml");
    let config = load_config_from_path(file.path()).unwrap();
    let err = ResolvedConfig::resolve(&config, &mut Diagnostics::new()).unwrap_err();
    assert!(err.to_string().contains("batteries[libat01]"));
}
