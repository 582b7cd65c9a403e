//! Serde view of a dispatch configuration file.
//!
//! These structs mirror the on-disk YAML/JSON layout one-to-one. Asset fields
//! that are required only when the asset class is enabled are `Option`s here;
//! [`crate::resolved::ResolvedConfig::resolve`] checks them and reports the
//! missing key by path, so disabled assets can carry incomplete blocks.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub system: SystemFlags,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub tariff: TariffConfig,
    #[serde(default)]
    pub objective: ObjectiveWeights,
    #[serde(default)]
    pub batteries: Vec<BatteryConfig>,
    #[serde(default)]
    pub gensets: Vec<GensetConfig>,
    #[serde(default)]
    pub fuels: Vec<FuelConfig>,
    #[serde(default)]
    pub load_control: Vec<LoadCircuitConfig>,
    #[serde(default)]
    pub network: Option<NetworkConfig>,
    #[serde(default)]
    pub degradation: DegradationConfig,
    #[serde(default)]
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemFlags {
    #[serde(default = "default_true")]
    pub pv: bool,
    #[serde(default)]
    pub battery: bool,
    #[serde(default)]
    pub genset: bool,
    #[serde(default)]
    pub load_control: bool,
    #[serde(default)]
    pub external_gen: bool,
}

impl Default for SystemFlags {
    fn default() -> Self {
        Self {
            pv: true,
            battery: false,
            genset: false,
            load_control: false,
            external_gen: false,
        }
    }
}

/// Only `Commercial` customers pay demand charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CustomerType {
    #[default]
    Commercial,
    #[serde(other)]
    Residential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub customer: CustomerType,
    #[serde(default = "default_site_limit")]
    pub import_max: f64,
    #[serde(default = "default_site_limit")]
    pub export_max: f64,
    /// Peak already billed in the current cycle, per demand period [kW]
    #[serde(default)]
    pub demand_periods_prev: BTreeMap<u32, f64>,
    #[serde(default)]
    pub demand_coincident_prev: f64,
    /// Hour offset of input timestamps from UTC, used for tariff periods
    #[serde(default)]
    pub input_timezone: i32,
}

fn default_site_limit() -> f64 {
    10_000.0
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            customer: CustomerType::default(),
            import_max: default_site_limit(),
            export_max: default_site_limit(),
            demand_periods_prev: BTreeMap::new(),
            demand_coincident_prev: 0.0,
            input_timezone: 0,
        }
    }
}

/// Period-indexed prices. Periods are small integers referenced by the
/// `tariff_*_map` time-series columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TariffConfig {
    /// $/kWh per energy period
    #[serde(default)]
    pub energy: BTreeMap<u32, f64>,
    /// $/kW per demand period
    #[serde(default)]
    pub demand: BTreeMap<u32, f64>,
    /// $/kW on the horizon-wide coincident peak
    #[serde(default)]
    pub demand_coincident: f64,
    /// $/kWh per export period
    #[serde(default)]
    pub export: BTreeMap<u32, f64>,
    /// Seasonal tables used to derive period maps from timestamps
    #[serde(default)]
    pub seasonal: Option<SeasonalTariff>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalTariff {
    /// Calendar month (1-12) to season name
    pub months: BTreeMap<u32, String>,
    pub seasons: BTreeMap<String, SeasonTable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonTable {
    pub energy: BTreeMap<u32, f64>,
    #[serde(default)]
    pub demand: BTreeMap<u32, f64>,
    #[serde(default)]
    pub demand_coincident: f64,
    pub hours: HourPeriods,
}

/// Hour-of-day (0-23) to period id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HourPeriods {
    DayTypes { weekday: Vec<u32>, weekend: Vec<u32> },
    WeekdayOnly(Vec<u32>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    #[serde(default = "default_weight")]
    pub weight_energy: f64,
    #[serde(default = "default_weight")]
    pub weight_demand: f64,
    #[serde(default = "default_weight")]
    pub weight_export: f64,
    #[serde(default = "default_weight")]
    pub weight_regulation: f64,
    #[serde(default = "default_weight")]
    pub weight_fuel: f64,
    #[serde(default = "default_weight")]
    pub weight_load_shed: f64,
    #[serde(default = "default_weight")]
    pub weight_degradation: f64,
    #[serde(default)]
    pub weight_co2: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            weight_energy: 1.0,
            weight_demand: 1.0,
            weight_export: 1.0,
            weight_regulation: 1.0,
            weight_fuel: 1.0,
            weight_load_shed: 1.0,
            weight_degradation: 1.0,
            weight_co2: 0.0,
        }
    }
}

/// `soc_final` accepts a fraction, `true` (return to the initial SOC) or
/// `false`/null (unconstrained).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FinalSoc {
    SameAsInitial(bool),
    Fraction(f64),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatteryConfig {
    pub name: Option<String>,
    pub capacity: Option<f64>,
    pub efficiency_charging: Option<f64>,
    pub efficiency_discharging: Option<f64>,
    pub power_charge: Option<f64>,
    pub power_discharge: Option<f64>,
    pub self_discharging: Option<f64>,
    pub soc_initial: Option<f64>,
    pub soc_max: Option<f64>,
    pub soc_min: Option<f64>,
    #[serde(default)]
    pub soc_final: Option<FinalSoc>,
    #[serde(default, alias = "maxS")]
    pub max_s: Option<f64>,
    #[serde(default, rename = "thermal_R")]
    pub thermal_r: Option<f64>,
    #[serde(default, rename = "thermal_C")]
    pub thermal_c: Option<f64>,
    #[serde(default)]
    pub temperature_initial: Option<f64>,
    #[serde(default, rename = "nominal_V")]
    pub nominal_v: Option<f64>,
    #[serde(default)]
    pub degradation_replacementcost: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GensetConfig {
    pub name: Option<String>,
    pub capacity: Option<f64>,
    #[serde(rename = "backupOnly")]
    pub backup_only: Option<bool>,
    pub efficiency: Option<f64>,
    pub fuel: Option<String>,
    #[serde(rename = "omVar")]
    pub om_var: Option<f64>,
    #[serde(rename = "maxRampUp")]
    pub max_ramp_up: Option<f64>,
    #[serde(rename = "maxRampDown")]
    pub max_ramp_down: Option<f64>,
    #[serde(rename = "timeToStart")]
    pub time_to_start: Option<f64>,
    pub regulation: Option<bool>,
    #[serde(default, alias = "maxS")]
    pub max_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuelConfig {
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    /// $ per volume unit
    pub rate: f64,
    /// kWh per volume unit
    pub conversion: f64,
    /// kg CO2 per volume unit
    pub co2: f64,
    /// On-site stock in volume units
    #[serde(default)]
    pub reserves: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadCircuitConfig {
    pub name: Option<String>,
    /// $/kWh not served
    pub cost: Option<f64>,
    #[serde(rename = "outageOnly")]
    pub outage_only: Option<bool>,
}

/// A node-to-asset or node-to-column reference written either as a single
/// id or as a list of ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Membership {
    One(String),
    Many(Vec<String>),
}

impl Membership {
    pub fn ids(&self) -> Vec<String> {
        match self {
            Membership::One(id) => vec![id.clone()],
            Membership::Many(ids) => ids.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub settings: NetworkSettings,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub lines: Vec<LineConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,
    #[serde(default)]
    pub pcc: bool,
    #[serde(default)]
    pub slack: bool,
    #[serde(default)]
    pub load_id: Option<Membership>,
    #[serde(default)]
    pub ders: Option<NodeDers>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeDers {
    #[serde(default)]
    pub pv_id: Option<Membership>,
    #[serde(default, rename = "pv_maxS")]
    pub pv_max_s: f64,
    #[serde(default)]
    pub battery: Option<Membership>,
    #[serde(default)]
    pub genset: Option<Membership>,
    #[serde(default)]
    pub load_control: Option<Membership>,
    #[serde(default)]
    pub external_gen: Option<Membership>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub node: String,
    pub line: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    pub line_id: String,
    /// Simple-exchange transfer limit [kW]
    pub power_capacity: f64,
    #[serde(default)]
    pub length: f64,
    #[serde(default)]
    pub resistance: f64,
    #[serde(default)]
    pub inductance: f64,
    #[serde(default)]
    pub ampacity: f64,
    #[serde(default, rename = "isTransformer")]
    pub is_transformer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSettings {
    #[serde(default = "default_simple_losses")]
    pub simple_network_losses: f64,
    #[serde(default, deserialize_with = "flag")]
    pub enable_power_flow: bool,
    #[serde(default = "default_one")]
    pub slack_bus_voltage: f64,
    #[serde(default = "default_one")]
    pub cable_derating: f64,
    #[serde(default = "default_one")]
    pub tx_derating: f64,
    #[serde(default)]
    pub power_factors: PowerFactors,
    #[serde(default = "default_true", deserialize_with = "flag")]
    pub enable_volt_const: bool,
    #[serde(default = "default_true", deserialize_with = "flag")]
    pub enable_cur_const: bool,
    #[serde(default = "default_true", deserialize_with = "flag")]
    pub enable_losses: bool,
    #[serde(default = "default_theta_min")]
    pub theta_min: f64,
    #[serde(default = "default_theta_max")]
    pub theta_max: f64,
    #[serde(default = "default_volt_min")]
    pub volt_min: f64,
    #[serde(default = "default_volt_max")]
    pub volt_max: f64,
    #[serde(default, deserialize_with = "flag")]
    pub conservative_volt_min: bool,
    #[serde(default = "default_n_edges")]
    pub n_edges: usize,
    #[serde(default, rename = "enableGenPQLimit", deserialize_with = "flag")]
    pub enable_gen_pq_limit: bool,
}

fn default_simple_losses() -> f64 {
    0.05
}
fn default_one() -> f64 {
    1.0
}
fn default_theta_min() -> f64 {
    -0.18
}
fn default_theta_max() -> f64 {
    0.09
}
fn default_volt_min() -> f64 {
    0.8
}
fn default_volt_max() -> f64 {
    1.1
}
fn default_n_edges() -> usize {
    8
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            simple_network_losses: default_simple_losses(),
            enable_power_flow: false,
            slack_bus_voltage: 1.0,
            cable_derating: 1.0,
            tx_derating: 1.0,
            power_factors: PowerFactors::default(),
            enable_volt_const: true,
            enable_cur_const: true,
            enable_losses: true,
            theta_min: default_theta_min(),
            theta_max: default_theta_max(),
            volt_min: default_volt_min(),
            volt_max: default_volt_max(),
            conservative_volt_min: false,
            n_edges: default_n_edges(),
            enable_gen_pq_limit: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerFactors {
    #[serde(default = "default_one", alias = "electricity")]
    pub load: f64,
    #[serde(default = "default_one")]
    pub battery_charging: f64,
    #[serde(default = "default_one")]
    pub battery_discharging: f64,
    #[serde(default = "default_one", alias = "gensets")]
    pub genset: f64,
    #[serde(default = "default_one")]
    pub pv: f64,
}

impl Default for PowerFactors {
    fn default() -> Self {
        Self {
            load: 1.0,
            battery_charging: 1.0,
            battery_discharging: 1.0,
            genset: 1.0,
            pv: 1.0,
        }
    }
}

/// Battery aging coefficients. The defaults are the fitted values of the
/// reference Li-ion cell model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Cycle aging is multiplied by zero unless set.
    #[serde(default)]
    pub cycle_aging_enabled: bool,
    #[serde(default = "default_calendar")]
    pub calendar: CalendarCoefficients,
    #[serde(default = "default_cycle")]
    pub cycle: CycleCoefficients,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarCoefficients {
    pub a0: f64,
    pub b0: f64,
    pub b1: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleCoefficients {
    pub a0: f64,
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
}

fn default_calendar() -> CalendarCoefficients {
    CalendarCoefficients {
        a0: 25727.068930200516,
        b0: 0.5685204330581881,
        b1: -70.48414456662813,
    }
}

fn default_cycle() -> CycleCoefficients {
    CycleCoefficients {
        a0: -0.010145570078488129,
        b0: 0.0003138082941656188,
        b1: 0.0008476522109451572,
        b2: 0.001229871720643372,
    }
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cycle_aging_enabled: false,
            calendar: default_calendar(),
            cycle: default_cycle(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Solve on a worker thread through good_lp
    #[default]
    Embedded,
    /// Spawn a solver plugin binary and exchange Arrow IPC
    Subprocess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Solver name, e.g. "microlp", "highs" or "cbc"
    #[serde(default = "default_solver_name")]
    pub name: String,
    /// Executable for the subprocess backend
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Passed to the solver without interpretation
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

fn default_solver_name() -> String {
    "microlp".to_string()
}

fn default_timeout() -> u64 {
    300
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            name: default_solver_name(),
            path: None,
            timeout_seconds: default_timeout(),
            options: BTreeMap::new(),
        }
    }
}

impl SolverConfig {
    /// Options rendered as plain strings for transport.
    pub fn options_as_strings(&self) -> BTreeMap<String, String> {
        self.options
            .iter()
            .map(|(k, v)| {
                let text = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), text)
            })
            .collect()
    }
}

fn default_true() -> bool {
    true
}

/// Accepts `true`/`false` as well as the `1`/`0` integers older configs use.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolLike {
        Bool(bool),
        Number(f64),
    }
    Ok(match BoolLike::deserialize(deserializer)? {
        BoolLike::Bool(b) => b,
        BoolLike::Number(n) => n != 0.0,
    })
}

pub fn load_config_from_path(path: &Path) -> Result<DispatchConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading dispatch config '{}'", path.display()))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            serde_yaml::from_str(&data).context("parsing dispatch config yaml")
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            serde_json::from_str(&data).context("parsing dispatch config json")
        }
        _ => serde_yaml::from_str(&data)
            .or_else(|_| serde_json::from_str(&data))
            .context("parsing dispatch config"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_values() {
        let cfg: DispatchConfig = serde_yaml::from_str("{}").unwrap();
        assert!(cfg.system.pv);
        assert!(!cfg.system.battery);
        assert_eq!(cfg.objective.weight_energy, 1.0);
        assert_eq!(cfg.objective.weight_co2, 0.0);
        assert_eq!(cfg.site.customer, CustomerType::Commercial);
        assert!(cfg.network.is_none());
        assert!(!cfg.degradation.cycle_aging_enabled);
    }

    #[test]
    fn test_network_settings_accept_integer_flags() {
        let yaml = r#"
enablePowerFlow: 1
enableLosses: 0
conservativeVoltMin: 0
nEdges: 12
"#;
        let settings: NetworkSettings = serde_yaml::from_str(yaml).unwrap();
        assert!(settings.enable_power_flow);
        assert!(!settings.enable_losses);
        assert_eq!(settings.n_edges, 12);
        assert_eq!(settings.theta_min, -0.18);
        assert_eq!(settings.slack_bus_voltage, 1.0);
    }

    #[test]
    fn test_membership_forms() {
        let yaml = r#"
node_id: N2
load_id: [a, b]
ders:
  pv_id: pv2
  battery: null
"#;
        let node: NodeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            node.load_id,
            Some(Membership::Many(vec!["a".into(), "b".into()]))
        );
        let ders = node.ders.unwrap();
        assert_eq!(ders.pv_id, Some(Membership::One("pv2".into())));
        assert!(ders.battery.is_none());
    }

    #[test]
    fn test_soc_final_variants() {
        let b: BatteryConfig = serde_yaml::from_str("soc_final: true").unwrap();
        assert_eq!(b.soc_final, Some(FinalSoc::SameAsInitial(true)));
        let b: BatteryConfig = serde_yaml::from_str("soc_final: 0.5").unwrap();
        assert_eq!(b.soc_final, Some(FinalSoc::Fraction(0.5)));
        let b: BatteryConfig = serde_yaml::from_str("soc_final: null").unwrap();
        assert_eq!(b.soc_final, None);
    }

    #[test]
    fn test_customer_other_maps_to_residential() {
        let site: SiteConfig = serde_yaml::from_str("customer: Household").unwrap();
        assert_eq!(site.customer, CustomerType::Residential);
    }

    #[test]
    fn test_solver_options_as_strings() {
        let yaml = r#"
name: cbc
options:
  seconds: 60
  ratio: "0.01"
"#;
        let solver: SolverConfig = serde_yaml::from_str(yaml).unwrap();
        let opts = solver.options_as_strings();
        assert_eq!(opts["seconds"], "60");
        assert_eq!(opts["ratio"], "0.01");
    }
}
