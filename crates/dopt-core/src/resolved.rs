//! Validated, normalized configuration.
//!
//! Resolution runs once per build. It turns enable flags plus asset lists
//! into [`AssetBlock`]s, checks required fields of enabled assets, converts
//! fuels to per-kWh terms and flattens node membership fields into ordered
//! id sets. Builders only ever see this form.

use crate::config::{
    BatteryConfig, CustomerType, DegradationConfig, DispatchConfig, FinalSoc, GensetConfig,
    LineConfig, LoadCircuitConfig, Membership, NetworkSettings, ObjectiveWeights, SiteConfig,
    SolverConfig, TariffConfig,
};
use crate::diagnostics::Diagnostics;
use crate::error::{DoptError, DoptResult};
use std::collections::{BTreeSet, HashSet};

/// Name of the implicit node used when no network is configured.
pub const SINGLE_NODE: &str = "singleNode";

/// Default time-series column holding the site load.
pub const LOAD_COLUMN: &str = "load_demand";
/// Default time-series column holding PV output.
pub const PV_COLUMN: &str = "generation_pv";
/// Default time-series column holding external generation.
pub const EXTERNAL_GEN_COLUMN: &str = "external_gen";

/// An optional asset class, decided once at resolution time.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetBlock<T> {
    Enabled(T),
    Disabled,
}

impl<T> AssetBlock<T> {
    pub fn is_enabled(&self) -> bool {
        matches!(self, AssetBlock::Enabled(_))
    }

    pub fn enabled(&self) -> Option<&T> {
        match self {
            AssetBlock::Enabled(params) => Some(params),
            AssetBlock::Disabled => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Battery {
    pub name: String,
    /// kWh
    pub capacity: f64,
    pub efficiency_charging: f64,
    pub efficiency_discharging: f64,
    /// kW, grid side
    pub power_charge: f64,
    pub power_discharge: f64,
    /// Fraction of stored energy lost per hour
    pub self_discharging: f64,
    pub soc_initial: f64,
    pub soc_min: f64,
    pub soc_max: f64,
    pub soc_final: Option<f64>,
    /// Inverter apparent power limit [kVA]
    pub max_s: f64,
    pub thermal: Option<BatteryThermal>,
}

/// Parameters of the thermal and aging model. Present only when every field
/// is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryThermal {
    /// K/W
    pub resistance: f64,
    /// J/K
    pub capacitance: f64,
    pub temperature_initial: f64,
    pub nominal_voltage: f64,
    pub replacement_cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Genset {
    pub name: String,
    pub capacity: f64,
    pub backup_only: bool,
    pub efficiency: f64,
    pub fuel: String,
    pub om_var: f64,
    pub max_ramp_up: f64,
    pub max_ramp_down: f64,
    pub time_to_start: f64,
    pub regulation: bool,
    pub max_s: f64,
}

/// Fuel expressed per kWh of fuel energy.
#[derive(Debug, Clone, PartialEq)]
pub struct Fuel {
    pub name: String,
    /// $/kWh
    pub price: f64,
    /// kg/kWh
    pub co2: f64,
    /// kWh on site
    pub reserves: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GensetFleet {
    pub gensets: Vec<Genset>,
    pub fuels: Vec<Fuel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadCircuit {
    pub name: String,
    pub cost: f64,
    pub outage_only: bool,
}

impl LoadCircuit {
    pub fn potential_column(&self) -> String {
        format!("load_shed_potential_{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub is_pcc: bool,
    pub is_slack: bool,
    pub load_columns: BTreeSet<String>,
    pub pv_columns: BTreeSet<String>,
    pub pv_max_s: f64,
    pub external_gen_columns: BTreeSet<String>,
    pub batteries: BTreeSet<String>,
    pub gensets: BTreeSet<String>,
    pub load_circuits: BTreeSet<String>,
}

/// One directed `(from, to, line)` entry as written under a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub from: String,
    pub to: String,
    pub line: String,
}

#[derive(Debug, Clone)]
pub struct NetworkSpec {
    pub settings: NetworkSettings,
    pub lines: Vec<LineConfig>,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone)]
pub struct Topology {
    pub nodes: Vec<Node>,
    /// Set when the network block is present and has more than one node.
    pub network: Option<NetworkSpec>,
}

impl Topology {
    pub fn is_multi_node(&self) -> bool {
        self.network.is_some()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub site: SiteConfig,
    pub tariff: TariffConfig,
    pub objective: ObjectiveWeights,
    pub pv: bool,
    pub external_gen: bool,
    pub batteries: AssetBlock<Vec<Battery>>,
    pub gensets: AssetBlock<GensetFleet>,
    pub load_control: AssetBlock<Vec<LoadCircuit>>,
    pub degradation: AssetBlock<DegradationConfig>,
    pub topology: Topology,
    pub solver: SolverConfig,
}

impl ResolvedConfig {
    pub fn resolve(config: &DispatchConfig, diag: &mut Diagnostics) -> DoptResult<Self> {
        let batteries = if config.system.battery {
            AssetBlock::Enabled(resolve_batteries(&config.batteries)?)
        } else {
            AssetBlock::Disabled
        };
        let gensets = if config.system.genset {
            AssetBlock::Enabled(resolve_gensets(config, diag)?)
        } else {
            AssetBlock::Disabled
        };
        let load_control = if config.system.load_control {
            AssetBlock::Enabled(resolve_circuits(&config.load_control)?)
        } else {
            AssetBlock::Disabled
        };
        let degradation = match (&batteries, config.degradation.enabled) {
            (AssetBlock::Enabled(list), true) => {
                if let Some(bat) = list.iter().find(|b| b.thermal.is_none()) {
                    return Err(DoptError::config(
                        format!("batteries[{}]", bat.name),
                        "degradation requires thermal_R, thermal_C, temperature_initial, \
                         nominal_V and degradation_replacementcost",
                    ));
                }
                if !config.degradation.cycle_aging_enabled {
                    diag.add_notice(
                        "degradation",
                        "cycle aging term is multiplied by zero (cycle_aging_enabled = false)",
                    );
                }
                AssetBlock::Enabled(config.degradation.clone())
            }
            _ => AssetBlock::Disabled,
        };

        validate_site(&config.site)?;

        let mut resolved = Self {
            site: config.site.clone(),
            tariff: config.tariff.clone(),
            objective: config.objective.clone(),
            pv: config.system.pv,
            external_gen: config.system.external_gen,
            batteries,
            gensets,
            load_control,
            degradation,
            topology: Topology {
                nodes: Vec::new(),
                network: None,
            },
            solver: config.solver.clone(),
        };
        resolved.topology = resolve_topology(config, &resolved, diag)?;
        Ok(resolved)
    }

    pub fn demand_charges_apply(&self) -> bool {
        self.site.customer == CustomerType::Commercial
    }

    pub fn battery_names(&self) -> Vec<String> {
        self.batteries
            .enabled()
            .map(|list| list.iter().map(|b| b.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn genset_names(&self) -> Vec<String> {
        self.gensets
            .enabled()
            .map(|fleet| fleet.gensets.iter().map(|g| g.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn circuit_names(&self) -> Vec<String> {
        self.load_control
            .enabled()
            .map(|list| list.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }
}

fn require<T: Copy>(value: Option<T>, field: impl FnOnce() -> String) -> DoptResult<T> {
    value.ok_or_else(|| DoptError::missing(field()))
}

fn validate_site(site: &SiteConfig) -> DoptResult<()> {
    if site.import_max < 0.0 {
        return Err(DoptError::config("site.import_max", "must be non-negative"));
    }
    if site.export_max < 0.0 {
        return Err(DoptError::config("site.export_max", "must be non-negative"));
    }
    Ok(())
}

fn resolve_batteries(raw: &[BatteryConfig]) -> DoptResult<Vec<Battery>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for (idx, cfg) in raw.iter().enumerate() {
        let name = cfg
            .name
            .clone()
            .ok_or_else(|| DoptError::missing(format!("batteries[{}].name", idx)))?;
        if !seen.insert(name.clone()) {
            return Err(DoptError::config(
                format!("batteries[{}].name", idx),
                format!("duplicate battery name '{}'", name),
            ));
        }
        let field = |f: &str| format!("batteries[{}].{}", name, f);

        let capacity = require(cfg.capacity, || field("capacity"))?;
        let efficiency_charging = require(cfg.efficiency_charging, || field("efficiency_charging"))?;
        let efficiency_discharging =
            require(cfg.efficiency_discharging, || field("efficiency_discharging"))?;
        let power_charge = require(cfg.power_charge, || field("power_charge"))?;
        let power_discharge = require(cfg.power_discharge, || field("power_discharge"))?;
        let self_discharging = require(cfg.self_discharging, || field("self_discharging"))?;
        let soc_initial = require(cfg.soc_initial, || field("soc_initial"))?;
        let soc_max = require(cfg.soc_max, || field("soc_max"))?;
        let soc_min = require(cfg.soc_min, || field("soc_min"))?;

        for (key, eff) in [
            ("efficiency_charging", efficiency_charging),
            ("efficiency_discharging", efficiency_discharging),
        ] {
            if !(eff > 0.0 && eff <= 1.0) {
                return Err(DoptError::config(field(key), "must lie in (0, 1]"));
            }
        }
        if soc_min > soc_max {
            return Err(DoptError::config(field("soc_min"), "exceeds soc_max"));
        }
        if soc_initial < soc_min {
            return Err(DoptError::config(
                field("soc_initial"),
                format!("SOC initial {} is below soc_min {}", soc_initial, soc_min),
            ));
        }
        if soc_initial > soc_max {
            return Err(DoptError::config(
                field("soc_initial"),
                format!("SOC initial {} is above soc_max {}", soc_initial, soc_max),
            ));
        }
        let soc_final = match cfg.soc_final {
            None | Some(FinalSoc::SameAsInitial(false)) => None,
            Some(FinalSoc::SameAsInitial(true)) => Some(soc_initial),
            Some(FinalSoc::Fraction(f)) => {
                if f < soc_min {
                    return Err(DoptError::config(
                        field("soc_final"),
                        format!("SOC final {} is below soc_min {}", f, soc_min),
                    ));
                }
                if f > soc_max {
                    return Err(DoptError::config(
                        field("soc_final"),
                        format!("SOC final {} is above soc_max {}", f, soc_max),
                    ));
                }
                Some(f)
            }
        };

        let thermal = match (
            cfg.thermal_r,
            cfg.thermal_c,
            cfg.temperature_initial,
            cfg.nominal_v,
            cfg.degradation_replacementcost,
        ) {
            (Some(r), Some(c), Some(t0), Some(v), Some(cost)) => Some(BatteryThermal {
                resistance: r,
                capacitance: c,
                temperature_initial: t0,
                nominal_voltage: v,
                replacement_cost: cost,
            }),
            _ => None,
        };

        out.push(Battery {
            capacity,
            efficiency_charging,
            efficiency_discharging,
            power_charge,
            power_discharge,
            self_discharging,
            soc_initial,
            soc_min,
            soc_max,
            soc_final,
            max_s: cfg.max_s.unwrap_or(power_charge),
            thermal,
            name,
        });
    }
    Ok(out)
}

fn resolve_gensets(config: &DispatchConfig, diag: &mut Diagnostics) -> DoptResult<GensetFleet> {
    let mut fuels = Vec::with_capacity(config.fuels.len());
    for fuel in &config.fuels {
        if fuel.conversion <= 0.0 {
            return Err(DoptError::config(
                format!("fuels[{}].conversion", fuel.name),
                "must be positive",
            ));
        }
        let reserves = match fuel.reserves {
            Some(r) => r * fuel.conversion,
            None => {
                diag.add_notice(
                    "defaults",
                    &format!("fuel reserves missing for '{}', default value = 0", fuel.name),
                );
                0.0
            }
        };
        fuels.push(Fuel {
            name: fuel.name.clone(),
            price: fuel.rate / fuel.conversion,
            co2: fuel.co2 / fuel.conversion,
            reserves,
        });
    }

    let mut gensets = Vec::with_capacity(config.gensets.len());
    let mut seen = HashSet::new();
    for (idx, cfg) in config.gensets.iter().enumerate() {
        gensets.push(resolve_genset(idx, cfg, &fuels)?);
        let name = &gensets[gensets.len() - 1].name;
        if !seen.insert(name.clone()) {
            return Err(DoptError::config(
                format!("gensets[{}].name", idx),
                format!("duplicate genset name '{}'", name),
            ));
        }
    }
    Ok(GensetFleet { gensets, fuels })
}

fn resolve_genset(idx: usize, cfg: &GensetConfig, fuels: &[Fuel]) -> DoptResult<Genset> {
    let name = cfg.name.clone().unwrap_or_else(|| format!("genset_{}", idx + 1));
    let field = |f: &str| format!("gensets[{}].{}", name, f);

    let capacity = require(cfg.capacity, || field("capacity"))?;
    let backup_only = require(cfg.backup_only, || field("backupOnly"))?;
    let efficiency = require(cfg.efficiency, || field("efficiency"))?;
    let fuel = cfg.fuel.clone().ok_or_else(|| DoptError::missing(field("fuel")))?;
    let om_var = require(cfg.om_var, || field("omVar"))?;
    let max_ramp_up = require(cfg.max_ramp_up, || field("maxRampUp"))?;
    let max_ramp_down = require(cfg.max_ramp_down, || field("maxRampDown"))?;
    let time_to_start = require(cfg.time_to_start, || field("timeToStart"))?;
    let regulation = require(cfg.regulation, || field("regulation"))?;

    if efficiency <= 0.0 {
        return Err(DoptError::config(field("efficiency"), "must be positive"));
    }
    if !fuels.iter().any(|f| f.name == fuel) {
        return Err(DoptError::config(
            field("fuel"),
            format!("unknown fuel '{}'", fuel),
        ));
    }

    Ok(Genset {
        max_s: cfg.max_s.unwrap_or(capacity),
        name,
        capacity,
        backup_only,
        efficiency,
        fuel,
        om_var,
        max_ramp_up,
        max_ramp_down,
        time_to_start,
        regulation,
    })
}

fn resolve_circuits(raw: &[LoadCircuitConfig]) -> DoptResult<Vec<LoadCircuit>> {
    let mut out = Vec::with_capacity(raw.len());
    for (idx, cfg) in raw.iter().enumerate() {
        let name = cfg.name.clone().unwrap_or_else(|| (idx + 1).to_string());
        let field = |f: &str| format!("load_control[{}].{}", name, f);
        out.push(LoadCircuit {
            cost: require(cfg.cost, || field("cost"))?,
            outage_only: require(cfg.outage_only, || field("outageOnly"))?,
            name,
        });
    }
    Ok(out)
}

fn to_set(membership: &Option<Membership>) -> BTreeSet<String> {
    membership
        .as_ref()
        .map(|m| m.ids().into_iter().collect())
        .unwrap_or_default()
}

fn resolve_topology(
    config: &DispatchConfig,
    resolved: &ResolvedConfig,
    diag: &mut Diagnostics,
) -> DoptResult<Topology> {
    let battery_names: BTreeSet<String> = resolved.battery_names().into_iter().collect();
    let genset_names: BTreeSet<String> = resolved.genset_names().into_iter().collect();
    let circuit_names: BTreeSet<String> = resolved.circuit_names().into_iter().collect();

    let network = match &config.network {
        Some(net) if net.nodes.len() > 1 => net,
        Some(net) => {
            if !net.nodes.is_empty() {
                diag.add_notice(
                    "network",
                    "network block has a single node; using the single-node model",
                );
            }
            return Ok(single_node(resolved, battery_names, genset_names, circuit_names));
        }
        None => return Ok(single_node(resolved, battery_names, genset_names, circuit_names)),
    };

    let mut nodes = Vec::with_capacity(network.nodes.len());
    let mut node_ids = HashSet::new();
    for node in &network.nodes {
        if !node_ids.insert(node.node_id.clone()) {
            return Err(DoptError::config(
                format!("network.nodes[{}]", node.node_id),
                "duplicate node_id",
            ));
        }
        let ders = node.ders.clone().unwrap_or_default();
        let field = |f: &str| format!("network.nodes[{}].ders.{}", node.node_id, f);

        let (batteries, gensets, load_circuits) = (
            to_set(&ders.battery),
            to_set(&ders.genset),
            to_set(&ders.load_control),
        );
        // Assets of a disabled class may still be listed under a node.
        if resolved.batteries.is_enabled() {
            if let Some(unknown) = batteries.difference(&battery_names).next() {
                return Err(DoptError::config(field("battery"), format!("unknown battery '{}'", unknown)));
            }
        }
        if resolved.gensets.is_enabled() {
            if let Some(unknown) = gensets.difference(&genset_names).next() {
                return Err(DoptError::config(field("genset"), format!("unknown genset '{}'", unknown)));
            }
        }
        if resolved.load_control.is_enabled() {
            if let Some(unknown) = load_circuits.difference(&circuit_names).next() {
                return Err(DoptError::config(
                    field("load_control"),
                    format!("unknown load circuit '{}'", unknown),
                ));
            }
        }

        nodes.push(Node {
            id: node.node_id.clone(),
            is_pcc: node.pcc,
            is_slack: node.slack,
            load_columns: to_set(&node.load_id),
            pv_columns: if resolved.pv {
                to_set(&ders.pv_id)
            } else {
                BTreeSet::new()
            },
            pv_max_s: ders.pv_max_s,
            external_gen_columns: if resolved.external_gen {
                to_set(&ders.external_gen)
            } else {
                BTreeSet::new()
            },
            batteries: intersect_enabled(batteries, &battery_names),
            gensets: intersect_enabled(gensets, &genset_names),
            load_circuits: intersect_enabled(load_circuits, &circuit_names),
        });
    }

    let mut connections = Vec::new();
    for node in &network.nodes {
        for conn in &node.connections {
            if !node_ids.contains(&conn.node) {
                return Err(DoptError::config(
                    format!("network.nodes[{}].connections", node.node_id),
                    format!("unknown node '{}'", conn.node),
                ));
            }
            if !network.lines.iter().any(|l| l.line_id == conn.line) {
                return Err(DoptError::config(
                    format!("network.nodes[{}].connections", node.node_id),
                    format!("unknown line '{}'", conn.line),
                ));
            }
            connections.push(Connection {
                from: node.node_id.clone(),
                to: conn.node.clone(),
                line: conn.line.clone(),
            });
        }
    }

    let slack_count = nodes.iter().filter(|n| n.is_slack).count();
    if network.settings.enable_power_flow && slack_count != 1 {
        return Err(DoptError::config(
            "network.nodes",
            format!(
                "power flow requires exactly one slack node, found {}",
                slack_count
            ),
        ));
    }
    if !nodes.iter().any(|n| n.is_pcc) {
        diag.add_warning("network", "no node is marked pcc; the site cannot import or export");
    }
    for (kind, names, placed) in [
        ("battery", &battery_names, nodes.iter().flat_map(|n| n.batteries.iter()).cloned().collect::<BTreeSet<_>>()),
        ("genset", &genset_names, nodes.iter().flat_map(|n| n.gensets.iter()).cloned().collect()),
        ("load circuit", &circuit_names, nodes.iter().flat_map(|n| n.load_circuits.iter()).cloned().collect()),
    ] {
        for orphan in names.difference(&placed) {
            diag.add_warning_with_entity(
                "network",
                &format!("{} is not located at any node and has no effect on the balance", kind),
                orphan,
            );
        }
    }

    Ok(Topology {
        nodes,
        network: Some(NetworkSpec {
            settings: network.settings.clone(),
            lines: network.lines.clone(),
            connections,
        }),
    })
}

fn intersect_enabled(listed: BTreeSet<String>, known: &BTreeSet<String>) -> BTreeSet<String> {
    listed.intersection(known).cloned().collect()
}

fn single_node(
    resolved: &ResolvedConfig,
    batteries: BTreeSet<String>,
    gensets: BTreeSet<String>,
    load_circuits: BTreeSet<String>,
) -> Topology {
    let mut pv_columns = BTreeSet::new();
    if resolved.pv {
        pv_columns.insert(PV_COLUMN.to_string());
    }
    let mut external_gen_columns = BTreeSet::new();
    if resolved.external_gen {
        external_gen_columns.insert(EXTERNAL_GEN_COLUMN.to_string());
    }
    Topology {
        nodes: vec![Node {
            id: SINGLE_NODE.to_string(),
            is_pcc: true,
            is_slack: false,
            load_columns: [LOAD_COLUMN.to_string()].into_iter().collect(),
            pv_columns,
            pv_max_s: 0.0,
            external_gen_columns,
            batteries,
            gensets,
            load_circuits,
        }],
        network: None,
    }
}
