//! Builder context shared by the core, asset and network builders.
//!
//! The context owns the program under construction and typed registries of
//! the handles each builder created. Balance terms and cost terms are created
//! up front by the core; a builder *links* the terms it is responsible for.
//! Whatever is still unlinked when the build closes is fixed to zero, so a
//! disabled asset class leaves its terms in the program at value 0.

use crate::inputs::SeriesTable;
use dopt_core::{Diagnostics, Node, ResolvedConfig, TariffSchedule, TimeGrid};
use dopt_solver_common::{LinearExpr, LinearProgram, VarId};
use std::collections::{BTreeMap, BTreeSet};

/// A per-node, per-step quantity in the energy balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BalanceTerm {
    GridImport,
    GridExport,
    BatteryDischarge,
    BatteryCharge,
    Pv,
    Genset,
    PowerAbsorbed,
    PowerInjected,
    NetworkLosses,
    LoadServed,
    LoadShed,
    DynamicLoad,
    ExternalGen,
}

impl BalanceTerm {
    pub const ALL: [BalanceTerm; 13] = [
        BalanceTerm::GridImport,
        BalanceTerm::GridExport,
        BalanceTerm::BatteryDischarge,
        BalanceTerm::BatteryCharge,
        BalanceTerm::Pv,
        BalanceTerm::Genset,
        BalanceTerm::PowerAbsorbed,
        BalanceTerm::PowerInjected,
        BalanceTerm::NetworkLosses,
        BalanceTerm::LoadServed,
        BalanceTerm::LoadShed,
        BalanceTerm::DynamicLoad,
        BalanceTerm::ExternalGen,
    ];

    /// Variable and output name.
    pub fn var_name(&self) -> &'static str {
        match self {
            BalanceTerm::GridImport => "grid_import",
            BalanceTerm::GridExport => "grid_export",
            BalanceTerm::BatteryDischarge => "sum_battery_discharge_grid_power",
            BalanceTerm::BatteryCharge => "sum_battery_charge_grid_power",
            BalanceTerm::Pv => "generation_pv",
            BalanceTerm::Genset => "sum_genset_power",
            BalanceTerm::PowerAbsorbed => "power_abs",
            BalanceTerm::PowerInjected => "power_inj",
            BalanceTerm::NetworkLosses => "power_network_losses",
            BalanceTerm::LoadServed => "load_served",
            BalanceTerm::LoadShed => "load_shed",
            BalanceTerm::DynamicLoad => "building_load_dynamic",
            BalanceTerm::ExternalGen => "external_gen_power",
        }
    }

    /// Supply side of the node balance.
    pub fn is_supply(&self) -> bool {
        matches!(
            self,
            BalanceTerm::GridImport
                | BalanceTerm::BatteryDischarge
                | BalanceTerm::Pv
                | BalanceTerm::Genset
                | BalanceTerm::PowerAbsorbed
                | BalanceTerm::ExternalGen
        )
    }

    /// Load shed never enters the balance directly; it reaches it through
    /// `load_served`.
    pub fn in_balance(&self) -> bool {
        !matches!(self, BalanceTerm::LoadShed)
    }
}

/// A scalar cost term of the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CostTerm {
    Energy,
    Demand,
    ExportRevenue,
    RegulationRevenue,
    Fuel,
    LoadShed,
    Co2,
    Degradation,
}

impl CostTerm {
    pub const ALL: [CostTerm; 8] = [
        CostTerm::Energy,
        CostTerm::Demand,
        CostTerm::ExportRevenue,
        CostTerm::RegulationRevenue,
        CostTerm::Fuel,
        CostTerm::LoadShed,
        CostTerm::Co2,
        CostTerm::Degradation,
    ];

    pub fn var_name(&self) -> &'static str {
        match self {
            CostTerm::Energy => "sum_energy_cost",
            CostTerm::Demand => "sum_demand_cost",
            CostTerm::ExportRevenue => "sum_export_revenue",
            CostTerm::RegulationRevenue => "sum_regulation_revenue",
            CostTerm::Fuel => "fuel_cost_total",
            CostTerm::LoadShed => "load_shed_cost_total",
            CostTerm::Co2 => "co2_total",
            CostTerm::Degradation => "degradation_cost_total",
        }
    }
}

/// Projectable quantity: one expression per step, optionally per index value.
#[derive(Debug, Clone)]
pub enum OutputSeries {
    Time(Vec<LinearExpr>),
    /// Index values in insertion order
    Indexed(Vec<(String, Vec<LinearExpr>)>),
}

#[derive(Debug, Clone)]
pub struct BatteryVars {
    pub node: Option<String>,
    pub charge_grid: Vec<VarId>,
    pub discharge_grid: Vec<VarId>,
    pub charge_cell: Vec<VarId>,
    pub discharge_cell: Vec<VarId>,
    pub energy: Vec<VarId>,
    pub selfdischarge: Vec<VarId>,
    pub charging: Vec<VarId>,
}

#[derive(Debug, Clone)]
pub struct GensetVars {
    pub fuel: String,
    pub power: Vec<VarId>,
}

#[derive(Debug, Clone)]
pub struct CircuitVars {
    pub on: Vec<VarId>,
    pub potential: Vec<f64>,
}

/// Site-wide exogenous series, read once by the core.
#[derive(Debug, Clone)]
pub struct SiteSeries {
    pub grid_available: Vec<f64>,
    pub fuel_available: Vec<f64>,
    pub co2_intensity: Vec<f64>,
    pub outside_temperature: Vec<f64>,
}

pub struct ModelContext<'a> {
    pub config: &'a ResolvedConfig,
    pub inputs: &'a SeriesTable,
    pub grid: TimeGrid,
    pub tariff: TariffSchedule,
    pub site: SiteSeries,
    pub lp: LinearProgram,
    pub diagnostics: Diagnostics,
    pub batteries: BTreeMap<String, BatteryVars>,
    pub gensets: BTreeMap<String, GensetVars>,
    pub circuits: BTreeMap<String, CircuitVars>,
    /// Emission sources folded into `co2_total` when the build closes
    pub co2_sources: LinearExpr,
    terms: BTreeMap<BalanceTerm, Vec<Vec<VarId>>>,
    linked: BTreeSet<BalanceTerm>,
    costs: BTreeMap<CostTerm, VarId>,
    defined: BTreeSet<CostTerm>,
    outputs: Vec<(String, OutputSeries)>,
}

impl<'a> ModelContext<'a> {
    pub fn new(
        config: &'a ResolvedConfig,
        inputs: &'a SeriesTable,
        grid: TimeGrid,
        tariff: TariffSchedule,
        site: SiteSeries,
        diagnostics: Diagnostics,
    ) -> Self {
        let mut lp = LinearProgram::new();
        lp.solver = config.solver.name.clone();
        lp.timeout_seconds = config.solver.timeout_seconds;
        lp.options = config.solver.options_as_strings();
        Self {
            config,
            inputs,
            grid,
            tariff,
            site,
            lp,
            diagnostics,
            batteries: BTreeMap::new(),
            gensets: BTreeMap::new(),
            circuits: BTreeMap::new(),
            co2_sources: LinearExpr::new(),
            terms: BTreeMap::new(),
            linked: BTreeSet::new(),
            costs: BTreeMap::new(),
            defined: BTreeSet::new(),
            outputs: Vec::new(),
        }
    }

    pub fn nodes(&self) -> &'a [Node] {
        &self.config.topology.nodes
    }

    pub fn steps(&self) -> usize {
        self.grid.len()
    }

    /// Create the node-by-step variables of a balance term.
    pub fn create_term(&mut self, term: BalanceTerm, lower: f64, upper: f64) {
        let nodes = self.nodes();
        let mut grid = Vec::with_capacity(nodes.len());
        for node in nodes {
            let row = self
                .grid
                .steps()
                .map(|t| self.lp.continuous(format!("{}[{},{}]", term.var_name(), node.id, t), lower, upper))
                .collect();
            grid.push(row);
        }
        self.terms.insert(term, grid);
    }

    /// Handle of a balance term at node index `n`, step `t`.
    pub fn term(&self, term: BalanceTerm, n: usize, t: usize) -> VarId {
        self.terms[&term][n][t]
    }

    pub fn term_row(&self, term: BalanceTerm, n: usize) -> &[VarId] {
        &self.terms[&term][n]
    }

    /// Define `term[n,t] == expr`.
    pub fn link(&mut self, term: BalanceTerm, n: usize, t: usize, expr: impl Into<LinearExpr>) {
        let var = self.term(term, n, t);
        let node = &self.nodes()[n].id;
        self.lp.eq(format!("{}_link[{},{}]", term.var_name(), node, t), var, expr);
        self.linked.insert(term);
    }

    /// Fix `term[n,t]` to an exogenous value.
    pub fn pin(&mut self, term: BalanceTerm, n: usize, t: usize, value: f64) {
        let var = self.term(term, n, t);
        self.lp.fix(var, value);
        self.linked.insert(term);
    }

    /// Leave a term to the constraints its builder adds directly.
    pub fn release(&mut self, term: BalanceTerm) {
        self.linked.insert(term);
    }

    pub fn is_linked(&self, term: BalanceTerm) -> bool {
        self.linked.contains(&term)
    }

    pub fn create_costs(&mut self) {
        for cost in CostTerm::ALL {
            let var = self.lp.free(cost.var_name());
            self.costs.insert(cost, var);
        }
    }

    pub fn cost(&self, cost: CostTerm) -> VarId {
        self.costs[&cost]
    }

    /// Define `cost == expr`.
    pub fn define_cost(&mut self, cost: CostTerm, expr: impl Into<LinearExpr>) {
        let var = self.cost(cost);
        self.lp.eq(format!("{}_def", cost.var_name()), var, expr);
        self.defined.insert(cost);
    }

    /// Fix every balance and cost term no builder claimed.
    pub fn close_unlinked(&mut self) -> Vec<&'static str> {
        let mut closed = Vec::new();
        for term in BalanceTerm::ALL {
            if self.linked.contains(&term) {
                continue;
            }
            if let Some(grid) = self.terms.get(&term) {
                for var in grid.iter().flatten() {
                    self.lp.fix(*var, 0.0);
                }
                closed.push(term.var_name());
            }
        }
        for cost in CostTerm::ALL {
            if !self.defined.contains(&cost) {
                if let Some(var) = self.costs.get(&cost) {
                    self.lp.fix(*var, 0.0);
                    closed.push(cost.var_name());
                }
            }
        }
        closed
    }

    pub fn record(&mut self, name: &str, series: OutputSeries) {
        if let Some(slot) = self.outputs.iter_mut().find(|(n, _)| n == name) {
            slot.1 = series;
        } else {
            self.outputs.push((name.to_string(), series));
        }
    }

    pub fn record_vars(&mut self, name: &str, vars: &[VarId]) {
        let exprs = vars.iter().map(|&v| LinearExpr::from(v)).collect();
        self.record(name, OutputSeries::Time(exprs));
    }

    pub fn record_values(&mut self, name: &str, values: &[f64]) {
        let exprs = values.iter().map(|&v| LinearExpr::constant(v)).collect();
        self.record(name, OutputSeries::Time(exprs));
    }

    /// Record a balance term per node plus its site sum under `{name}_site`.
    pub fn record_term(&mut self, term: BalanceTerm) {
        let nodes = self.nodes();
        let mut indexed = Vec::with_capacity(nodes.len());
        let mut site = vec![LinearExpr::new(); self.steps()];
        for (n, node) in nodes.iter().enumerate() {
            let row: Vec<LinearExpr> = self.term_row(term, n).iter().map(|&v| LinearExpr::from(v)).collect();
            for (acc, e) in site.iter_mut().zip(&row) {
                *acc += e.clone();
            }
            indexed.push((node.id.clone(), row));
        }
        self.record(term.var_name(), OutputSeries::Indexed(indexed));
        self.record(&format!("{}_site", term.var_name()), OutputSeries::Time(site));
    }

    pub fn outputs(&self) -> &[(String, OutputSeries)] {
        &self.outputs
    }

    /// Hand over everything needed after the build.
    pub fn finish(self, closed: Vec<&'static str>) -> BuiltModel {
        BuiltModel {
            lp: self.lp,
            grid: self.grid,
            tariff: self.tariff,
            costs: self.costs,
            outputs: self.outputs,
            diagnostics: self.diagnostics,
            closed_terms: closed,
        }
    }
}

/// A fully built program plus the registries the projector needs.
#[derive(Debug, Clone)]
pub struct BuiltModel {
    pub lp: LinearProgram,
    pub grid: TimeGrid,
    pub tariff: TariffSchedule,
    pub costs: BTreeMap<CostTerm, VarId>,
    pub outputs: Vec<(String, OutputSeries)>,
    pub diagnostics: Diagnostics,
    /// Terms fixed to zero because no builder linked them
    pub closed_terms: Vec<&'static str>,
}

impl BuiltModel {
    pub fn output(&self, name: &str) -> Option<&OutputSeries> {
        self.outputs.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }
}
