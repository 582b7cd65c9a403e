//! Balance, grid, tariff and emission formulation shared by every model.

use crate::context::{BalanceTerm, CostTerm, ModelContext, OutputSeries, SiteSeries};
use crate::error::ModelResult;
use crate::inputs::{
    SeriesTable, FUEL_AVAILABLE, GRID_AVAILABLE, GRID_CO2_INTENSITY, OUTSIDE_TEMPERATURE,
};
use dopt_core::Diagnostics;
use dopt_solver_common::LinearExpr;
use tracing::debug;

pub fn read_site_series(inputs: &SeriesTable, diag: &mut Diagnostics) -> ModelResult<SiteSeries> {
    Ok(SiteSeries {
        grid_available: inputs.column_or(GRID_AVAILABLE, 1.0, diag)?,
        fuel_available: inputs.column_or(FUEL_AVAILABLE, 1.0, diag)?,
        co2_intensity: inputs.column_or(GRID_CO2_INTENSITY, 0.0, diag)?,
        outside_temperature: inputs.column_or(OUTSIDE_TEMPERATURE, 20.0, diag)?,
    })
}

/// Create every balance and cost term, then add the node balance, grid
/// limits, demand charges, energy cost and export revenue.
pub fn build_core(ctx: &mut ModelContext) -> ModelResult<()> {
    let import_max = ctx.config.site.import_max;
    let export_max = ctx.config.site.export_max;

    ctx.create_term(BalanceTerm::GridImport, 0.0, import_max);
    ctx.create_term(BalanceTerm::GridExport, 0.0, export_max);
    ctx.create_term(BalanceTerm::LoadServed, f64::NEG_INFINITY, f64::INFINITY);
    for term in BalanceTerm::ALL {
        if !matches!(
            term,
            BalanceTerm::GridImport | BalanceTerm::GridExport | BalanceTerm::LoadServed
        ) {
            ctx.create_term(term, 0.0, f64::INFINITY);
        }
    }
    ctx.create_costs();
    // Grid exchange is bounded by the limits below, not by a link.
    ctx.release(BalanceTerm::GridImport);
    ctx.release(BalanceTerm::GridExport);

    add_exogenous(ctx)?;
    add_balance(ctx);
    add_grid_limits(ctx);
    let import_site = site_sum(ctx, BalanceTerm::GridImport);
    let export_site = site_sum(ctx, BalanceTerm::GridExport);
    add_demand_charges(ctx, &import_site);
    add_energy_cost(ctx, &import_site, &export_site);
    add_grid_emissions(ctx, &import_site, &export_site);

    let energy_map: Vec<f64> = ctx.tariff.maps().energy.iter().map(|&p| p as f64).collect();
    let power_map: Vec<f64> = ctx.tariff.maps().power.iter().map(|&p| p as f64).collect();
    ctx.record_values("tariff_energy_map", &energy_map);
    ctx.record_values("tariff_power_map", &power_map);
    let temperature = ctx.site.outside_temperature.clone();
    ctx.record_values("outside_temperature", &temperature);
    let available = ctx.site.grid_available.clone();
    ctx.record_values("grid_available", &available);
    Ok(())
}

/// Load, PV and external generation come straight from the inputs.
fn add_exogenous(ctx: &mut ModelContext) -> ModelResult<()> {
    let nodes = ctx.nodes();
    for (n, node) in nodes.iter().enumerate() {
        let load = ctx.inputs.sum_columns(&node.load_columns)?;
        for (t, &demand) in load.iter().enumerate() {
            let shed = ctx.term(BalanceTerm::LoadShed, n, t);
            ctx.link(BalanceTerm::LoadServed, n, t, LinearExpr::constant(demand) - shed);
        }
        if ctx.config.pv {
            let pv = ctx.inputs.sum_columns(&node.pv_columns)?;
            for (t, &value) in pv.iter().enumerate() {
                ctx.pin(BalanceTerm::Pv, n, t, value);
            }
        }
        if ctx.config.external_gen {
            let external = ctx.inputs.sum_columns(&node.external_gen_columns)?;
            for (t, &value) in external.iter().enumerate() {
                ctx.pin(BalanceTerm::ExternalGen, n, t, value);
            }
        }
    }
    Ok(())
}

fn add_balance(ctx: &mut ModelContext) {
    let nodes = ctx.nodes();
    for (n, node) in nodes.iter().enumerate() {
        for t in ctx.grid.steps() {
            let mut expr = LinearExpr::new();
            for term in BalanceTerm::ALL.iter().filter(|term| term.in_balance()) {
                let sign = if term.is_supply() { 1.0 } else { -1.0 };
                expr.add_term(ctx.term(*term, n, t), sign);
            }
            ctx.lp.eq(format!("balance[{},{}]", node.id, t), expr, 0.0);
        }
    }
}

/// Outage limits per node, and one import/export selector per step shared
/// by every node so the site never imports and exports at once.
fn add_grid_limits(ctx: &mut ModelContext) {
    let import_max = ctx.config.site.import_max;
    let export_max = ctx.config.site.export_max;
    let nodes = ctx.nodes();
    for (n, node) in nodes.iter().enumerate() {
        for t in ctx.grid.steps() {
            let available = ctx.site.grid_available[t];
            let import = ctx.term(BalanceTerm::GridImport, n, t);
            let export = ctx.term(BalanceTerm::GridExport, n, t);
            ctx.lp
                .le(format!("grid_import_outage[{},{}]", node.id, t), import, available * import_max);
            ctx.lp
                .le(format!("grid_export_outage[{},{}]", node.id, t), export, available * export_max);
        }
    }
    for t in ctx.grid.steps() {
        let import = site_sum_at(ctx, BalanceTerm::GridImport, t);
        let export = site_sum_at(ctx, BalanceTerm::GridExport, t);
        let x = ctx.lp.binary(format!("grid_import_xor_export[{}]", t));
        ctx.lp.le(format!("grid_import_xor[{}]", t), import, x * import_max);
        ctx.lp.le(
            format!("grid_export_xor[{}]", t),
            export,
            LinearExpr::constant(export_max) - x * export_max,
        );
    }
}

fn site_sum_at(ctx: &ModelContext, term: BalanceTerm, t: usize) -> LinearExpr {
    LinearExpr::sum((0..ctx.nodes().len()).map(|n| ctx.term(term, n, t)))
}

pub fn site_sum(ctx: &ModelContext, term: BalanceTerm) -> Vec<LinearExpr> {
    ctx.grid.steps().map(|t| site_sum_at(ctx, term, t)).collect()
}

/// Peak demand per tariff period and over the whole horizon. Peaks already
/// billed earlier in the cycle are subtracted so only the increment costs.
fn add_demand_charges(ctx: &mut ModelContext, import_site: &[LinearExpr]) {
    let periods = ctx.tariff.demand_periods();
    let mut cost = LinearExpr::new();
    let mut peaks = Vec::with_capacity(periods.len());
    for &p in &periods {
        let peak = ctx.lp.nonneg(format!("demand_charge_periods[{}]", p));
        cost += peak * ctx.tariff.demand_price(p);
        peaks.push((p, peak));
    }
    let coincident = ctx.lp.nonneg("demand_charge_overall");
    cost += coincident * ctx.tariff.coincident_price();

    for t in ctx.grid.accounting() {
        let p = ctx.tariff.power_period(t);
        if let Some(&(_, peak)) = peaks.iter().find(|(id, _)| *id == p) {
            let prev = ctx.tariff.previous_peak(p);
            ctx.lp.ge(
                format!("demand_peak[{},{}]", p, t),
                peak,
                import_site[t].clone() - prev,
            );
        }
        let prev = ctx.tariff.previous_coincident_peak();
        ctx.lp.ge(
            format!("demand_peak_overall[{}]", t),
            coincident,
            import_site[t].clone() - prev,
        );
    }

    if ctx.config.demand_charges_apply() {
        ctx.define_cost(CostTerm::Demand, cost);
    } else {
        debug!("residential customer: demand cost fixed to zero");
    }
}

fn add_energy_cost(ctx: &mut ModelContext, import_site: &[LinearExpr], export_site: &[LinearExpr]) {
    let steps = ctx.steps();
    let mut energy = vec![LinearExpr::new(); steps];
    let mut revenue = vec![LinearExpr::new(); steps];
    for t in ctx.grid.accounting() {
        let scale = ctx.grid.scale_fwd(t);
        energy[t] = import_site[t].clone() * (ctx.tariff.energy_price(t) / scale);
        revenue[t] = export_site[t].clone() * (ctx.tariff.export_price(t) / scale);
    }
    ctx.define_cost(CostTerm::Energy, LinearExpr::sum(energy.iter()));
    if ctx.config.site.export_max > 0.0 {
        ctx.define_cost(CostTerm::ExportRevenue, -LinearExpr::sum(revenue.iter()));
    }
    ctx.record("energy_cost", OutputSeries::Time(energy));
    ctx.record("export_revenue", OutputSeries::Time(revenue));
}

fn add_grid_emissions(ctx: &mut ModelContext, import_site: &[LinearExpr], export_site: &[LinearExpr]) {
    let steps = ctx.steps();
    let mut imported = vec![LinearExpr::new(); steps];
    let mut exported = vec![LinearExpr::new(); steps];
    for t in ctx.grid.accounting() {
        let factor = ctx.site.co2_intensity[t] / ctx.grid.scale_fwd(t);
        imported[t] = import_site[t].clone() * factor;
        exported[t] = export_site[t].clone() * factor;
    }
    ctx.co2_sources += LinearExpr::sum(imported.iter());
    ctx.co2_sources -= LinearExpr::sum(exported.iter());
    ctx.record("co2_elec_import", OutputSeries::Time(imported));
    ctx.record("co2_elec_export", OutputSeries::Time(exported));
}

/// Define `co2_total`, fix unclaimed terms and record the balance terms.
pub fn close(ctx: &mut ModelContext) -> Vec<&'static str> {
    let co2 = std::mem::take(&mut ctx.co2_sources);
    ctx.define_cost(CostTerm::Co2, co2);
    let closed = ctx.close_unlinked();
    if !closed.is_empty() {
        debug!("fixed to zero: {}", closed.join(", "));
    }
    for term in BalanceTerm::ALL {
        ctx.record_term(term);
    }
    closed
}
