//! Fuel-fired generators and the fuels they burn.
//!
//! Fuel use is routed to the genset's fuel. While fuel deliveries are
//! available (`fuel_available = 1`) the burn is imported; otherwise it must
//! come from on-site reserves, whose cumulative draw over the window is
//! capped by the reserve volume.

use crate::context::{BalanceTerm, CostTerm, GensetVars, ModelContext, OutputSeries};
use crate::error::ModelResult;
use dopt_core::GensetFleet;
use dopt_solver_common::LinearExpr;
use tracing::debug;

/// Big-M for switching fuel sources on availability.
const FUEL_BIG_M: f64 = 1e9;

pub fn build_gensets(ctx: &mut ModelContext, fleet: &GensetFleet) -> ModelResult<()> {
    let steps = ctx.steps();

    for genset in &fleet.gensets {
        let mut power = Vec::with_capacity(steps);
        for t in 0..steps {
            let p = ctx
                .lp
                .continuous(format!("genset_power[{},{}]", genset.name, t), 0.0, genset.capacity);
            // A backup unit only runs while the grid is down.
            let allowed = if genset.backup_only {
                (1.0 - ctx.site.grid_available[t]) * genset.capacity
            } else {
                genset.capacity
            };
            ctx.lp
                .le(format!("genset_availability[{},{}]", genset.name, t), p, allowed);
            power.push(p);
        }
        ctx.gensets.insert(
            genset.name.clone(),
            GensetVars {
                fuel: genset.fuel.clone(),
                power,
            },
        );
    }

    let mut fuel_cost = vec![LinearExpr::new(); steps];
    let mut fuel_co2 = vec![LinearExpr::new(); steps];
    let mut imports = Vec::with_capacity(fleet.fuels.len());
    let mut reserves = Vec::with_capacity(fleet.fuels.len());

    for fuel in &fleet.fuels {
        let burners: Vec<_> = fleet.gensets.iter().filter(|g| g.fuel == fuel.name).collect();
        let mut draw_from_reserves = LinearExpr::new();
        let mut import_row = Vec::with_capacity(steps);
        let mut reserve_row = Vec::with_capacity(steps);

        for t in 0..steps {
            let mut profile = LinearExpr::new();
            for g in &burners {
                profile += ctx.gensets[&g.name].power[t] * (1.0 / g.efficiency);
            }
            let import = ctx.lp.nonneg(format!("fuel_import[{},{}]", fuel.name, t));
            let reserve = ctx.lp.nonneg(format!("fuel_reserves[{},{}]", fuel.name, t));
            let available = ctx.site.fuel_available[t];
            ctx.lp.eq(
                format!("fuel_profile[{},{}]", fuel.name, t),
                profile.clone(),
                import + reserve,
            );
            ctx.lp
                .le(format!("fuel_import_available[{},{}]", fuel.name, t), import, FUEL_BIG_M * available);
            ctx.lp.le(
                format!("fuel_reserves_outage[{},{}]", fuel.name, t),
                reserve,
                FUEL_BIG_M * (1.0 - available),
            );

            if t < ctx.grid.last() {
                let per_step = 1.0 / ctx.grid.scale_fwd(t);
                draw_from_reserves += reserve * per_step;
                fuel_cost[t] += profile.clone() * (fuel.price * per_step);
                fuel_co2[t] += profile * (fuel.co2 * per_step);
            }
            import_row.push(LinearExpr::from(import));
            reserve_row.push(LinearExpr::from(reserve));
        }

        ctx.lp
            .le(format!("fuel_reserves_volume[{}]", fuel.name), draw_from_reserves, fuel.reserves);
        imports.push((fuel.name.clone(), import_row));
        reserves.push((fuel.name.clone(), reserve_row));
    }

    ctx.define_cost(CostTerm::Fuel, LinearExpr::sum(fuel_cost.iter()));
    ctx.co2_sources += LinearExpr::sum(fuel_co2.iter());

    let nodes = ctx.nodes();
    for (n, node) in nodes.iter().enumerate() {
        for t in 0..steps {
            let mut total = LinearExpr::new();
            for name in &node.gensets {
                if let Some(vars) = ctx.gensets.get(name) {
                    total += vars.power[t];
                }
            }
            ctx.link(BalanceTerm::Genset, n, t, total);
        }
    }

    let power = fleet
        .gensets
        .iter()
        .map(|g| {
            let row = ctx.gensets[&g.name].power.iter().map(|&v| LinearExpr::from(v)).collect();
            (g.name.clone(), row)
        })
        .collect();
    ctx.record("genset_power", OutputSeries::Indexed(power));
    ctx.record("fuel_import", OutputSeries::Indexed(imports));
    ctx.record("fuel_reserves", OutputSeries::Indexed(reserves));
    ctx.record("fuel_cost", OutputSeries::Time(fuel_cost));
    ctx.record("genset_co2", OutputSeries::Time(fuel_co2));
    debug!(
        gensets = fleet.gensets.len(),
        fuels = fleet.fuels.len(),
        "genset constraints added"
    );
    Ok(())
}
