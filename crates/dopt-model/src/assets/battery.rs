//! Battery storage: energy recursion, charge/discharge exclusion and
//! node aggregation.

use crate::context::{BalanceTerm, BatteryVars, ModelContext, OutputSeries};
use crate::error::ModelResult;
use dopt_core::Battery;
use dopt_solver_common::LinearExpr;
use tracing::debug;

/// Availability column of a battery; 0 disables it for the step.
pub fn avail_column(name: &str) -> String {
    format!("battery_{}_avail", name)
}

/// External energy draw column of a battery [kW].
pub fn demand_column(name: &str) -> String {
    format!("battery_{}_demand", name)
}

pub fn build_batteries(ctx: &mut ModelContext, batteries: &[Battery]) -> ModelResult<()> {
    for battery in batteries {
        let vars = add_battery(ctx, battery)?;
        ctx.batteries.insert(battery.name.clone(), vars);
    }
    link_nodes(ctx);
    record_outputs(ctx, batteries);
    debug!(count = batteries.len(), "battery constraints added");
    Ok(())
}

fn add_battery(ctx: &mut ModelContext, battery: &Battery) -> ModelResult<BatteryVars> {
    let name = &battery.name;
    let steps = ctx.steps();
    let avail = ctx
        .inputs
        .column_or(&avail_column(name), 1.0, &mut ctx.diagnostics)?;
    let demand = ctx
        .inputs
        .column_or(&demand_column(name), 0.0, &mut ctx.diagnostics)?;

    let lp = &mut ctx.lp;
    let mut vars = BatteryVars {
        node: ctx
            .config
            .topology
            .nodes
            .iter()
            .find(|n| n.batteries.contains(name))
            .map(|n| n.id.clone()),
        charge_grid: Vec::with_capacity(steps),
        discharge_grid: Vec::with_capacity(steps),
        charge_cell: Vec::with_capacity(steps),
        discharge_cell: Vec::with_capacity(steps),
        energy: Vec::with_capacity(steps),
        selfdischarge: Vec::with_capacity(steps),
        charging: Vec::with_capacity(steps),
    };
    for t in 0..steps {
        vars.charge_grid
            .push(lp.continuous(format!("battery_charge_grid_power[{},{}]", name, t), 0.0, battery.power_charge));
        vars.discharge_grid.push(lp.continuous(
            format!("battery_discharge_grid_power[{},{}]", name, t),
            0.0,
            battery.power_discharge,
        ));
        vars.charge_cell
            .push(lp.nonneg(format!("battery_charge_power[{},{}]", name, t)));
        vars.discharge_cell
            .push(lp.nonneg(format!("battery_discharge_power[{},{}]", name, t)));
        vars.energy.push(lp.continuous(
            format!("battery_energy[{},{}]", name, t),
            battery.soc_min * battery.capacity,
            battery.soc_max * battery.capacity,
        ));
        vars.selfdischarge
            .push(lp.nonneg(format!("battery_selfdischarge_power[{},{}]", name, t)));
        vars.charging
            .push(lp.binary(format!("battery_charging[{},{}]", name, t)));
    }

    for t in 0..steps {
        lp.eq(
            format!("battery_charge_efficiency[{},{}]", name, t),
            vars.charge_cell[t],
            vars.charge_grid[t] * battery.efficiency_charging,
        );
        lp.eq(
            format!("battery_discharge_efficiency[{},{}]", name, t),
            vars.discharge_cell[t],
            vars.discharge_grid[t] * (1.0 / battery.efficiency_discharging),
        );

        let x = vars.charging[t];
        lp.le(
            format!("battery_charge_xor[{},{}]", name, t),
            vars.charge_cell[t],
            x * (battery.power_charge * avail[t]),
        );
        lp.le(
            format!("battery_discharge_xor[{},{}]", name, t),
            vars.discharge_cell[t],
            LinearExpr::constant(battery.power_discharge * avail[t])
                - x * (battery.power_discharge * avail[t]),
        );

        if t == 0 {
            lp.fix(vars.selfdischarge[t], 0.0);
            lp.eq(
                format!("battery_energy_initial[{}]", name),
                vars.energy[t],
                battery.soc_initial * battery.capacity,
            );
        } else {
            lp.eq(
                format!("battery_selfdischarge[{},{}]", name, t),
                vars.selfdischarge[t],
                vars.energy[t - 1] * (battery.self_discharging / ctx.grid.scale(t)),
            );
            let inv_scale = 1.0 / ctx.grid.scale(t);
            let flow = LinearExpr::from(vars.charge_cell[t - 1])
                - vars.discharge_cell[t - 1]
                - vars.selfdischarge[t]
                - demand[t - 1];
            lp.eq(
                format!("battery_energy_balance[{},{}]", name, t),
                vars.energy[t],
                LinearExpr::from(vars.energy[t - 1]) + flow * inv_scale,
            );
        }
    }

    if let Some(fraction) = battery.soc_final {
        lp.eq(
            format!("battery_energy_final[{}]", name),
            vars.energy[steps - 1],
            fraction * battery.capacity,
        );
    }
    Ok(vars)
}

fn link_nodes(ctx: &mut ModelContext) {
    let nodes = ctx.nodes();
    for (n, node) in nodes.iter().enumerate() {
        for t in ctx.grid.steps() {
            let mut charge = LinearExpr::new();
            let mut discharge = LinearExpr::new();
            for name in &node.batteries {
                if let Some(vars) = ctx.batteries.get(name) {
                    charge += vars.charge_grid[t];
                    discharge += vars.discharge_grid[t];
                }
            }
            ctx.link(BalanceTerm::BatteryCharge, n, t, charge);
            ctx.link(BalanceTerm::BatteryDischarge, n, t, discharge);
        }
    }
}

fn record_outputs(ctx: &mut ModelContext, batteries: &[Battery]) {
    let steps = ctx.steps();
    let mut energy = Vec::new();
    let mut soc = Vec::new();
    let mut charge = Vec::new();
    let mut discharge = Vec::new();
    let mut stored = vec![LinearExpr::new(); steps];
    let total_capacity: f64 = batteries.iter().map(|b| b.capacity).sum();

    for battery in batteries {
        let Some(vars) = ctx.batteries.get(&battery.name) else {
            continue;
        };
        let as_exprs = |ids: &[dopt_solver_common::VarId]| -> Vec<LinearExpr> {
            ids.iter().map(|&v| LinearExpr::from(v)).collect()
        };
        let denom = battery.capacity.max(1e-3);
        soc.push((
            battery.name.clone(),
            vars.energy.iter().map(|&e| e * (1.0 / denom)).collect(),
        ));
        for (acc, &e) in stored.iter_mut().zip(&vars.energy) {
            *acc += e;
        }
        energy.push((battery.name.clone(), as_exprs(&vars.energy)));
        charge.push((battery.name.clone(), as_exprs(&vars.charge_grid)));
        discharge.push((battery.name.clone(), as_exprs(&vars.discharge_grid)));
    }

    let agg = stored
        .into_iter()
        .map(|e| e * (1.0 / total_capacity.max(1e-3)))
        .collect();
    ctx.record("battery_energy", OutputSeries::Indexed(energy));
    ctx.record("battery_soc", OutputSeries::Indexed(soc));
    ctx.record("battery_charge_grid_power", OutputSeries::Indexed(charge));
    ctx.record("battery_discharge_grid_power", OutputSeries::Indexed(discharge));
    ctx.record("battery_agg_soc", OutputSeries::Time(agg));
}
