//! Battery thermal and aging model.
//!
//! Cell temperature follows a first-order RC network driven by the
//! conversion losses and the outside temperature:
//!
//! ```text
//! T[t] = (R·Q[t] + R·C·T[t-1]/dt + T_out[t]) / (1 + R·C/dt)
//! ```
//!
//! Calendar aging is linear in temperature. Cycle aging adds C-rate and
//! Ah-throughput terms and is multiplied by zero unless
//! `cycle_aging_enabled` is set. Aging in percent is priced at the
//! battery's replacement cost.

use crate::context::{BatteryVars, CostTerm, ModelContext, OutputSeries};
use crate::error::{ModelError, ModelResult};
use dopt_core::config::DegradationConfig;
use dopt_core::Battery;
use dopt_solver_common::LinearExpr;

const DAYS_PER_YEAR: f64 = 365.0;
const HOURS_PER_YEAR: f64 = 24.0 * DAYS_PER_YEAR;

pub fn build_degradation(
    ctx: &mut ModelContext,
    batteries: &[Battery],
    config: &DegradationConfig,
) -> ModelResult<()> {
    let steps = ctx.steps();
    let cycle_factor = if config.cycle_aging_enabled { 1.0 } else { 0.0 };
    let mut cost = LinearExpr::new();
    let mut temperatures = Vec::with_capacity(batteries.len());
    let mut aging = Vec::with_capacity(batteries.len());

    for battery in batteries {
        let thermal = battery.thermal.as_ref().ok_or_else(|| {
            ModelError::Other(format!("battery '{}' has no thermal parameters", battery.name))
        })?;
        let vars: BatteryVars = ctx
            .batteries
            .get(&battery.name)
            .cloned()
            .ok_or_else(|| ModelError::Other(format!("battery '{}' was not built", battery.name)))?;

        let mut temp = Vec::with_capacity(steps);
        let mut degradation = Vec::with_capacity(steps);
        for t in 0..steps {
            let tv = ctx
                .lp
                .free(format!("battery_temperature[{},{}]", battery.name, t));
            // Conversion losses in W.
            let heat = (vars.charge_grid[t] * (1.0 - battery.efficiency_charging)
                + vars.discharge_grid[t] * (1.0 - battery.efficiency_discharging))
                * 1000.0;
            if t == 0 {
                ctx.lp.fix(tv, thermal.temperature_initial);
            } else {
                let dt = ctx.grid.duration(t);
                let rc = thermal.resistance * thermal.capacitance / dt;
                let rhs = (heat * thermal.resistance
                    + temp[t - 1] * rc
                    + ctx.site.outside_temperature[t])
                    * (1.0 / (1.0 + rc));
                ctx.lp
                    .eq(format!("battery_thermal[{},{}]", battery.name, t), tv, rhs);
            }
            temp.push(tv);

            let scale = ctx.grid.scale(t);
            let calendar = (LinearExpr::from(tv) * config.calendar.b0
                + (config.calendar.a0 + config.calendar.b1 * DAYS_PER_YEAR))
                * (1.0 / (scale * HOURS_PER_YEAR));
            let throughput = vars.charge_grid[t] + vars.discharge_grid[t];
            let c_rate = throughput.clone() * (1.0 / battery.capacity.max(1e-3));
            let amp_hours = throughput * (1000.0 / (scale * thermal.nominal_voltage));
            let cycle = LinearExpr::from(tv) * config.cycle.b0
                + c_rate * config.cycle.b1
                + amp_hours * config.cycle.b2;
            degradation.push(calendar + cycle * cycle_factor);
        }

        for t in ctx.grid.accounting() {
            cost += degradation[t].clone() * (thermal.replacement_cost / 100.0);
        }
        temperatures.push((
            battery.name.clone(),
            temp.iter().map(|&v| LinearExpr::from(v)).collect(),
        ));
        aging.push((battery.name.clone(), degradation));
    }

    ctx.define_cost(CostTerm::Degradation, cost);
    ctx.record("battery_temperature", OutputSeries::Indexed(temperatures));
    ctx.record("battery_degradation", OutputSeries::Indexed(aging));
    Ok(())
}
