//! Sheddable load circuits.

use crate::context::{BalanceTerm, CircuitVars, CostTerm, ModelContext, OutputSeries};
use crate::error::ModelResult;
use dopt_core::LoadCircuit;
use dopt_solver_common::LinearExpr;

/// Shed power of a circuit: `potential · (1 − on)`.
fn shed(vars: &CircuitVars, t: usize) -> LinearExpr {
    LinearExpr::constant(vars.potential[t]) - vars.on[t] * vars.potential[t]
}

pub fn build_load_control(ctx: &mut ModelContext, circuits: &[LoadCircuit]) -> ModelResult<()> {
    let steps = ctx.steps();
    let mut cost = LinearExpr::new();

    for circuit in circuits {
        // Required: a missing potential column is a configuration error.
        let potential = ctx.inputs.column(&circuit.potential_column())?;
        let mut on = Vec::with_capacity(steps);
        for t in 0..steps {
            let x = ctx.lp.binary(format!("load_circuit_on[{},{}]", circuit.name, t));
            if circuit.outage_only {
                ctx.lp.ge(
                    format!("load_circuit_outage_only[{},{}]", circuit.name, t),
                    x,
                    ctx.site.grid_available[t],
                );
            }
            on.push(x);
        }
        let vars = CircuitVars { on, potential };
        for t in ctx.grid.accounting() {
            cost += shed(&vars, t) * (circuit.cost / ctx.grid.scale_fwd(t));
        }
        ctx.circuits.insert(circuit.name.clone(), vars);
    }
    ctx.define_cost(CostTerm::LoadShed, cost);

    let nodes = ctx.nodes();
    for (n, node) in nodes.iter().enumerate() {
        for t in 0..steps {
            let mut total = LinearExpr::new();
            for name in &node.load_circuits {
                if let Some(vars) = ctx.circuits.get(name) {
                    total += shed(vars, t);
                }
            }
            ctx.link(BalanceTerm::LoadShed, n, t, total);
        }
    }

    let per_circuit = circuits
        .iter()
        .filter_map(|c| ctx.circuits.get(&c.name).map(|v| (c, v)))
        .map(|(c, v)| (c.name.clone(), (0..steps).map(|t| shed(v, t)).collect()))
        .collect();
    let status = circuits
        .iter()
        .filter_map(|c| ctx.circuits.get(&c.name).map(|v| (c, v)))
        .map(|(c, v)| (c.name.clone(), v.on.iter().map(|&x| LinearExpr::from(x)).collect()))
        .collect();
    ctx.record("load_circuit_shed", OutputSeries::Indexed(per_circuit));
    ctx.record("load_circuit_on", OutputSeries::Indexed(status));
    Ok(())
}
