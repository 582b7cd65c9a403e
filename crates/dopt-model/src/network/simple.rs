//! Lossy transport between connected nodes.
//!
//! For every connected ordered pair `(i, j)` and step:
//!
//! ```text
//! out[i,j]  = in[j,i] + loss[i,j]        power leaving i towards j
//! loss[i,j] = rate · in[j,i]             lost on the way
//! in[i,j]  <= power_capacity[i,j]        power absorbed by i from j
//! ```
//!
//! Node terms: `power_abs[i] = Σ_j in[i,j]`, `power_inj[i] = Σ_j in[j,i]`
//! (the delivered part of i's outflow) and `power_network_losses[i] =
//! Σ_j loss[i,j]`, so injected plus losses is exactly what leaves the node.

use super::matrices::NetworkTables;
use crate::context::{BalanceTerm, ModelContext, OutputSeries};
use dopt_solver_common::{LinearExpr, VarId};
use std::collections::HashMap;

struct Flow {
    inflow: VarId,
    loss: VarId,
}

pub fn build_simple_exchange(ctx: &mut ModelContext, tables: &NetworkTables) {
    let rate = ctx
        .config
        .topology
        .network
        .as_ref()
        .map(|net| net.settings.simple_network_losses)
        .unwrap_or(0.0);
    let pairs = tables.directed_pairs();
    let ids = &tables.node_ids;
    let n = tables.len();
    let mut flows_out = vec![Vec::with_capacity(ctx.steps()); n];

    for t in ctx.grid.steps() {
        let mut flows: HashMap<(usize, usize), Flow> = HashMap::with_capacity(pairs.len());
        let mut outflow: HashMap<(usize, usize), VarId> = HashMap::with_capacity(pairs.len());
        for &(i, j) in &pairs {
            let out = ctx
                .lp
                .nonneg(format!("power_out[{},{},{}]", ids[i], ids[j], t));
            let inflow = ctx.lp.continuous(
                format!("power_in[{},{},{}]", ids[i], ids[j], t),
                0.0,
                tables.power_capacity[i][j],
            );
            let loss = ctx
                .lp
                .nonneg(format!("power_loss[{},{},{}]", ids[i], ids[j], t));
            outflow.insert((i, j), out);
            flows.insert((i, j), Flow { inflow, loss });
        }
        for &(i, j) in &pairs {
            let delivered = flows[&(j, i)].inflow;
            let loss = flows[&(i, j)].loss;
            ctx.lp.eq(
                format!("power_out_split[{},{},{}]", ids[i], ids[j], t),
                outflow[&(i, j)],
                delivered + loss,
            );
            ctx.lp.eq(
                format!("power_loss_rate[{},{},{}]", ids[i], ids[j], t),
                loss,
                delivered * rate,
            );
        }

        for (i, row) in flows_out.iter_mut().enumerate() {
            let mut absorbed = LinearExpr::new();
            let mut injected = LinearExpr::new();
            let mut losses = LinearExpr::new();
            let mut out = LinearExpr::new();
            for &(a, b) in pairs.iter().filter(|&&(a, _)| a == i) {
                absorbed += flows[&(a, b)].inflow;
                injected += flows[&(b, a)].inflow;
                losses += flows[&(a, b)].loss;
                out += outflow[&(a, b)];
            }
            ctx.link(BalanceTerm::PowerAbsorbed, i, t, absorbed);
            ctx.link(BalanceTerm::PowerInjected, i, t, injected);
            ctx.link(BalanceTerm::NetworkLosses, i, t, losses);
            row.push(out);
        }
    }

    let indexed = ids.iter().cloned().zip(flows_out).collect();
    ctx.record("power_out", OutputSeries::Indexed(indexed));
}
