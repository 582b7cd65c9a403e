//! Multi-node network formulations.
//!
//! Single-node models skip this module entirely; their injection, absorption
//! and loss terms are closed to zero with the other unclaimed terms.

pub mod matrices;
pub mod powerflow;
pub mod simple;

pub use matrices::{Impedance, NetworkError, NetworkTables};

use crate::context::{BalanceTerm, ModelContext};
use crate::error::ModelResult;
use dopt_core::DoptError;
use tracing::info;

pub fn build_network(ctx: &mut ModelContext) -> ModelResult<Option<NetworkTables>> {
    let config = ctx.config;
    let Some(spec) = config.topology.network.as_ref() else {
        return Ok(None);
    };
    let nodes = ctx.nodes();
    let tables = NetworkTables::derive(spec, nodes, &mut ctx.diagnostics).map_err(DoptError::from)?;
    add_pcc_gating(ctx);

    if spec.settings.enable_power_flow {
        info!("building linearized power flow over {} nodes", nodes.len());
        powerflow::build_power_flow(ctx, &tables, &spec.settings)?;
    } else {
        info!("building simple exchange over {} nodes", nodes.len());
        simple::build_simple_exchange(ctx, &tables);
    }
    Ok(Some(tables))
}

/// Only PCC nodes trade with the grid.
fn add_pcc_gating(ctx: &mut ModelContext) {
    let import_max = ctx.config.site.import_max;
    let export_max = ctx.config.site.export_max;
    let nodes = ctx.nodes();
    for (n, node) in nodes.iter().enumerate() {
        let pcc = if node.is_pcc { 1.0 } else { 0.0 };
        for t in ctx.grid.steps() {
            let import = ctx.term(BalanceTerm::GridImport, n, t);
            let export = ctx.term(BalanceTerm::GridExport, n, t);
            ctx.lp
                .le(format!("grid_import_pcc[{},{}]", node.id, t), import, pcc * import_max);
            ctx.lp
                .le(format!("grid_export_pcc[{},{}]", node.id, t), export, pcc * export_max);
        }
    }
}
