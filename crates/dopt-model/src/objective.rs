//! Weighted objective over the scalar cost terms.

use crate::context::{CostTerm, ModelContext};
use dopt_core::config::ObjectiveWeights;
use dopt_solver_common::{LinearExpr, VarId};
use std::collections::BTreeMap;

pub fn weight(weights: &ObjectiveWeights, term: CostTerm) -> f64 {
    match term {
        CostTerm::Energy => weights.weight_energy,
        CostTerm::Demand => weights.weight_demand,
        CostTerm::ExportRevenue => weights.weight_export,
        CostTerm::RegulationRevenue => weights.weight_regulation,
        CostTerm::Fuel => weights.weight_fuel,
        CostTerm::LoadShed => weights.weight_load_shed,
        CostTerm::Co2 => weights.weight_co2,
        CostTerm::Degradation => weights.weight_degradation,
    }
}

pub fn compose(weights: &ObjectiveWeights, costs: &BTreeMap<CostTerm, VarId>) -> LinearExpr {
    let mut objective = LinearExpr::new();
    for (&term, &var) in costs {
        let w = weight(weights, term);
        if w != 0.0 {
            objective.add_term(var, w);
        }
    }
    objective
}

pub fn set_objective(ctx: &mut ModelContext) {
    let costs: BTreeMap<CostTerm, VarId> = CostTerm::ALL.iter().map(|&term| (term, ctx.cost(term))).collect();
    let objective = compose(&ctx.config.objective, &costs);
    ctx.lp.minimize(objective);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_co2_left_out_by_default() {
        let weights = ObjectiveWeights::default();
        let costs: BTreeMap<CostTerm, VarId> = CostTerm::ALL
            .iter()
            .enumerate()
            .map(|(i, &term)| (term, VarId(i)))
            .collect();
        let objective = compose(&weights, &costs);
        assert_eq!(objective.terms.len(), CostTerm::ALL.len() - 1);
        assert!(objective.terms.iter().all(|(_, w)| *w == 1.0));
    }
}
