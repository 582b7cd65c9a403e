//! Vendor-specific fixes to reported termination status.

use dopt_solver_common::{ProgramSolution, SolutionStatus};
use tracing::warn;

pub trait StatusCorrection: Send + Sync {
    fn id(&self) -> &str;

    /// Adjust `solution` in place.
    fn correct(&self, solution: &mut ProgramSolution);
}

/// Trust the backend's status as reported.
pub struct NoCorrection;

impl StatusCorrection for NoCorrection {
    fn id(&self) -> &str {
        "none"
    }

    fn correct(&self, _solution: &mut ProgramSolution) {}
}

/// CBC can report "optimal" for a problem it never solved. A genuine optimum
/// always carries an objective in the termination message; anything else is
/// downgraded to infeasible.
pub struct ObjectiveMessageCorrection;

impl StatusCorrection for ObjectiveMessageCorrection {
    fn id(&self) -> &str {
        "objective-message"
    }

    fn correct(&self, solution: &mut ProgramSolution) {
        if solution.status != SolutionStatus::Optimal {
            return;
        }
        let mentions_objective = solution
            .message
            .as_deref()
            .map(|m| m.to_lowercase().contains("objective"))
            .unwrap_or(false);
        if !mentions_objective {
            warn!(
                solver = %solution.solver,
                "optimal status without an objective in the solver message; treating as infeasible"
            );
            solution.status = SolutionStatus::Infeasible;
            solution.objective = f64::NAN;
            solution.values.clear();
        }
    }
}

/// Correction for a solver name.
pub fn correction_for(solver: &str) -> Box<dyn StatusCorrection> {
    match solver.to_lowercase().as_str() {
        "cbc" | "coin_cbc" => Box::new(ObjectiveMessageCorrection),
        _ => Box::new(NoCorrection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimal(message: Option<&str>) -> ProgramSolution {
        let mut sol = ProgramSolution::optimal(10.0, vec![1.0, 2.0]);
        sol.message = message.map(str::to_string);
        sol
    }

    #[test]
    fn test_optimal_without_objective_becomes_infeasible() {
        let mut sol = optimal(Some("Stopped on iterations"));
        ObjectiveMessageCorrection.correct(&mut sol);
        assert_eq!(sol.status, SolutionStatus::Infeasible);
        assert!(sol.objective_value().is_none());
        assert!(!sol.has_values());
    }

    #[test]
    fn test_optimal_with_objective_kept() {
        let mut sol = optimal(Some("Optimal - objective value 10"));
        ObjectiveMessageCorrection.correct(&mut sol);
        assert_eq!(sol.status, SolutionStatus::Optimal);
        assert_eq!(sol.objective_value(), Some(10.0));
    }

    #[test]
    fn test_missing_message_downgraded() {
        let mut sol = optimal(None);
        correction_for("CBC").correct(&mut sol);
        assert_eq!(sol.status, SolutionStatus::Infeasible);
    }

    #[test]
    fn test_other_solvers_untouched() {
        let mut sol = optimal(None);
        correction_for("highs").correct(&mut sol);
        assert_eq!(sol.status, SolutionStatus::Optimal);
        assert_eq!(correction_for("microlp").id(), "none");
    }
}
