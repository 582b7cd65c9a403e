//! In-process MILP solving through good_lp.
//!
//! The [`LinearProgram`] is translated one-to-one: every IR variable becomes a
//! good_lp variable with the same bounds and integrality, every named row a
//! good_lp constraint. Which solvers exist depends on the `solver-*` features
//! this crate was compiled with.

use crate::error::{SolverError, SolverResult};
use crate::program::{LinearProgram, Sense, VarKind};
use crate::solution::{ProgramSolution, SolutionStatus, StopReason};
use crate::SolverId;
use good_lp::{
    constraint, variable, Constraint, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use std::time::Instant;
use tracing::{debug, warn};

/// Solvers compiled into this build.
pub fn compiled_solvers() -> Vec<SolverId> {
    let mut out = Vec::new();
    if cfg!(feature = "solver-microlp") {
        out.push(SolverId::Microlp);
    }
    if cfg!(feature = "solver-highs") {
        out.push(SolverId::Highs);
    }
    if cfg!(feature = "solver-cbc") {
        out.push(SolverId::Cbc);
    }
    out
}

pub fn is_compiled(solver: SolverId) -> bool {
    compiled_solvers().contains(&solver)
}

struct Translated {
    vars: ProblemVariables,
    handles: Vec<Variable>,
    objective: Expression,
    constraints: Vec<Constraint>,
}

fn translate(program: &LinearProgram) -> SolverResult<Translated> {
    let mut vars = ProblemVariables::new();
    let mut handles = Vec::with_capacity(program.num_vars());
    for var in &program.variables {
        if var.lower > var.upper || var.lower.is_nan() || var.upper.is_nan() {
            return Err(SolverError::InvalidProgram(format!(
                "variable '{}' has empty domain [{}, {}]",
                var.name, var.lower, var.upper
            )));
        }
        let mut def = variable().name(var.name.clone());
        if var.lower.is_finite() {
            def = def.min(var.lower);
        }
        if var.upper.is_finite() {
            def = def.max(var.upper);
        }
        def = match var.kind {
            VarKind::Continuous => def,
            VarKind::Binary | VarKind::Integer => def.integer(),
        };
        handles.push(vars.add(def));
    }

    let linear = |terms: &[(crate::program::VarId, f64)], name: &str| -> SolverResult<Expression> {
        let mut expr = Expression::from(0.0);
        for (var, coef) in terms {
            if !coef.is_finite() {
                return Err(SolverError::InvalidProgram(format!(
                    "non-finite coefficient in '{}'",
                    name
                )));
            }
            let handle = handles.get(var.0).ok_or_else(|| {
                SolverError::InvalidProgram(format!("'{}' references unknown variable {}", name, var.0))
            })?;
            expr += *coef * *handle;
        }
        Ok(expr)
    };

    let mut objective = linear(&program.objective.terms, "objective")?;
    objective += program.objective.constant;

    let mut constraints = Vec::with_capacity(program.num_constraints());
    for row in &program.constraints {
        let lhs = linear(&row.terms, &row.name)?;
        let rhs = row.rhs;
        constraints.push(match row.sense {
            Sense::Le => constraint!(lhs <= rhs),
            Sense::Ge => constraint!(lhs >= rhs),
            Sense::Eq => constraint!(lhs == rhs),
        });
    }

    Ok(Translated {
        vars,
        handles,
        objective,
        constraints,
    })
}

impl From<good_lp::SolutionStatus> for StopReason {
    fn from(status: good_lp::SolutionStatus) -> Self {
        match status {
            good_lp::SolutionStatus::Optimal => StopReason::Optimal,
            good_lp::SolutionStatus::TimeLimit => StopReason::TimeLimit,
            good_lp::SolutionStatus::GapLimit => StopReason::GapLimit,
        }
    }
}

/// Values and the solver's own stop reason. For CBC the reason comes from
/// the raw model's status and secondary status.
fn run<M>(
    mut model: M,
    constraints: Vec<Constraint>,
    handles: &[Variable],
) -> Result<(Vec<f64>, StopReason), ResolutionError>
where
    M: SolverModel<Error = ResolutionError>,
{
    for c in constraints {
        model.add_constraint(c);
    }
    let solution = model.solve()?;
    let values = handles.iter().map(|&v| solution.value(v)).collect();
    Ok((values, solution.status().into()))
}

/// Solve a program on the calling thread.
///
/// Solver failures (infeasible, unbounded, internal errors) are reported in
/// the returned solution's status; `Err` is reserved for programs that cannot
/// be translated or solvers missing from this build.
pub fn solve_in_process(program: &LinearProgram, solver: SolverId) -> SolverResult<ProgramSolution> {
    if !is_compiled(solver) {
        return Err(SolverError::NotCompiled(solver.to_string()));
    }
    let start = Instant::now();
    let Translated {
        vars,
        handles,
        objective,
        constraints,
    } = translate(program)?;
    debug!(
        solver = %solver,
        vars = handles.len(),
        rows = constraints.len(),
        "translated program for good_lp"
    );

    let problem = vars.minimise(objective);
    let outcome: Result<(Vec<f64>, StopReason), ResolutionError> = match solver {
        #[cfg(feature = "solver-microlp")]
        SolverId::Microlp => run(problem.using(good_lp::microlp), constraints, &handles),
        #[cfg(feature = "solver-highs")]
        SolverId::Highs => {
            let mut model = problem.using(good_lp::highs).set_verbose(false);
            if program.timeout_seconds > 0 {
                model = model.set_time_limit(program.timeout_seconds as f64);
            }
            for (key, value) in &program.options {
                model = apply_highs_option(model, key, value);
            }
            run(model, constraints, &handles)
        }
        #[cfg(feature = "solver-cbc")]
        SolverId::Cbc => {
            let mut model = problem.using(good_lp::coin_cbc);
            model.set_parameter("log", "0");
            if program.timeout_seconds > 0 {
                model.set_parameter("seconds", &program.timeout_seconds.to_string());
            }
            for (key, value) in &program.options {
                model.set_parameter(key, value);
            }
            run(model, constraints, &handles)
        }
        #[allow(unreachable_patterns)]
        _ => return Err(SolverError::NotCompiled(solver.to_string())),
    };

    let elapsed = start.elapsed().as_millis() as i64;
    let mut solution = match outcome {
        Ok((values, reason)) => {
            let objective = program.objective.evaluate(&values);
            if reason != StopReason::Optimal {
                warn!(solver = %solver, ?reason, objective, "solver stopped before proving optimality");
            }
            ProgramSolution::stopped(reason, objective, values)
        }
        Err(ResolutionError::Infeasible) => ProgramSolution::infeasible("Problem proven infeasible"),
        Err(ResolutionError::Unbounded) => ProgramSolution {
            status: SolutionStatus::Unbounded,
            ..ProgramSolution::error("Problem proven unbounded")
        },
        Err(other) => {
            warn!(solver = %solver, "good_lp reported: {}", other);
            ProgramSolution::error(&other.to_string())
        }
    };
    solution.solve_time_ms = elapsed;
    solution.solver = solver.display_name().to_string();
    Ok(solution)
}

#[cfg(feature = "solver-highs")]
fn apply_highs_option(
    model: good_lp::solvers::highs::HighsProblem,
    key: &str,
    value: &str,
) -> good_lp::solvers::highs::HighsProblem {
    if let Ok(v) = value.parse::<i32>() {
        model.set_option(key, v)
    } else if let Ok(v) = value.parse::<f64>() {
        model.set_option(key, v)
    } else if let Ok(v) = value.parse::<bool>() {
        model.set_option(key, v)
    } else {
        model.set_option(key, value)
    }
}
