//! MILP solver plugin binary for the dopt solver IPC protocol.
//!
//! 1. Reads a length-prefixed Arrow IPC program from stdin
//! 2. Solves it in-process with the good_lp backend named in the program
//! 3. Writes the solution stream to stdout
//!
//! The backend is chosen by the program's `solver` field (`microlp`, `highs`
//! or `cbc`); an empty field selects the first backend compiled in. Asking for
//! a backend this binary was built without exits with
//! [`ExitCode::SolverError`](dopt_solver_common::ExitCode).
//!
//! Logs go to stderr and honor `RUST_LOG`.

use anyhow::{Context, Result};
use dopt_solver_common::embedded::{compiled_solvers, solve_in_process};
use dopt_solver_common::{run_solver_plugin, LinearProgram, ProgramSolution, SolverId, SolverPlugin};
use tracing::info;

struct MilpPlugin;

impl MilpPlugin {
    fn pick(&self, program: &LinearProgram) -> Result<SolverId> {
        if program.solver.trim().is_empty() {
            return compiled_solvers()
                .into_iter()
                .next()
                .context("no MILP backend compiled into dopt-milp");
        }
        program
            .solver
            .parse::<SolverId>()
            .with_context(|| format!("program requests solver '{}'", program.solver))
    }
}

impl SolverPlugin for MilpPlugin {
    fn name(&self) -> &'static str {
        "dopt-milp"
    }

    fn init(&self) -> Result<()> {
        let names: Vec<_> = compiled_solvers().iter().map(|s| s.display_name()).collect();
        info!("backends compiled in: {}", names.join(", "));
        Ok(())
    }

    fn solve(&self, program: &LinearProgram) -> Result<ProgramSolution> {
        let solver = self.pick(program)?;
        let solution = solve_in_process(program, solver)
            .with_context(|| format!("solving with {}", solver))?;
        info!(
            "{} finished in {} ms: {}",
            solver, solution.solve_time_ms, solution.status
        );
        Ok(solution)
    }
}

fn main() {
    run_solver_plugin(MilpPlugin);
}
