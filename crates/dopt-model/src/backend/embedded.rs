use super::status::{correction_for, StatusCorrection};
use super::SolverBackend;
use crate::error::ModelResult;
use dopt_solver_common::embedded::{is_compiled, solve_in_process};
use dopt_solver_common::{LinearProgram, ProgramSolution, SolverId};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Solves on a dedicated worker thread through good_lp.
///
/// A solve that outlives the timeout is abandoned: the worker is detached and
/// its late result dropped.
pub struct EmbeddedBackend {
    solver: SolverId,
    timeout_seconds: u64,
    correction: Box<dyn StatusCorrection>,
}

impl EmbeddedBackend {
    pub fn new(solver: SolverId, timeout_seconds: u64) -> Self {
        Self {
            solver,
            timeout_seconds,
            correction: correction_for(solver.display_name()),
        }
    }

    pub fn solver(&self) -> SolverId {
        self.solver
    }
}

impl SolverBackend for EmbeddedBackend {
    fn id(&self) -> &str {
        self.solver.display_name()
    }

    fn is_available(&self) -> bool {
        is_compiled(self.solver)
    }

    fn status_correction(&self) -> &dyn StatusCorrection {
        self.correction.as_ref()
    }

    fn solve(&self, program: &LinearProgram) -> ModelResult<ProgramSolution> {
        let (tx, rx) = mpsc::channel();
        let owned = program.clone();
        let solver = self.solver;
        thread::Builder::new()
            .name(format!("dopt-solve-{}", solver))
            .spawn(move || {
                // The receiver may be gone after a timeout.
                let _ = tx.send(solve_in_process(&owned, solver));
            })
            .map_err(dopt_solver_common::SolverError::Io)?;

        let outcome = if self.timeout_seconds > 0 {
            rx.recv_timeout(Duration::from_secs(self.timeout_seconds))
                .map_err(|e| matches!(e, mpsc::RecvTimeoutError::Timeout))
        } else {
            rx.recv().map_err(|_| false)
        };
        match outcome {
            Ok(result) => {
                let solution = result?;
                debug!(solver = %solver, ms = solution.solve_time_ms, "embedded solve finished");
                Ok(solution)
            }
            Err(true) => {
                warn!(solver = %solver, "solve abandoned after {} s", self.timeout_seconds);
                let mut solution = ProgramSolution::timeout(self.timeout_seconds);
                solution.solver = solver.display_name().to_string();
                Ok(solution)
            }
            Err(false) => Ok(ProgramSolution::error("solver worker exited without a result")),
        }
    }
}
