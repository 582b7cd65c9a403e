use super::status::{correction_for, StatusCorrection};
use super::SolverBackend;
use crate::error::ModelResult;
use dopt_solver_common::subprocess::{is_plugin_installed, DEFAULT_PLUGIN};
use dopt_solver_common::{LinearProgram, ProgramSolution, SolverError, SolverProcess};
use std::path::PathBuf;
use tracing::info;

/// Ships the program to a plugin binary over Arrow IPC.
pub struct SubprocessBackend {
    process: SolverProcess,
    solver_name: String,
    correction: Box<dyn StatusCorrection>,
}

impl SubprocessBackend {
    /// Use `path` when given, otherwise look the default plugin up in
    /// `~/.dopt/solvers` and on `PATH`.
    pub fn new(solver_name: &str, path: Option<PathBuf>, timeout_seconds: u64) -> ModelResult<Self> {
        let binary = match path {
            Some(path) => path,
            None => SolverProcess::find_binary(DEFAULT_PLUGIN)?,
        };
        info!(binary = %binary.display(), solver = solver_name, "using solver plugin");
        Ok(Self {
            process: SolverProcess::new(binary, timeout_seconds),
            solver_name: solver_name.to_string(),
            correction: correction_for(solver_name),
        })
    }
}

impl SolverBackend for SubprocessBackend {
    fn id(&self) -> &str {
        &self.solver_name
    }

    fn is_available(&self) -> bool {
        self.process.binary_path().exists() || is_plugin_installed(DEFAULT_PLUGIN)
    }

    fn status_correction(&self) -> &dyn StatusCorrection {
        self.correction.as_ref()
    }

    fn solve(&self, program: &LinearProgram) -> ModelResult<ProgramSolution> {
        let mut program = program.clone();
        program.solver = self.solver_name.clone();
        match self.process.solve_blocking(&program) {
            Ok(solution) => Ok(solution),
            Err(SolverError::Timeout { seconds }) => Ok(ProgramSolution::timeout(seconds)),
            Err(other) => Err(other.into()),
        }
    }
}
