//! Solver backends.
//!
//! A backend takes a finished [`LinearProgram`] and returns raw values in
//! variable order. Backends never see the model structure; projection and
//! cost reporting happen in the orchestrator.

#[cfg(any(feature = "solver-microlp", feature = "solver-highs", feature = "solver-cbc"))]
pub mod embedded;
pub mod status;
pub mod subprocess;

#[cfg(any(feature = "solver-microlp", feature = "solver-highs", feature = "solver-cbc"))]
pub use embedded::EmbeddedBackend;
pub use status::{correction_for, NoCorrection, ObjectiveMessageCorrection, StatusCorrection};
pub use subprocess::SubprocessBackend;

use crate::error::ModelResult;
use dopt_core::config::{BackendKind, SolverConfig};
use dopt_solver_common::{LinearProgram, ProgramSolution};

pub trait SolverBackend: Send + Sync {
    /// Solver name reported in results.
    fn id(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Applied to every solution before it is interpreted.
    fn status_correction(&self) -> &dyn StatusCorrection;

    /// Solve `program`.
    ///
    /// A timeout is an `Ok` solution with `Timeout` status; `Err` is reserved
    /// for failures to run the solver at all.
    fn solve(&self, program: &LinearProgram) -> ModelResult<ProgramSolution>;
}

/// Backend selected by the solver section of the configuration.
pub fn backend_for(config: &SolverConfig) -> ModelResult<Box<dyn SolverBackend>> {
    match config.backend {
        BackendKind::Embedded => embedded_backend(config),
        BackendKind::Subprocess => Ok(Box::new(SubprocessBackend::new(
            &config.name,
            config.path.clone(),
            config.timeout_seconds,
        )?)),
    }
}

#[cfg(any(feature = "solver-microlp", feature = "solver-highs", feature = "solver-cbc"))]
fn embedded_backend(config: &SolverConfig) -> ModelResult<Box<dyn SolverBackend>> {
    let solver: dopt_solver_common::SolverId = config.name.parse()?;
    let backend = EmbeddedBackend::new(solver, config.timeout_seconds);
    if !backend.is_available() {
        return Err(dopt_solver_common::SolverError::NotCompiled(config.name.clone()).into());
    }
    Ok(Box::new(backend))
}

#[cfg(not(any(feature = "solver-microlp", feature = "solver-highs", feature = "solver-cbc")))]
fn embedded_backend(config: &SolverConfig) -> ModelResult<Box<dyn SolverBackend>> {
    Err(dopt_solver_common::SolverError::NotCompiled(config.name.clone()).into())
}
