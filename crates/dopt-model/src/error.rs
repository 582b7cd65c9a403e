use dopt_core::DoptError;
use dopt_solver_common::SolverError;
use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Core(#[from] DoptError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("DataFrame error: {0}")]
    Polars(#[from] PolarsError),

    /// `build` was called on a model that already holds a program.
    #[error("model is already built; create a new DispatchModel for new inputs")]
    AlreadyBuilt,

    #[error("model has not been built")]
    NotBuilt,

    #[error("{0}")]
    Other(String),
}

impl ModelError {
    /// Errors raised while running the solver, as opposed to while setting it up.
    pub fn is_solver_runtime(&self) -> bool {
        matches!(
            self,
            ModelError::Solver(
                SolverError::ProcessFailed { .. }
                    | SolverError::Timeout { .. }
                    | SolverError::Ipc(_)
                    | SolverError::Arrow(_)
                    | SolverError::Io(_)
            )
        )
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
