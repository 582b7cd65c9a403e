//! Error types and exit codes for solver communication.

use thiserror::Error;

/// Exit codes of a solver plugin process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success (check the status in the solution for optimality)
    Success = 0,
    /// Malformed Arrow input or missing fields
    InvalidInput = 1,
    SolverError = 2,
    Timeout = 3,
    /// Native crash (SIGSEGV)
    Segfault = 139,
}

impl ExitCode {
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => ExitCode::Success,
            1 => ExitCode::InvalidInput,
            2 => ExitCode::SolverError,
            3 => ExitCode::Timeout,
            139 => ExitCode::Segfault,
            _ => ExitCode::SolverError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Unknown solver: {0}")]
    UnknownSolver(String),

    #[error("Solver plugin '{binary}' not found in ~/.dopt/solvers or PATH")]
    NotInstalled { binary: String },

    /// The requested backend was not compiled into this binary.
    #[error("Solver '{0}' is not available in this build")]
    NotCompiled(String),

    #[error("Failed to start solver process: {0}")]
    ProcessStart(#[source] std::io::Error),

    #[error("Solver process failed with exit code {exit_code:?}: {message}")]
    ProcessFailed { exit_code: ExitCode, message: String },

    #[error("Solver timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Invalid program: {0}")]
    InvalidProgram(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SolverResult<T> = Result<T, SolverError>;
