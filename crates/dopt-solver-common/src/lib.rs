//! Linear program IR and IPC protocol for dispatch solver plugins.
//!
//! Model builders emit a [`LinearProgram`]. It is either solved in-process or
//! shipped to a plugin binary over Arrow IPC:
//!
//! ```text
//! dopt-model ──stdin──> dopt-milp (subprocess)
//!            <─stdout──
//!            <─stderr── (logs/errors)
//! ```
//!
//! With a `solver-*` feature enabled, [`embedded`] solves the same program
//! in-process through good_lp.
//!
//! Breaking changes to the stream layout increment [`PROTOCOL_VERSION`].

#[cfg(feature = "good_lp")]
pub mod embedded;
pub mod error;
pub mod ipc;
pub mod plugin;
pub mod program;
pub mod solution;
pub mod subprocess;

pub use error::{ExitCode, SolverError, SolverResult};
pub use plugin::{run_solver_plugin, SolverPlugin};
pub use program::{Constraint, LinearExpr, LinearProgram, Sense, VarId, VarKind, Variable};
pub use solution::{ProgramSolution, SolutionStatus, StopReason};
pub use subprocess::SolverProcess;

pub const PROTOCOL_VERSION: i32 = 1;

/// MILP solvers a dispatch model can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverId {
    /// Pure-Rust branch and bound (good_lp `microlp`)
    Microlp,
    /// HiGHS dual simplex and branch-and-cut
    Highs,
    /// COIN-OR Branch and Cut
    Cbc,
}

impl SolverId {
    pub fn display_name(&self) -> &'static str {
        match self {
            SolverId::Microlp => "microlp",
            SolverId::Highs => "HiGHS",
            SolverId::Cbc => "CBC",
        }
    }

    pub fn all() -> &'static [SolverId] {
        &[SolverId::Microlp, SolverId::Highs, SolverId::Cbc]
    }
}

impl std::fmt::Display for SolverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for SolverId {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "microlp" => Ok(SolverId::Microlp),
            "highs" => Ok(SolverId::Highs),
            "cbc" | "coin_cbc" => Ok(SolverId::Cbc),
            _ => Err(SolverError::UnknownSolver(s.to_string())),
        }
    }
}
