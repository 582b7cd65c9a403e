//! Solution returned by a solver backend.

use crate::program::VarId;
use serde::{Deserialize, Serialize};

/// Status of the solver solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Timeout,
    IterationLimit,
    NumericalError,
    Error,
    Unknown,
}

impl SolutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SolutionStatus::Optimal)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success() && !matches!(self, SolutionStatus::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolutionStatus::Optimal => "optimal",
            SolutionStatus::Infeasible => "infeasible",
            SolutionStatus::Unbounded => "unbounded",
            SolutionStatus::Timeout => "timeout",
            SolutionStatus::IterationLimit => "iteration_limit",
            SolutionStatus::NumericalError => "numerical_error",
            SolutionStatus::Error => "error",
            SolutionStatus::Unknown => "unknown",
        }
    }

    /// Inverse of [`SolutionStatus::as_str`]; unrecognized text maps to `Unknown`.
    pub fn parse(text: &str) -> Self {
        match text {
            "optimal" => SolutionStatus::Optimal,
            "infeasible" => SolutionStatus::Infeasible,
            "unbounded" => SolutionStatus::Unbounded,
            "timeout" => SolutionStatus::Timeout,
            "iteration_limit" => SolutionStatus::IterationLimit,
            "numerical_error" => SolutionStatus::NumericalError,
            "error" => SolutionStatus::Error,
            _ => SolutionStatus::Unknown,
        }
    }
}

impl std::fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a solver that returned values stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Optimal,
    /// Time limit hit with an incumbent
    TimeLimit,
    /// Relative or absolute gap limit reached
    GapLimit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSolution {
    pub status: SolutionStatus,
    /// NaN when no objective is available
    pub objective: f64,
    pub solve_time_ms: i64,
    /// Name of the solver that produced this result
    pub solver: String,
    /// Raw termination text from the solver, used by status correction
    pub message: Option<String>,
    /// One value per program variable, in variable order
    pub values: Vec<f64>,
}

impl ProgramSolution {
    pub fn error(message: &str) -> Self {
        Self {
            status: SolutionStatus::Error,
            objective: f64::NAN,
            solve_time_ms: 0,
            solver: String::new(),
            message: Some(message.to_string()),
            values: Vec::new(),
        }
    }

    pub fn infeasible(message: &str) -> Self {
        Self {
            status: SolutionStatus::Infeasible,
            ..Self::error(message)
        }
    }

    pub fn timeout(seconds: u64) -> Self {
        Self {
            status: SolutionStatus::Timeout,
            ..Self::error(&format!("Solver timed out after {} seconds", seconds))
        }
    }

    pub fn optimal(objective: f64, values: Vec<f64>) -> Self {
        Self {
            status: SolutionStatus::Optimal,
            objective,
            solve_time_ms: 0,
            solver: String::new(),
            message: None,
            values,
        }
    }

    /// Solution for a solver that stopped with values, carrying the
    /// termination line CBC prints for the same outcome.
    ///
    /// A gap-limited stop counts as optimal: the gap is the tolerance the
    /// caller asked for. A time-limited incumbent keeps its values but is
    /// reported as a timeout. An "optimal" result whose values do not
    /// evaluate to a finite objective gets a message without one, so
    /// status correction can reject it.
    pub fn stopped(reason: StopReason, objective: f64, values: Vec<f64>) -> Self {
        let (status, head) = match reason {
            StopReason::Optimal => (SolutionStatus::Optimal, "Optimal"),
            StopReason::GapLimit => (SolutionStatus::Optimal, "Stopped on ratio gap"),
            StopReason::TimeLimit => (SolutionStatus::Timeout, "Stopped on time"),
        };
        let message = if objective.is_finite() {
            format!("{} - objective value {}", head, objective)
        } else {
            format!("{} - no finite solution", head)
        };
        Self {
            status,
            objective,
            solve_time_ms: 0,
            solver: String::new(),
            message: Some(message),
            values,
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status.is_success()
    }

    pub fn has_values(&self) -> bool {
        !self.values.is_empty()
    }

    pub fn value(&self, var: VarId) -> Option<f64> {
        self.values.get(var.0).copied()
    }

    pub fn objective_value(&self) -> Option<f64> {
        if self.objective.is_finite() {
            Some(self.objective)
        } else {
            None
        }
    }
}

impl Default for ProgramSolution {
    fn default() -> Self {
        Self::error("No solution")
    }
}
