//! Plugin harness for solver binaries.
//!
//! ```rust,ignore
//! use dopt_solver_common::plugin::{run_solver_plugin, SolverPlugin};
//! use dopt_solver_common::{LinearProgram, ProgramSolution};
//! use anyhow::Result;
//!
//! struct MilpSolver;
//!
//! impl SolverPlugin for MilpSolver {
//!     fn name(&self) -> &'static str { "dopt-milp" }
//!     fn solve(&self, program: &LinearProgram) -> Result<ProgramSolution> {
//!         // Solver implementation
//!     }
//! }
//!
//! fn main() {
//!     run_solver_plugin(MilpSolver);
//! }
//! ```

use crate::error::ExitCode;
use crate::ipc;
use crate::program::LinearProgram;
use crate::solution::ProgramSolution;
use crate::PROTOCOL_VERSION;
use anyhow::{Context, Result};
use std::io::{self, Read, Write};
use tracing::{debug, error, info};

pub trait SolverPlugin {
    fn name(&self) -> &'static str;

    fn solve(&self, program: &LinearProgram) -> Result<ProgramSolution>;

    /// Called after tracing is set up and before the program is read.
    fn init(&self) -> Result<()> {
        Ok(())
    }
}

/// Run a solver plugin: read a program from stdin, solve it, write the
/// solution to stdout and exit.
///
/// Logs go to stderr and respect `RUST_LOG`. The process exits with
/// [`ExitCode::InvalidInput`] when the program cannot be decoded and with
/// [`ExitCode::SolverError`] when solving fails.
pub fn run_solver_plugin<P: SolverPlugin>(plugin: P) -> ! {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    info!(
        "{} v{} (protocol v{})",
        plugin.name(),
        env!("CARGO_PKG_VERSION"),
        PROTOCOL_VERSION
    );

    let exit_code = match read_input() {
        Err(e) => {
            error!("Invalid input: {:?}", e);
            ExitCode::InvalidInput
        }
        Ok(program) => match run_plugin_inner(&plugin, &program) {
            Ok(()) => ExitCode::Success,
            Err(e) => {
                error!("Solver error: {:?}", e);
                ExitCode::SolverError
            }
        },
    };

    std::process::exit(exit_code as i32);
}

fn read_input() -> Result<LinearProgram> {
    debug!("Reading program from stdin...");
    let mut input = Vec::new();
    io::stdin()
        .read_to_end(&mut input)
        .context("Failed to read program from stdin")?;

    if input.is_empty() {
        anyhow::bail!("Empty input - no program data received");
    }
    debug!("Received {} bytes of program data", input.len());

    ipc::read_program(input.as_slice()).context("Failed to parse Arrow IPC program")
}

fn run_plugin_inner<P: SolverPlugin>(plugin: &P, program: &LinearProgram) -> Result<()> {
    plugin.init().context("Solver initialization failed")?;

    info!(
        "Program: {} variables ({} integer), {} constraints, {} nonzeros",
        program.num_vars(),
        program.num_integer(),
        program.num_constraints(),
        program.num_nonzeros()
    );

    let solution = plugin.solve(program)?;

    let mut output = Vec::new();
    ipc::write_solution(&solution, &mut output).context("Failed to serialize solution")?;
    io::stdout()
        .write_all(&output)
        .context("Failed to write solution to stdout")?;

    info!(
        "Solution written: status={}, objective={:.6}",
        solution.status, solution.objective
    );
    Ok(())
}
