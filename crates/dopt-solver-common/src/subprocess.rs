//! Subprocess management for solver plugins.
//!
//! Spawns a plugin binary, writes the program to its stdin as Arrow IPC and
//! reads the solution from its stdout. A plugin that outlives its timeout is
//! killed.

use crate::error::{ExitCode, SolverError, SolverResult};
use crate::ipc::{read_solution, write_program};
use crate::program::LinearProgram;
use crate::solution::ProgramSolution;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::{timeout, Duration};

/// Name of the plugin binary built from the `dopt-milp` crate.
pub const DEFAULT_PLUGIN: &str = "dopt-milp";

pub struct SolverProcess {
    binary_path: PathBuf,
    timeout_seconds: u64,
}

impl SolverProcess {
    pub fn new(binary_path: PathBuf, timeout_seconds: u64) -> Self {
        Self {
            binary_path,
            timeout_seconds,
        }
    }

    /// Find a plugin binary.
    ///
    /// Search order:
    /// 1. ~/.dopt/solvers/<binary_name>
    /// 2. System PATH
    pub fn find_binary(binary_name: &str) -> SolverResult<PathBuf> {
        if let Some(home) = dirs::home_dir() {
            let local = home.join(".dopt").join("solvers").join(binary_name);
            if local.exists() {
                return Ok(local);
            }
        }

        if let Ok(path) = which::which(binary_name) {
            return Ok(path);
        }

        Err(SolverError::NotInstalled {
            binary: binary_name.to_string(),
        })
    }

    pub fn binary_path(&self) -> &PathBuf {
        &self.binary_path
    }

    fn limit(&self) -> Duration {
        if self.timeout_seconds > 0 {
            Duration::from_secs(self.timeout_seconds)
        } else {
            Duration::from_secs(3600)
        }
    }

    pub async fn solve(&self, program: &LinearProgram) -> SolverResult<ProgramSolution> {
        let start = Instant::now();
        let mut program_bytes = Vec::new();
        write_program(program, &mut program_bytes)?;

        let mut child = Command::new(&self.binary_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SolverError::ProcessStart)?;

        let pipe_err = |which: &str| SolverError::Ipc(format!("{} of solver process not captured", which));
        let mut stdin = child.stdin.take().ok_or_else(|| pipe_err("stdin"))?;
        let mut stdout = child.stdout.take().ok_or_else(|| pipe_err("stdout"))?;
        let mut stderr = child.stderr.take().ok_or_else(|| pipe_err("stderr"))?;

        stdin
            .write_all(&program_bytes)
            .await
            .map_err(|e| SolverError::Ipc(format!("Failed to write program: {}", e)))?;
        drop(stdin);

        let result = timeout(self.limit(), async {
            let mut solution_bytes = Vec::new();
            stdout
                .read_to_end(&mut solution_bytes)
                .await
                .map_err(|e| SolverError::Ipc(format!("Failed to read solution: {}", e)))?;

            let mut stderr_bytes = Vec::new();
            let _ = stderr.read_to_end(&mut stderr_bytes).await;

            Ok::<_, SolverError>((solution_bytes, stderr_bytes))
        })
        .await;

        match result {
            Ok(Ok((solution_bytes, stderr_bytes))) => {
                let status = child.wait().await.map_err(SolverError::ProcessStart)?;
                let exit_code = ExitCode::from_raw(status.code().unwrap_or(-1));

                if !exit_code.is_success() {
                    return Err(SolverError::ProcessFailed {
                        exit_code,
                        message: String::from_utf8_lossy(&stderr_bytes).to_string(),
                    });
                }
                if solution_bytes.is_empty() {
                    return Err(SolverError::Ipc("Empty solution from solver".to_string()));
                }

                let mut solution = read_solution(&solution_bytes[..])?;
                if solution.solve_time_ms == 0 {
                    solution.solve_time_ms = start.elapsed().as_millis() as i64;
                }
                Ok(solution)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let _ = child.kill().await;
                tracing::warn!(
                    binary = %self.binary_path.display(),
                    "solver plugin killed after {} s",
                    self.timeout_seconds
                );
                Err(SolverError::Timeout {
                    seconds: self.timeout_seconds,
                })
            }
        }
    }

    /// Blocking wrapper around [`SolverProcess::solve`] on a current-thread
    /// runtime, for callers without their own executor.
    pub fn solve_blocking(&self, program: &LinearProgram) -> SolverResult<ProgramSolution> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .enable_io()
            .build()?;
        runtime.block_on(self.solve(program))
    }
}

pub fn is_plugin_installed(binary_name: &str) -> bool {
    SolverProcess::find_binary(binary_name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_plugin_reports_name() {
        let err = SolverProcess::find_binary("dopt-no-such-solver-xyz").unwrap_err();
        assert!(err.to_string().contains("dopt-no-such-solver-xyz"));
        assert!(!is_plugin_installed("dopt-no-such-solver-xyz"));
    }

    #[test]
    fn test_spawn_failure_is_process_start() {
        let process = SolverProcess::new(PathBuf::from("/nonexistent/dopt-milp"), 5);
        let err = process.solve_blocking(&LinearProgram::new()).unwrap_err();
        assert!(matches!(err, SolverError::ProcessStart(_)));
    }
}
