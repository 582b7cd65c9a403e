use crate::manifest::{write_batch_manifest, BatchManifest, ScenarioRecord};
use crate::scenario::Scenario;
use anyhow::{Context, Result};
use chrono::Utc;
use dopt_core::DispatchConfig;
use dopt_model::{write_csv, DispatchModel, OutputSpec, SeriesTable};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// A sweep: one base configuration, its scenarios and a shared input table.
pub struct BatchRunnerConfig {
    pub base: DispatchConfig,
    pub scenarios: Vec<Scenario>,
    pub inputs: SeriesTable,
    /// Projected columns; the default list when `None`
    pub outputs: Option<Vec<OutputSpec>>,
    pub output_root: PathBuf,
    /// Worker threads; 0 uses every core
    pub threads: usize,
}

/// Success/failure counts and where the manifest went.
pub struct BatchSummary {
    pub success: usize,
    pub failure: usize,
    pub manifest_path: PathBuf,
    pub scenarios: Vec<ScenarioRecord>,
}

/// Solve every scenario in parallel and write `batch_manifest.json` under
/// the output root. A scenario that fails to build or solve is recorded as
/// an error and does not stop the sweep.
pub fn run_batch(config: &BatchRunnerConfig) -> Result<BatchSummary> {
    fs::create_dir_all(&config.output_root).with_context(|| {
        format!(
            "creating batch output root '{}'",
            config.output_root.display()
        )
    })?;

    let thread_count = if config.threads == 0 {
        num_cpus::get()
    } else {
        config.threads
    };
    let pool = ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .context("building Rayon thread pool for scenario sweep")?;

    let records: Vec<ScenarioRecord> = pool.install(|| {
        config
            .scenarios
            .par_iter()
            .map(|scenario| run_scenario(scenario, config))
            .collect()
    });

    let success = records.iter().filter(|record| record.is_ok()).count();
    let failure = records.len() - success;
    info!(success, failure, threads = thread_count, "scenario sweep finished");

    let manifest = BatchManifest {
        created_at: Utc::now(),
        num_scenarios: records.len(),
        success,
        failure,
        scenarios: records.clone(),
    };
    let manifest_path = config.output_root.join("batch_manifest.json");
    write_batch_manifest(&manifest_path, &manifest)?;
    Ok(BatchSummary {
        success,
        failure,
        manifest_path,
        scenarios: records,
    })
}

fn run_scenario(scenario: &Scenario, config: &BatchRunnerConfig) -> ScenarioRecord {
    let output_file = config.output_root.join(&scenario.id).join("result.csv");
    let mut record = ScenarioRecord {
        scenario_id: scenario.id.clone(),
        status: "ok".to_string(),
        termination: None,
        objective: None,
        duration: None,
        error: None,
        output: String::new(),
    };

    let mut runner = || -> Result<()> {
        let dispatch = scenario.apply(&config.base)?;
        let mut model = DispatchModel::new(&dispatch)
            .with_context(|| format!("resolving scenario '{}'", scenario.id))?;
        let mut result = model
            .run(&config.inputs, config.outputs.as_deref())
            .with_context(|| format!("solving scenario '{}'", scenario.id))?;
        record.termination = Some(result.summary.termination.clone());
        record.objective = result.summary.objective;
        record.duration = Some(result.summary.duration);
        if !result.is_optimal() {
            anyhow::bail!("solver terminated with '{}'", result.summary.termination);
        }
        if let Some(parent) = output_file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating scenario directory '{}'", parent.display()))?;
        }
        write_csv(&mut result.table, &output_file)?;
        record.output = output_file.display().to_string();
        Ok(())
    };

    if let Err(err) = runner() {
        warn!(scenario = %scenario.id, "scenario failed: {:#}", err);
        record.status = "error".to_string();
        record.error = Some(format!("{:#}", err));
    }
    record
}
