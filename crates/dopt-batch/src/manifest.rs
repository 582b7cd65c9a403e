use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::Path;

/// Outcome of one scenario in a sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub scenario_id: String,
    /// `ok` or `error`
    pub status: String,
    /// Solver termination, absent when the build failed
    pub termination: Option<String>,
    pub objective: Option<f64>,
    pub duration: Option<f64>,
    pub error: Option<String>,
    /// Result table path; empty when nothing was written
    pub output: String,
}

impl ScenarioRecord {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchManifest {
    pub created_at: DateTime<Utc>,
    pub num_scenarios: usize,
    pub success: usize,
    pub failure: usize,
    pub scenarios: Vec<ScenarioRecord>,
}

pub fn write_batch_manifest(path: &Path, manifest: &BatchManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating manifest directory '{}'", parent.display()))?;
    }
    let json =
        serde_json::to_string_pretty(manifest).context("serializing batch manifest to JSON")?;
    fs::write(path, json)
        .with_context(|| format!("writing batch manifest '{}'", path.display()))?;
    Ok(())
}

pub fn load_batch_manifest(path: &Path) -> Result<BatchManifest> {
    let file = File::open(path)
        .with_context(|| format!("opening batch manifest '{}'", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("parsing batch manifest '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn manifest_writes_and_reads_back() {
        let ok = ScenarioRecord {
            scenario_id: "base".into(),
            status: "ok".into(),
            termination: Some("optimal".into()),
            objective: Some(12.5),
            duration: Some(0.2),
            error: None,
            output: "out/base/result.csv".into(),
        };
        let failed = ScenarioRecord {
            scenario_id: "no-tariff".into(),
            status: "error".into(),
            termination: None,
            objective: None,
            duration: None,
            error: Some("missing tariff_energy_map".into()),
            output: String::new(),
        };
        let manifest = BatchManifest {
            created_at: Utc::now(),
            num_scenarios: 2,
            success: 1,
            failure: 1,
            scenarios: vec![ok, failed],
        };
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("batch_manifest.json");
        write_batch_manifest(&path, &manifest).unwrap();

        let parsed = load_batch_manifest(&path).unwrap();
        assert_eq!(parsed.num_scenarios, 2);
        assert!(parsed.scenarios[0].is_ok());
        assert_eq!(parsed.scenarios[0].objective, Some(12.5));
        assert!(!parsed.scenarios[1].is_ok());
        assert_eq!(parsed.created_at, manifest.created_at);
    }
}
