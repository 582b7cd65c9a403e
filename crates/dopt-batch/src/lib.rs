//! # dopt-batch: multi-solve drivers
//!
//! - [`rolling`]: sequential rolling-horizon dispatch that carries demand
//!   peaks and battery state from one window into the next
//! - [`runner`]: parallel scenario sweeps over a shared input table
//! - [`manifest`]: the JSON record a sweep leaves behind

pub mod manifest;
pub mod rolling;
pub mod runner;
pub mod scenario;

pub use manifest::{load_batch_manifest, write_batch_manifest, BatchManifest, ScenarioRecord};
pub use rolling::{RollingHorizon, RollingOutcome, RollingStep};
pub use runner::{run_batch, BatchRunnerConfig, BatchSummary};
pub use scenario::{merge_overrides, Scenario};
