//! # dopt-core: DER dispatch primitives
//!
//! Everything a dispatch model needs before any variable is created:
//!
//! - [`config`]: serde view of the YAML/JSON configuration file
//! - [`resolved`]: validated configuration with asset blocks and node topology
//! - [`time`]: the optimization time grid and its duration scales
//! - [`tariff`]: period maps and prices for one solve window
//! - [`diagnostics`]: notices and repairs recorded during a build
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dopt_core::*;
//! use std::path::Path;
//!
//! let config = load_config_from_path(Path::new("site.yaml")).unwrap();
//! let mut diag = Diagnostics::new();
//! let resolved = ResolvedConfig::resolve(&config, &mut diag).unwrap();
//! println!("{} node(s), {}", resolved.topology.nodes.len(), diag.summary());
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod resolved;
pub mod tariff;
pub mod time;

pub use config::{load_config_from_path, DispatchConfig};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{DoptError, DoptResult};
pub use resolved::{
    AssetBlock, Battery, BatteryThermal, Connection, Fuel, Genset, GensetFleet, LoadCircuit,
    NetworkSpec, Node, ResolvedConfig, Topology, SINGLE_NODE,
};
pub use tariff::{compute_periods, PeriodMaps, TariffSchedule};
pub use time::TimeGrid;
