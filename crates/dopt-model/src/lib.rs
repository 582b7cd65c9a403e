//! # dopt-model: MILP dispatch of distributed energy resources
//!
//! Builds a mixed-integer linear program that schedules grid exchange,
//! batteries, gensets and controllable loads for one site over a horizon of
//! time steps, solves it, and projects the result into a polars table.
//!
//! ## Formulation
//!
//! | Module | Adds |
//! |--------|------|
//! | [`core`] | node balance, grid limits and exclusion, demand charges, energy cost, export revenue, grid emissions |
//! | [`assets::battery`] | SOC recursion, efficiency, charge/discharge exclusion, final SOC |
//! | [`assets::genset`] | fuel import vs. reserves, fuel cost and CO2 |
//! | [`assets::load_control`] | binary sheddable circuits |
//! | [`assets::degradation`] | thermal RC model with calendar and cycle aging |
//! | [`network`] | simple exchange with losses, or linearized power flow |
//!
//! Every builder writes into a [`ModelContext`]. Balance terms that no
//! builder claims are fixed to zero when the build closes, so disabling an
//! asset class never leaves free variables in the balance.
//!
//! ## Solving
//!
//! [`DispatchModel`] resolves the configuration, builds once, and solves
//! through a [`backend::SolverBackend`]: good_lp in-process (`microlp` by
//! default) or a `dopt-milp` plugin over Arrow IPC. A backend's
//! [`backend::StatusCorrection`] runs on every solution; a non-optimal result
//! yields an empty table and no objective rather than an error.
//!
//! ## Example
//!
//! ```ignore
//! use dopt_core::load_config_from_path;
//! use dopt_model::{DispatchModel, SeriesTable};
//!
//! let config = load_config_from_path("site.yaml".as_ref())?;
//! let inputs = SeriesTable::from_csv("inputs.csv".as_ref())?;
//! let mut model = DispatchModel::new(&config)?;
//! let result = model.run(&inputs, None)?;
//! println!("{:?} {}", result.summary.objective, result.table);
//! ```

pub mod assets;
pub mod backend;
pub mod context;
pub mod core;
pub mod error;
pub mod inputs;
pub mod network;
pub mod objective;
pub mod orchestrator;
pub mod projector;

pub use backend::{backend_for, SolverBackend, StatusCorrection};
pub use context::{BalanceTerm, BuiltModel, CostTerm, ModelContext, OutputSeries};
pub use error::{ModelError, ModelResult};
pub use inputs::{write_csv, SeriesTable};
pub use orchestrator::{CostBreakdown, DispatchModel, DispatchResult, SolveSummary};
pub use projector::{default_output_list, project, OutputSpec};
