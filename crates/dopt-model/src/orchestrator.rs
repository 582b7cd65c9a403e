//! Build-once, solve-many dispatch model.
//!
//! ```text
//! DispatchConfig ──resolve──> ResolvedConfig
//!                                  │
//! SeriesTable ──build──> BuiltModel (LinearProgram + output registry)
//!                                  │
//!                        SolverBackend::solve ──> StatusCorrection
//!                                  │
//!                        project ──> DispatchResult
//! ```

use crate::assets::{build_batteries, build_degradation, build_gensets, build_load_control};
use crate::backend::{backend_for, SolverBackend};
use crate::context::{BuiltModel, CostTerm, ModelContext};
use crate::core::{build_core, close, read_site_series};
use crate::error::{ModelError, ModelResult};
use crate::inputs::{SeriesTable, TARIFF_ENERGY_MAP, TARIFF_EXPORT_MAP, TARIFF_POWER_MAP};
use crate::network::build_network;
use crate::objective::set_objective;
use crate::projector::{default_output_list, project, OutputSpec};
use dopt_core::{
    compute_periods, Diagnostics, DispatchConfig, PeriodMaps, ResolvedConfig, TariffSchedule,
    TimeGrid,
};
use dopt_solver_common::{LinearProgram, ProgramSolution};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// Timing, objective and termination of one solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveSummary {
    /// Wall time in seconds, -1 when the solve never ran
    pub duration: f64,
    pub objective: Option<f64>,
    pub termination: String,
}

impl Default for SolveSummary {
    fn default() -> Self {
        Self {
            duration: -1.0,
            objective: None,
            termination: "failed".to_string(),
        }
    }
}

/// Value of each scalar cost term at the optimum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub energy: f64,
    pub demand: f64,
    /// Stored negated, as it enters the objective
    pub export_revenue: f64,
    pub regulation_revenue: f64,
    pub fuel: f64,
    pub load_shed: f64,
    pub co2: f64,
    pub degradation: f64,
    /// Objective value, i.e. the weighted sum
    pub total: f64,
}

impl CostBreakdown {
    fn from_values(model: &BuiltModel, solution: &ProgramSolution, total: f64) -> Self {
        let value = |term: CostTerm| {
            model
                .costs
                .get(&term)
                .and_then(|&var| solution.value(var))
                .unwrap_or(0.0)
        };
        Self {
            energy: value(CostTerm::Energy),
            demand: value(CostTerm::Demand),
            export_revenue: value(CostTerm::ExportRevenue),
            regulation_revenue: value(CostTerm::RegulationRevenue),
            fuel: value(CostTerm::Fuel),
            load_shed: value(CostTerm::LoadShed),
            co2: value(CostTerm::Co2),
            degradation: value(CostTerm::Degradation),
            total,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchResult {
    /// Projected outputs; empty unless the solve was optimal
    pub table: DataFrame,
    pub summary: SolveSummary,
    pub costs: Option<CostBreakdown>,
    /// Corrected solver output
    pub solution: ProgramSolution,
}

impl DispatchResult {
    pub fn is_optimal(&self) -> bool {
        self.solution.is_optimal()
    }
}

pub struct DispatchModel {
    config: ResolvedConfig,
    diagnostics: Diagnostics,
    built: Option<BuiltModel>,
    backend: Option<Box<dyn SolverBackend>>,
}

impl DispatchModel {
    /// Resolve and validate `config`. Fails on the first missing or invalid
    /// field of an enabled asset.
    pub fn new(config: &DispatchConfig) -> ModelResult<Self> {
        let mut diagnostics = Diagnostics::new();
        let resolved = ResolvedConfig::resolve(config, &mut diagnostics)?;
        Ok(Self {
            config: resolved,
            diagnostics,
            built: None,
            backend: None,
        })
    }

    pub fn from_resolved(config: ResolvedConfig) -> Self {
        Self {
            config,
            diagnostics: Diagnostics::new(),
            built: None,
            backend: None,
        }
    }

    /// Use `backend` instead of the one named in the solver configuration.
    pub fn with_backend(mut self, backend: Box<dyn SolverBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn built(&self) -> Option<&BuiltModel> {
        self.built.as_ref()
    }

    pub fn program(&self) -> Option<&LinearProgram> {
        self.built.as_ref().map(|b| &b.lp)
    }

    /// Formulate the program for `inputs`. A model is built exactly once.
    pub fn build(&mut self, inputs: &SeriesTable) -> ModelResult<&BuiltModel> {
        if self.built.is_some() {
            return Err(ModelError::AlreadyBuilt);
        }
        let mut diagnostics = self.diagnostics.clone();
        let grid = TimeGrid::from_epoch_seconds(inputs.epoch_seconds())?;

        let mut tariff_config = self.config.tariff.clone();
        let maps = match self.config.tariff.seasonal.as_ref() {
            Some(seasonal) => compute_periods(
                grid.timestamps(),
                seasonal,
                self.config.site.input_timezone,
                &mut tariff_config,
            )?,
            None => period_maps_from_inputs(inputs, &mut diagnostics)?,
        };
        let tariff = TariffSchedule::new(&tariff_config, &self.config.site, maps, &mut diagnostics)?;
        let site = read_site_series(inputs, &mut diagnostics)?;

        let config = &self.config;
        let mut ctx = ModelContext::new(config, inputs, grid, tariff, site, diagnostics);
        build_core(&mut ctx)?;
        if let Some(batteries) = config.batteries.enabled() {
            build_batteries(&mut ctx, batteries)?;
            if let Some(degradation) = config.degradation.enabled() {
                build_degradation(&mut ctx, batteries, degradation)?;
            }
        }
        if let Some(fleet) = config.gensets.enabled() {
            build_gensets(&mut ctx, fleet)?;
        }
        if let Some(circuits) = config.load_control.enabled() {
            build_load_control(&mut ctx, circuits)?;
        }
        build_network(&mut ctx)?;
        set_objective(&mut ctx);
        let closed = close(&mut ctx);
        let built = ctx.finish(closed);

        info!(
            steps = built.grid.len(),
            vars = built.lp.num_vars(),
            integer = built.lp.num_integer(),
            rows = built.lp.num_constraints(),
            "dispatch model built"
        );
        self.diagnostics = built.diagnostics.clone();
        Ok(&*self.built.insert(built))
    }

    /// Solve the built program and project `outputs` (the default list when
    /// `None`). Non-optimal outcomes give an empty table and no objective.
    pub fn solve(&mut self, outputs: Option<&[OutputSpec]>) -> ModelResult<DispatchResult> {
        let built = self.built.as_ref().ok_or(ModelError::NotBuilt)?;
        let backend = match &mut self.backend {
            Some(backend) => backend,
            slot @ None => slot.insert(backend_for(&self.config.solver)?),
        };

        let started = Instant::now();
        let mut solution = match backend.solve(&built.lp) {
            Ok(solution) => solution,
            Err(e) if e.is_solver_runtime() => {
                warn!(solver = backend.id(), "solver run failed: {}", e);
                ProgramSolution::error(&e.to_string())
            }
            Err(e) => return Err(e),
        };
        backend.status_correction().correct(&mut solution);
        let duration = started.elapsed().as_secs_f64();

        if !solution.is_optimal() || solution.values.len() != built.lp.num_vars() {
            warn!(
                solver = backend.id(),
                status = %solution.status,
                "solver did not report optimality: {}",
                solution.message.as_deref().unwrap_or("")
            );
            return Ok(DispatchResult {
                table: DataFrame::empty(),
                summary: SolveSummary {
                    duration,
                    objective: None,
                    termination: solution.status.to_string(),
                },
                costs: None,
                solution,
            });
        }

        let objective = built.lp.objective.evaluate(&solution.values);
        let specs = match outputs {
            Some(specs) => specs.to_vec(),
            None => default_output_list(&self.config),
        };
        let table = project(built, &solution.values, &specs)?;
        info!(objective, duration, "dispatch solved");
        Ok(DispatchResult {
            table,
            summary: SolveSummary {
                duration,
                objective: Some(objective),
                termination: solution.status.to_string(),
            },
            costs: Some(CostBreakdown::from_values(built, &solution, objective)),
            solution,
        })
    }

    /// Build for `inputs` and solve.
    pub fn run(&mut self, inputs: &SeriesTable, outputs: Option<&[OutputSpec]>) -> ModelResult<DispatchResult> {
        self.build(inputs)?;
        self.solve(outputs)
    }
}

/// Period maps read from the inputs. The power map falls back to the energy
/// map and the export map to period 0.
fn period_maps_from_inputs(inputs: &SeriesTable, diag: &mut Diagnostics) -> ModelResult<PeriodMaps> {
    let energy = inputs.periods(TARIFF_ENERGY_MAP)?;
    let power = if inputs.has(TARIFF_POWER_MAP) {
        inputs.periods(TARIFF_POWER_MAP)?
    } else {
        info!("{} not in inputs, using {}", TARIFF_POWER_MAP, TARIFF_ENERGY_MAP);
        diag.add_notice(
            "defaults",
            &format!("{} not in inputs, using {}", TARIFF_POWER_MAP, TARIFF_ENERGY_MAP),
        );
        energy.clone()
    };
    let export = if inputs.has(TARIFF_EXPORT_MAP) {
        inputs.periods(TARIFF_EXPORT_MAP)?
    } else {
        info!("{} not in inputs, default value = 0", TARIFF_EXPORT_MAP);
        diag.add_notice(
            "defaults",
            &format!("{} not in inputs, default value = 0", TARIFF_EXPORT_MAP),
        );
        vec![0; energy.len()]
    };
    Ok(PeriodMaps { energy, power, export })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_defaults_to_failed() {
        let summary = SolveSummary::default();
        assert_eq!(summary.duration, -1.0);
        assert!(summary.objective.is_none());
        assert_eq!(summary.termination, "failed");
    }

    #[test]
    fn test_power_map_falls_back_to_energy_map() {
        let inputs = SeriesTable::from_columns(
            vec![0, 3600, 7200],
            vec![(TARIFF_ENERGY_MAP, vec![0.0, 1.0, 1.0])],
        )
        .unwrap();
        let mut diag = Diagnostics::new();
        let maps = period_maps_from_inputs(&inputs, &mut diag).unwrap();
        assert_eq!(maps.power, vec![0, 1, 1]);
        assert_eq!(maps.export, vec![0, 0, 0]);
        assert!(diag.has_category("defaults"));
    }

    #[test]
    fn test_solve_before_build_fails() {
        let mut model = DispatchModel::new(&DispatchConfig::default()).unwrap();
        assert!(matches!(model.solve(None), Err(ModelError::NotBuilt)));
        assert!(model.program().is_none());
    }
}
