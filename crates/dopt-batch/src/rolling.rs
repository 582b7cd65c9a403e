//! Rolling-horizon dispatch.
//!
//! A long input table is cut into overlapping windows of `horizon` steps,
//! each starting `stride` steps after the previous one. Every window is an
//! independent solve; only the first `stride` rows of a window are kept
//! (all rows of the last one). Between windows the driver carries:
//!
//! - the highest realized import per demand period and overall, as the next
//!   window's `demand_periods_prev` and `demand_coincident_prev`
//! - each battery's SOC at row `stride`, as the next window's `soc_initial`

use anyhow::{anyhow, bail, Context, Result};
use dopt_core::DispatchConfig;
use dopt_model::{
    BuiltModel, CostBreakdown, DispatchModel, OutputSeries, OutputSpec, SeriesTable, SolveSummary,
};
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use tracing::{debug, info};

const SITE_IMPORT: &str = "grid_import_site";
const BATTERY_SOC: &str = "battery_soc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingHorizon {
    pub horizon: usize,
    pub stride: usize,
}

/// One solved window.
#[derive(Debug, Clone)]
pub struct RollingStep {
    pub offset: usize,
    /// Rows of this window kept in the combined table
    pub committed: usize,
    pub summary: SolveSummary,
    pub costs: Option<CostBreakdown>,
}

#[derive(Debug, Clone)]
pub struct RollingOutcome {
    /// Committed rows of every window, in time order
    pub table: DataFrame,
    pub steps: Vec<RollingStep>,
    /// Realized peaks over all committed rows
    pub demand_periods_prev: BTreeMap<u32, f64>,
    pub demand_coincident_prev: f64,
    /// SOC handed to the last window, by battery name
    pub soc: BTreeMap<String, f64>,
}

impl RollingHorizon {
    /// A window needs two rows to close, and the next one must start inside it.
    pub fn new(horizon: usize, stride: usize) -> Result<Self> {
        if horizon < 2 {
            bail!("rolling horizon must span at least 2 steps, got {}", horizon);
        }
        if stride == 0 || stride >= horizon {
            bail!(
                "rolling stride must be in 1..{} for a horizon of {}, got {}",
                horizon,
                horizon,
                stride
            );
        }
        Ok(Self { horizon, stride })
    }

    /// `(offset, len)` of each window over `rows` input rows.
    pub fn windows(&self, rows: usize) -> Vec<(usize, usize)> {
        let mut windows = Vec::new();
        let mut offset = 0;
        while rows.saturating_sub(offset) >= 2 {
            let len = self.horizon.min(rows - offset);
            windows.push((offset, len));
            if offset + len >= rows {
                break;
            }
            offset += self.stride;
        }
        windows
    }

    /// Solve `inputs` window by window. Any window that does not reach
    /// optimality stops the run, since there is no state to carry forward.
    pub fn run(
        &self,
        base: &DispatchConfig,
        inputs: &SeriesTable,
        outputs: Option<&[OutputSpec]>,
    ) -> Result<RollingOutcome> {
        let windows = self.windows(inputs.len());
        if windows.is_empty() {
            bail!("rolling horizon needs at least 2 input rows, got {}", inputs.len());
        }

        let mut config = base.clone();
        let mut peaks = config.site.demand_periods_prev.clone();
        let mut coincident = config.site.demand_coincident_prev;
        let mut soc = BTreeMap::new();
        let mut table: Option<DataFrame> = None;
        let mut steps = Vec::with_capacity(windows.len());

        for (index, &(offset, len)) in windows.iter().enumerate() {
            let last = index + 1 == windows.len();
            let committed = if last { len } else { self.stride };
            let window = inputs.window(offset, len)?;

            let mut model = DispatchModel::new(&config)
                .with_context(|| format!("resolving window at row {}", offset))?;
            let result = model
                .run(&window, outputs)
                .with_context(|| format!("solving window at row {}", offset))?;
            if !result.is_optimal() {
                bail!(
                    "window at row {} terminated with '{}'",
                    offset,
                    result.summary.termination
                );
            }
            let built = model
                .built()
                .ok_or_else(|| anyhow!("window at row {} has no built model", offset))?;
            let values = &result.solution.values;

            let import = time_series(built, SITE_IMPORT, values)?;
            for (t, &flow) in import.iter().enumerate().take(committed) {
                let period = built.tariff.power_period(t);
                let peak = peaks.entry(period).or_insert(0.0);
                *peak = peak.max(flow);
                coincident = coincident.max(flow);
            }

            if !last {
                if let Some(OutputSeries::Indexed(rows)) = built.output(BATTERY_SOC) {
                    for (name, exprs) in rows {
                        if let Some(expr) = exprs.get(committed) {
                            soc.insert(name.clone(), expr.evaluate(values));
                        }
                    }
                }
                config.site.demand_periods_prev = peaks.clone();
                config.site.demand_coincident_prev = coincident;
                for battery in config.batteries.iter_mut() {
                    if let Some(value) = battery.name.as_ref().and_then(|name| soc.get(name)) {
                        battery.soc_initial = Some(*value);
                    }
                }
            }

            debug!(offset, committed, objective = ?result.summary.objective, "window solved");
            let kept = result.table.slice(0, committed);
            match table.as_mut() {
                Some(combined) => {
                    combined.vstack_mut(&kept)?;
                }
                None => table = Some(kept),
            }
            steps.push(RollingStep {
                offset,
                committed,
                summary: result.summary,
                costs: result.costs,
            });
        }

        let mut table = table.unwrap_or_else(DataFrame::empty);
        table.align_chunks();
        info!(
            windows = steps.len(),
            rows = table.height(),
            "rolling horizon finished"
        );
        Ok(RollingOutcome {
            table,
            steps,
            demand_periods_prev: peaks,
            demand_coincident_prev: coincident,
            soc,
        })
    }
}

fn time_series(built: &BuiltModel, name: &str, values: &[f64]) -> Result<Vec<f64>> {
    match built.output(name) {
        Some(OutputSeries::Time(exprs)) => Ok(exprs.iter().map(|e| e.evaluate(values)).collect()),
        _ => Err(anyhow!("model recorded no time series named '{}'", name)),
    }
}
