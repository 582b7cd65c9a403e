//! Turn solved values into a timestamp-keyed table.

use crate::context::{BuiltModel, OutputSeries};
use crate::error::{ModelError, ModelResult};
use crate::inputs::{TARIFF_ENERGY_MAP, TIMESTAMP_COLUMN};
use dopt_core::ResolvedConfig;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

pub const EFFECTIVE_TARIFF_LABEL: &str = "Tariff Energy [$/kWh]";

/// One entry of an output list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    /// Recorded output to read
    pub data: String,
    /// Index set of an indexed output, e.g. `"nodes"`
    #[serde(default)]
    pub index: Option<String>,
    /// Column label. For indexed outputs either a `%s` pattern or a prefix.
    pub df_label: String,
}

impl OutputSpec {
    pub fn new(name: &str, data: &str, df_label: &str) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_string(),
            index: None,
            df_label: df_label.to_string(),
        }
    }

    pub fn indexed(name: &str, data: &str, index: &str, df_label: &str) -> Self {
        Self {
            index: Some(index.to_string()),
            ..Self::new(name, data, df_label)
        }
    }

    fn label_for(&self, key: &str) -> String {
        if self.df_label.contains("%s") {
            self.df_label.replace("%s", key)
        } else {
            format!("{}{}", self.df_label, key)
        }
    }
}

/// Output list for the enabled assets. Multi-node models also get one column
/// per node for the main balance terms.
pub fn default_output_list(config: &ResolvedConfig) -> Vec<OutputSpec> {
    let mut list = vec![
        OutputSpec::new("gridImport", "grid_import_site", "Import Power [kW]"),
        OutputSpec::new("gridExport", "grid_export_site", "Export Power [kW]"),
        OutputSpec::new("siteLoad", "load_served_site", "Load Power [kW]"),
        OutputSpec::new("tariffEnergyPeriod", TARIFF_ENERGY_MAP, "Tariff Energy Period [-]"),
        OutputSpec::new("tariffPowerPeriod", "tariff_power_map", "Tariff Power Period [-]"),
        OutputSpec::new("outsideTemp", "outside_temperature", "Temperature [C]"),
    ];
    if config.pv {
        list.push(OutputSpec::new("pvPower", "generation_pv_site", "PV Power [kW]"));
    }
    if config.batteries.is_enabled() {
        list.push(OutputSpec::new(
            "batCharge",
            "sum_battery_charge_grid_power_site",
            "Battery Charging Power [kW]",
        ));
        list.push(OutputSpec::new(
            "batDischarge",
            "sum_battery_discharge_grid_power_site",
            "Battery Discharging Power [kW]",
        ));
        list.push(OutputSpec::new("batSOC", "battery_agg_soc", "Battery Aggregate SOC [-]"));
    }
    if config.gensets.is_enabled() {
        list.push(OutputSpec::new("gensetPower", "sum_genset_power_site", "Genset Power [kW]"));
    }
    if config.load_control.is_enabled() {
        list.push(OutputSpec::new("loadShed", "load_shed_site", "Total Shed Load [kW]"));
    }

    if config.topology.is_multi_node() {
        for (name, data, prefix) in [
            ("gridImport", "grid_import", "gridImport_"),
            ("gridExport", "grid_export", "gridExport_"),
            ("loadServed", "load_served", "load_"),
            ("pvGen", "generation_pv", "pvGen_"),
            ("powerInj", "power_inj", "powerInj_"),
            ("powerAbs", "power_abs", "powerAbs_"),
            ("gensetGen", "sum_genset_power", "genset_"),
            ("batCharge", "sum_battery_charge_grid_power", "batCharge_"),
            ("batDischarge", "sum_battery_discharge_grid_power", "batDischarge_"),
        ] {
            list.push(OutputSpec::indexed(name, data, "nodes", prefix));
        }
    }
    list
}

/// Evaluate `specs` against `values` (one per program variable).
///
/// The first column is `timestamp` in epoch seconds.
pub fn project(model: &BuiltModel, values: &[f64], specs: &[OutputSpec]) -> ModelResult<DataFrame> {
    let mut columns = vec![Series::new(TIMESTAMP_COLUMN, model.grid.epoch_seconds().to_vec())];
    let mut with_tariff = false;

    for spec in specs {
        let series = model
            .output(&spec.data)
            .ok_or_else(|| ModelError::Other(format!("no recorded output named '{}'", spec.data)))?;
        match series {
            OutputSeries::Time(exprs) => {
                let data: Vec<f64> = exprs.iter().map(|e| e.evaluate(values)).collect();
                columns.push(Series::new(&spec.df_label, data));
            }
            OutputSeries::Indexed(rows) => {
                for (key, exprs) in rows {
                    let data: Vec<f64> = exprs.iter().map(|e| e.evaluate(values)).collect();
                    columns.push(Series::new(&spec.label_for(key), data));
                }
            }
        }
        with_tariff |= spec.data == TARIFF_ENERGY_MAP;
    }

    if with_tariff {
        let prices: Vec<f64> = model.grid.steps().map(|t| model.tariff.energy_price(t)).collect();
        columns.push(Series::new(EFFECTIVE_TARIFF_LABEL, prices));
    }
    Ok(DataFrame::new(columns)?)
}
