//! Time-series inputs for one solve window.
//!
//! A [`SeriesTable`] wraps a polars `DataFrame` with one row per step and a
//! `timestamp` column in epoch seconds. Builders read columns by name; an
//! optional column that is absent falls back to a neutral default and the
//! fallback is recorded as a notice.

use crate::error::{ModelError, ModelResult};
use anyhow::Context;
use dopt_core::{Diagnostics, DoptError};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::info;

pub const TIMESTAMP_COLUMN: &str = "timestamp";

pub const GRID_AVAILABLE: &str = "grid_available";
pub const FUEL_AVAILABLE: &str = "fuel_available";
pub const GRID_CO2_INTENSITY: &str = "grid_co2_intensity";
pub const OUTSIDE_TEMPERATURE: &str = "outside_temperature";
pub const TARIFF_ENERGY_MAP: &str = "tariff_energy_map";
pub const TARIFF_POWER_MAP: &str = "tariff_power_map";
pub const TARIFF_EXPORT_MAP: &str = "tariff_energy_export_map";

#[derive(Debug, Clone)]
pub struct SeriesTable {
    frame: DataFrame,
    epoch: Vec<i64>,
}

impl SeriesTable {
    pub fn new(frame: DataFrame) -> ModelResult<Self> {
        let epoch = frame
            .column(TIMESTAMP_COLUMN)
            .map_err(|_| DoptError::MissingColumn(TIMESTAMP_COLUMN.to_string()))?
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                v.ok_or_else(|| {
                    ModelError::Core(DoptError::Validation(format!(
                        "timestamp missing at row {}",
                        row
                    )))
                })
            })
            .collect::<ModelResult<Vec<_>>>()?;
        Ok(Self { frame, epoch })
    }

    pub fn from_csv(path: &Path) -> ModelResult<Self> {
        let mut file = File::open(path)
            .with_context(|| format!("opening time series {}", path.display()))
            .map_err(DoptError::from)?;
        let frame = CsvReader::new(&mut file).has_header(true).finish()?;
        Self::new(frame)
    }

    /// Build from plain vectors; columns must match the timestamp count.
    pub fn from_columns(timestamps: Vec<i64>, columns: Vec<(&str, Vec<f64>)>) -> ModelResult<Self> {
        let mut series = Vec::with_capacity(columns.len() + 1);
        series.push(Series::new(TIMESTAMP_COLUMN, timestamps));
        for (name, values) in columns {
            series.push(Series::new(name, values));
        }
        Self::new(DataFrame::new(series)?)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.epoch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epoch.is_empty()
    }

    pub fn epoch_seconds(&self) -> &[i64] {
        &self.epoch
    }

    pub fn has(&self, name: &str) -> bool {
        self.frame.get_column_names().iter().any(|c| *c == name)
    }

    /// A required numeric column. Nulls are rejected.
    pub fn column(&self, name: &str) -> ModelResult<Vec<f64>> {
        if !self.has(name) {
            return Err(DoptError::MissingColumn(name.to_string()).into());
        }
        let values = self.frame.column(name)?.cast(&DataType::Float64)?;
        values
            .f64()?
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                v.ok_or_else(|| {
                    ModelError::Core(DoptError::Validation(format!(
                        "column '{}' has no value at row {}",
                        name, row
                    )))
                })
            })
            .collect()
    }

    /// An optional column; absent columns become `default` at every step.
    pub fn column_or(&self, name: &str, default: f64, diag: &mut Diagnostics) -> ModelResult<Vec<f64>> {
        if self.has(name) {
            return self.column(name);
        }
        info!("{} not in inputs, default value = {}", name, default);
        diag.add_notice("defaults", &format!("{} not in inputs, default value = {}", name, default));
        Ok(vec![default; self.len()])
    }

    /// Element-wise sum of several required columns.
    pub fn sum_columns<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> ModelResult<Vec<f64>> {
        let mut total = vec![0.0; self.len()];
        for name in names {
            for (acc, v) in total.iter_mut().zip(self.column(name)?) {
                *acc += v;
            }
        }
        Ok(total)
    }

    /// A tariff period map. Period ids must be non-negative integers.
    pub fn periods(&self, name: &str) -> ModelResult<Vec<u32>> {
        self.column(name)?
            .into_iter()
            .map(|v| {
                if v < 0.0 || v.fract() != 0.0 {
                    Err(DoptError::Validation(format!("'{}' holds non-integer period {}", name, v)).into())
                } else {
                    Ok(v as u32)
                }
            })
            .collect()
    }

    /// Rows `[offset, offset + len)`, clamped to the table.
    pub fn window(&self, offset: usize, len: usize) -> ModelResult<Self> {
        Self::new(self.frame.slice(offset as i64, len))
    }

    /// Replace or append a column.
    pub fn set_column(&mut self, name: &str, values: Vec<f64>) -> ModelResult<()> {
        if values.len() != self.len() {
            return Err(DoptError::Validation(format!(
                "column '{}' has {} rows, table has {}",
                name,
                values.len(),
                self.len()
            ))
            .into());
        }
        self.frame.with_column(Series::new(name, values))?;
        Ok(())
    }
}

/// Write a result table as CSV.
pub fn write_csv(frame: &mut DataFrame, path: &Path) -> ModelResult<()> {
    let mut file = File::create(path)
        .with_context(|| format!("creating {}", path.display()))
        .map_err(DoptError::from)?;
    CsvWriter::new(&mut file).finish(frame)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table() -> SeriesTable {
        SeriesTable::from_columns(
            vec![0, 3600, 7200],
            vec![("load_demand", vec![1.0, 2.0, 3.0]), ("tariff_energy_map", vec![1.0, 1.0, 2.0])],
        )
        .unwrap()
    }

    #[test]
    fn test_missing_column_names_it() {
        let err = table().column("generation_pv").unwrap_err();
        assert!(err.to_string().contains("generation_pv"));
    }

    #[test]
    fn test_default_is_recorded() {
        let mut diag = Diagnostics::new();
        let values = table().column_or(GRID_AVAILABLE, 1.0, &mut diag).unwrap();
        assert_eq!(values, vec![1.0, 1.0, 1.0]);
        assert!(diag.has_category("defaults"));
    }

    #[test]
    fn test_periods_reject_fractions() {
        let mut t = table();
        assert_eq!(t.periods(TARIFF_ENERGY_MAP).unwrap(), vec![1, 1, 2]);
        t.set_column(TARIFF_ENERGY_MAP, vec![1.0, 1.5, 2.0]).unwrap();
        assert!(t.periods(TARIFF_ENERGY_MAP).is_err());
    }

    #[test]
    fn test_window_slices_rows() {
        let w = table().window(1, 5).unwrap();
        assert_eq!(w.epoch_seconds(), &[3600, 7200]);
        assert_eq!(w.column("load_demand").unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inputs.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "timestamp,load_demand,generation_pv").unwrap();
        writeln!(f, "0,10.0,0.0").unwrap();
        writeln!(f, "3600,12.5,4.0").unwrap();
        drop(f);

        let t = SeriesTable::from_csv(&path).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.sum_columns(&["load_demand".to_string(), "generation_pv".to_string()]).unwrap(), vec![10.0, 16.5]);
    }
}
