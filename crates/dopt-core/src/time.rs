//! Ordered optimization time grid.
//!
//! Power variables are in kW; `scale[t] = 3600 / duration[t]` converts a
//! power held over step `t` into kWh by division. The last timestamp is a
//! boundary point: it closes the preceding interval but has no forward
//! duration of its own, so it is left out of the accounting window.

use crate::error::{DoptError, DoptResult};
use chrono::{DateTime, NaiveDateTime};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid {
    epoch_seconds: Vec<i64>,
    timestamps: Vec<NaiveDateTime>,
    /// Seconds since the previous step; 0 at the first step
    duration: Vec<f64>,
    /// 3600 / backward duration (first step uses a 1 s duration)
    scale: Vec<f64>,
    /// 3600 / forward duration; repeats the last interval at the boundary
    scale_fwd: Vec<f64>,
}

impl TimeGrid {
    /// Build from epoch seconds. Requires at least two strictly increasing
    /// timestamps.
    pub fn from_epoch_seconds(epoch_seconds: &[i64]) -> DoptResult<Self> {
        if epoch_seconds.len() < 2 {
            return Err(DoptError::Validation(format!(
                "time grid needs at least 2 timestamps, got {}",
                epoch_seconds.len()
            )));
        }
        if let Some(w) = epoch_seconds.windows(2).find(|w| w[1] <= w[0]) {
            return Err(DoptError::Validation(format!(
                "timestamps must be strictly increasing ({} then {})",
                w[0], w[1]
            )));
        }

        let timestamps = epoch_seconds
            .iter()
            .map(|&s| {
                DateTime::from_timestamp(s, 0)
                    .map(|dt| dt.naive_utc())
                    .ok_or_else(|| DoptError::Validation(format!("timestamp {} out of range", s)))
            })
            .collect::<DoptResult<Vec<_>>>()?;

        let n = epoch_seconds.len();
        let mut duration = vec![0.0; n];
        for t in 1..n {
            duration[t] = (epoch_seconds[t] - epoch_seconds[t - 1]) as f64;
        }
        let scale = duration
            .iter()
            .map(|&d| if d > 0.0 { 3600.0 / d } else { 3600.0 })
            .collect::<Vec<_>>();
        let mut scale_fwd = vec![0.0; n];
        for t in 0..n - 1 {
            scale_fwd[t] = 3600.0 / (epoch_seconds[t + 1] - epoch_seconds[t]) as f64;
        }
        scale_fwd[n - 1] = scale_fwd[n - 2];

        Ok(Self {
            epoch_seconds: epoch_seconds.to_vec(),
            timestamps,
            duration,
            scale,
            scale_fwd,
        })
    }

    pub fn len(&self) -> usize {
        self.epoch_seconds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epoch_seconds.is_empty()
    }

    pub fn steps(&self) -> Range<usize> {
        0..self.len()
    }

    /// Steps that carry cost, energy and emissions: every step except the
    /// trailing boundary.
    pub fn accounting(&self) -> Range<usize> {
        0..self.len() - 1
    }

    pub fn last(&self) -> usize {
        self.len() - 1
    }

    pub fn epoch_seconds(&self) -> &[i64] {
        &self.epoch_seconds
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn duration(&self, t: usize) -> f64 {
        self.duration[t]
    }

    pub fn scale(&self, t: usize) -> f64 {
        self.scale[t]
    }

    pub fn scale_fwd(&self, t: usize) -> f64 {
        self.scale_fwd[t]
    }

    /// Index of the first timestamp at or after `epoch`, if any.
    pub fn position_of(&self, epoch: i64) -> Option<usize> {
        self.epoch_seconds.iter().position(|&s| s >= epoch)
    }
}
