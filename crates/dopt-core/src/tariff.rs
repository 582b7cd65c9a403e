//! Tariff schedule resolved against a time grid.

use crate::config::{HourPeriods, SeasonalTariff, SiteConfig, TariffConfig};
use crate::diagnostics::Diagnostics;
use crate::error::{DoptError, DoptResult};
use chrono::{Datelike, Duration, NaiveDateTime, Timelike, Weekday};
use std::collections::{BTreeMap, BTreeSet};

/// Per-step period ids for the three tariff components.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodMaps {
    pub energy: Vec<u32>,
    pub power: Vec<u32>,
    pub export: Vec<u32>,
}

/// Prices plus the per-step period maps of one solve window.
#[derive(Debug, Clone)]
pub struct TariffSchedule {
    energy: BTreeMap<u32, f64>,
    demand: BTreeMap<u32, f64>,
    export: BTreeMap<u32, f64>,
    demand_coincident: f64,
    maps: PeriodMaps,
    demand_prev: BTreeMap<u32, f64>,
    coincident_prev: f64,
}

impl TariffSchedule {
    /// Checks that every mapped period has a price. Export periods without a
    /// price are treated as zero revenue.
    pub fn new(
        tariff: &TariffConfig,
        site: &SiteConfig,
        maps: PeriodMaps,
        diag: &mut Diagnostics,
    ) -> DoptResult<Self> {
        let check = |label: &str, map: &[u32], prices: &BTreeMap<u32, f64>| {
            match map.iter().find(|p| !prices.contains_key(p)) {
                Some(p) => Err(DoptError::config(
                    format!("tariff.{}", label),
                    format!("no price defined for period {}", p),
                )),
                None => Ok(()),
            }
        };
        check("energy", &maps.energy, &tariff.energy)?;
        check("demand", &maps.power, &tariff.demand)?;

        let mut export = tariff.export.clone();
        for p in &maps.export {
            if !export.contains_key(p) {
                diag.add_notice(
                    "defaults",
                    &format!("no export price for period {}, default value = 0", p),
                );
                export.insert(*p, 0.0);
            }
        }

        Ok(Self {
            energy: tariff.energy.clone(),
            demand: tariff.demand.clone(),
            export,
            demand_coincident: tariff.demand_coincident,
            maps,
            demand_prev: site.demand_periods_prev.clone(),
            coincident_prev: site.demand_coincident_prev,
        })
    }

    pub fn maps(&self) -> &PeriodMaps {
        &self.maps
    }

    pub fn energy_period(&self, t: usize) -> u32 {
        self.maps.energy[t]
    }

    pub fn power_period(&self, t: usize) -> u32 {
        self.maps.power[t]
    }

    pub fn energy_price(&self, t: usize) -> f64 {
        self.energy[&self.maps.energy[t]]
    }

    pub fn export_price(&self, t: usize) -> f64 {
        self.export[&self.maps.export[t]]
    }

    pub fn energy_price_of(&self, period: u32) -> Option<f64> {
        self.energy.get(&period).copied()
    }

    pub fn demand_price(&self, period: u32) -> f64 {
        self.demand.get(&period).copied().unwrap_or(0.0)
    }

    pub fn coincident_price(&self) -> f64 {
        self.demand_coincident
    }

    /// Demand periods that occur in this window, in id order.
    pub fn demand_periods(&self) -> Vec<u32> {
        self.maps
            .power
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Peak already billed for `period`; 0 when not tracked.
    pub fn previous_peak(&self, period: u32) -> f64 {
        self.demand_prev.get(&period).copied().unwrap_or(0.0)
    }

    pub fn previous_coincident_peak(&self) -> f64 {
        self.coincident_prev
    }
}

/// Derive period maps from a seasonal tariff and overwrite the tariff's
/// prices with those of the active season.
///
/// The season follows the month of the first timestamp in local time
/// (`timestamp + utc_offset_hours`). Power periods equal energy periods and
/// export is a single period 0.
pub fn compute_periods(
    timestamps: &[NaiveDateTime],
    seasonal: &SeasonalTariff,
    utc_offset_hours: i32,
    tariff: &mut TariffConfig,
) -> DoptResult<PeriodMaps> {
    let offset = Duration::hours(utc_offset_hours as i64);
    let first = timestamps
        .first()
        .ok_or_else(|| DoptError::Validation("no timestamps to map".into()))?;
    let month = (*first + offset).month();
    let season_name = seasonal.months.get(&month).ok_or_else(|| {
        DoptError::config("tariff.seasonal.months", format!("no season for month {}", month))
    })?;
    let season = seasonal.seasons.get(season_name).ok_or_else(|| {
        DoptError::config(
            "tariff.seasonal.seasons",
            format!("season '{}' is not defined", season_name),
        )
    })?;

    let hour_table = |local: NaiveDateTime| -> &Vec<u32> {
        match &season.hours {
            HourPeriods::DayTypes { weekday, weekend } => match local.weekday() {
                Weekday::Sat | Weekday::Sun => weekend,
                _ => weekday,
            },
            HourPeriods::WeekdayOnly(hours) => hours,
        }
    };

    let mut energy = Vec::with_capacity(timestamps.len());
    for ts in timestamps {
        let local = *ts + offset;
        let table = hour_table(local);
        let period = table.get(local.hour() as usize).copied().ok_or_else(|| {
            DoptError::config(
                format!("tariff.seasonal.seasons[{}].hours", season_name),
                format!("no period for hour {}", local.hour()),
            )
        })?;
        energy.push(period);
    }

    tariff.energy = season.energy.clone();
    tariff.demand = season.demand.clone();
    tariff.demand_coincident = season.demand_coincident;

    Ok(PeriodMaps {
        power: energy.clone(),
        export: vec![0; energy.len()],
        energy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeasonTable;
    use chrono::NaiveDate;

    fn seasonal() -> SeasonalTariff {
        let mut hours_weekday = vec![0; 24];
        for h in 12..18 {
            hours_weekday[h] = 2;
        }
        let summer = SeasonTable {
            energy: [(0, 0.08), (2, 0.16)].into_iter().collect(),
            demand: [(0, 0.0), (2, 19.65)].into_iter().collect(),
            demand_coincident: 17.74,
            hours: HourPeriods::DayTypes {
                weekday: hours_weekday,
                weekend: vec![0; 24],
            },
        };
        let winter = SeasonTable {
            energy: [(0, 0.1)].into_iter().collect(),
            demand: BTreeMap::new(),
            demand_coincident: 0.0,
            hours: HourPeriods::WeekdayOnly(vec![0; 24]),
        };
        SeasonalTariff {
            months: (1..=12)
                .map(|m| (m, if (5..=10).contains(&m) { "summer" } else { "winter" }.to_string()))
                .collect(),
            seasons: [("summer".to_string(), summer), ("winter".to_string(), winter)]
                .into_iter()
                .collect(),
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_weekday_peak_hours() {
        // 2024-07-10 is a Wednesday
        let ts = vec![at(2024, 7, 10, 11), at(2024, 7, 10, 12), at(2024, 7, 10, 18)];
        let mut tariff = TariffConfig::default();
        let maps = compute_periods(&ts, &seasonal(), 0, &mut tariff).unwrap();
        assert_eq!(maps.energy, vec![0, 2, 0]);
        assert_eq!(maps.power, maps.energy);
        assert_eq!(maps.export, vec![0, 0, 0]);
        assert_eq!(tariff.energy[&2], 0.16);
        assert_eq!(tariff.demand_coincident, 17.74);
    }

    #[test]
    fn test_weekend_and_offset() {
        // 2024-07-13 is a Saturday; UTC 20:00 at -8h is 12:00 local
        let ts = vec![at(2024, 7, 13, 20)];
        let mut tariff = TariffConfig::default();
        let maps = compute_periods(&ts, &seasonal(), -8, &mut tariff).unwrap();
        assert_eq!(maps.energy, vec![0]);

        let weekday = vec![at(2024, 7, 10, 20)];
        let maps = compute_periods(&weekday, &seasonal(), -8, &mut tariff).unwrap();
        assert_eq!(maps.energy, vec![2]);
    }

    #[test]
    fn test_schedule_rejects_unpriced_period() {
        let tariff = TariffConfig {
            energy: [(0, 0.1)].into_iter().collect(),
            demand: [(0, 0.0)].into_iter().collect(),
            ..Default::default()
        };
        let maps = PeriodMaps {
            energy: vec![0, 1],
            power: vec![0, 0],
            export: vec![0, 0],
        };
        let mut diag = Diagnostics::new();
        let err = TariffSchedule::new(&tariff, &SiteConfig::default(), maps, &mut diag).unwrap_err();
        assert!(err.to_string().contains("tariff.energy"));
    }

    #[test]
    fn test_schedule_defaults_export_price() {
        let tariff = TariffConfig {
            energy: [(0, 0.1)].into_iter().collect(),
            demand: [(0, 2.0), (1, 5.0)].into_iter().collect(),
            ..Default::default()
        };
        let maps = PeriodMaps {
            energy: vec![0, 0, 0],
            power: vec![1, 0, 1],
            export: vec![0, 0, 0],
        };
        let mut diag = Diagnostics::new();
        let schedule = TariffSchedule::new(&tariff, &SiteConfig::default(), maps, &mut diag).unwrap();
        assert_eq!(schedule.export_price(1), 0.0);
        assert_eq!(schedule.demand_periods(), vec![0, 1]);
        assert_eq!(schedule.previous_peak(1), 0.0);
        assert!(diag.has_category("defaults"));
    }
}
