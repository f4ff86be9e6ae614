use std::{fmt::Debug, fs, path::Path};

use chrono::{DateTime, Local, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::{
    core::forecast::{PriceForecast, PricePoint},
    prelude::*,
};

/// Hourly grid rates, as loaded from a TOML file:
///
/// ```toml
/// [[points]]
/// start = "2026-10-16T14:00:00+02:00"
/// purchase = 0.31
/// sale = 0.12
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriceTable {
    #[serde(default)]
    pub points: Vec<PricePoint>,
}

impl PriceTable {
    #[instrument(name = "reading the price table…")]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let table: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse `{}`", path.display()))?;
        ensure!(!table.points.is_empty(), "`{}` contains no price points", path.display());
        info!(n_points = table.points.len(), "loaded");
        Ok(table)
    }

    /// Slice the forecast: the hour containing `now` and up to `horizon_hours` hours after it.
    pub fn forecast_at(&self, now: DateTime<Local>, horizon_hours: u32) -> Result<PriceForecast> {
        let current = self
            .points
            .iter()
            .find(|point| point.start <= now && now < point.start + TimeDelta::hours(1))
            .with_context(|| format!("no price for {now}"))?;
        let end = current.start + TimeDelta::hours(i64::from(horizon_hours));
        Ok(self
            .points
            .iter()
            .filter(|point| current.start <= point.start && point.start <= end)
            .copied()
            .collect())
    }
}
