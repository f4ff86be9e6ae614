use std::{fmt::Debug, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    core::{forecast::PriceForecast, sizing::Sizing},
    prelude::*,
    quantity::{Quantity, rate::KilowattHourRate},
};

/// Decision thresholds.
///
/// Every section and field is optional in the file and falls back to its default.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub spike: SpikeConfig,
    pub p2p: P2pConfig,
    pub high_price: HighPriceThreshold,
    pub deficit: DeficitConfig,
    pub proactive: ProactiveConfig,
}

impl Config {
    #[instrument(name = "reading the config…")]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse `{}`", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result {
        ensure!(
            self.spike.ratio.is_finite() && self.spike.ratio > 1.0,
            "spike ratio must be greater than 1, got {}",
            self.spike.ratio,
        );
        ensure!(self.spike.lookahead_hours != 0, "spike lookahead must be at least one hour");
        ensure!(
            self.p2p.margin.is_finite() && self.p2p.margin >= 0.0,
            "P2P margin must be non-negative, got {}",
            self.p2p.margin,
        );
        self.high_price.validate()?;

        let proactive = &self.proactive;
        ensure!(
            proactive.discount_ratio > 0.0 && proactive.discount_ratio <= 1.0,
            "proactive discount ratio must be within (0, 1], got {}",
            proactive.discount_ratio,
        );
        ensure!(
            proactive.window.start <= proactive.window.end,
            "proactive window is inverted: {:?}",
            proactive.window,
        );
        ensure!(
            proactive.window.end <= self.spike.lookahead_hours,
            "proactive window ends after the spike lookahead ({} > {})",
            proactive.window.end,
            self.spike.lookahead_hours,
        );
        ensure!(
            proactive.sizing.steepness.is_finite() && proactive.sizing.steepness > 0.0,
            "sizing steepness must be positive, got {}",
            proactive.sizing.steepness,
        );
        ensure!(
            (0.0..=1.0).contains(&proactive.sizing.distant_spike_factor),
            "distant spike factor must be within [0, 1], got {}",
            proactive.sizing.distant_spike_factor,
        );
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpikeConfig {
    /// Forecast rate must exceed the current rate by this factor to count as a spike.
    pub ratio: f64,

    /// How far the spike scan looks.
    pub lookahead_hours: u32,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self { ratio: 1.3, lookahead_hours: 12 }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct P2pConfig {
    /// P2P rate must exceed the grid sale rate by this fraction to be worth selling to peers.
    pub margin: f64,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self { margin: 0.1 }
    }
}

/// When the current purchase rate counts as high enough to discharge the storage.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HighPriceThreshold {
    /// Fixed rate.
    Absolute { rate: KilowattHourRate },

    /// Multiple of the forecast mean.
    Relative { ratio: f64 },

    /// Forecast mean plus the number of standard deviations.
    Statistical { deviations: f64 },
}

impl Default for HighPriceThreshold {
    fn default() -> Self {
        Self::Relative { ratio: 1.1 }
    }
}

impl HighPriceThreshold {
    /// Resolve the threshold against the forecast.
    ///
    /// Returns [`None`] when the forecast is empty and the threshold depends on it.
    pub fn resolve(self, forecast: &PriceForecast) -> Option<KilowattHourRate> {
        match self {
            Self::Absolute { rate } => Some(rate),
            Self::Relative { ratio } => Some(forecast.mean_rate()? * ratio),
            Self::Statistical { deviations } => {
                Some(forecast.mean_rate()? + forecast.standard_deviation()? * deviations)
            }
        }
    }

    fn validate(self) -> Result {
        match self {
            Self::Absolute { rate } => {
                ensure!(rate.0.is_finite() && rate >= Quantity::ZERO, "invalid rate: {rate}");
            }
            Self::Relative { ratio } => {
                ensure!(ratio.is_finite() && ratio > 0.0, "invalid high price ratio: {ratio}");
            }
            Self::Statistical { deviations } => {
                ensure!(deviations.is_finite(), "invalid number of deviations: {deviations}");
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeficitConfig {
    /// Keep the storage for a spike expected within this many hours.
    pub imminent_spike_hours: u32,
}

impl Default for DeficitConfig {
    fn default() -> Self {
        Self { imminent_spike_hours: 6 }
    }
}

/// Inclusive range of whole hours.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HourWindow {
    pub start: u32,
    pub end: u32,
}

impl HourWindow {
    #[must_use]
    pub const fn contains(self, hours: u32) -> bool {
        self.start <= hours && hours <= self.end
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProactiveConfig {
    pub enabled: bool,

    /// Also buy ahead of a spike on top of a grid purchase covering a deficit.
    pub alongside_deficit: bool,

    /// Current rate must be below this fraction of the forecast mean.
    pub discount_ratio: f64,

    /// Spike must be this many hours away.
    pub window: HourWindow,

    pub sizing: Sizing,
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alongside_deficit: false,
            discount_ratio: 0.7,
            window: HourWindow { start: 2, end: 12 },
            sizing: Sizing::default(),
        }
    }
}
