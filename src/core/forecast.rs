use chrono::{DateTime, Local};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::quantity::{Quantity, rate::KilowattHourRate};

/// Grid rates for a single hour.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Start of the hour.
    pub start: DateTime<Local>,

    /// Grid purchase rate.
    pub purchase: KilowattHourRate,

    /// Grid sale (feed-in) rate, if it differs from the purchase rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale: Option<KilowattHourRate>,
}

impl PricePoint {
    pub fn purchase_rate(&self) -> KilowattHourRate {
        self.purchase.non_negative()
    }

    pub fn sale_rate(&self) -> KilowattHourRate {
        self.sale.unwrap_or(self.purchase).non_negative()
    }
}

/// Forecast price spike: the first spiking point within the lookahead.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Spike {
    /// Whole hours from the current point to the spiking point.
    pub hours_until: u32,

    /// Spiking rate divided by the current rate.
    ///
    /// Infinite when the current rate is zero.
    pub severity: f64,

    pub rate: KilowattHourRate,

    /// Whole hours until the highest spiking point, which may come later.
    pub peak_hours: u32,

    pub peak_rate: KilowattHourRate,
}

/// Current hour followed by the upcoming hours, ordered by time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PriceForecast(Vec<PricePoint>);

impl FromIterator<PricePoint> for PriceForecast {
    fn from_iter<T: IntoIterator<Item = PricePoint>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .sorted_by_key(|point| point.start)
                .dedup_by(|lhs, rhs| lhs.start == rhs.start)
                .collect(),
        )
    }
}

impl PriceForecast {
    #[must_use]
    pub fn current(&self) -> Option<&PricePoint> {
        self.0.first()
    }

    /// Current purchase rate, zero for an empty forecast.
    pub fn current_rate(&self) -> KilowattHourRate {
        self.current().map_or(KilowattHourRate::ZERO, PricePoint::purchase_rate)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.0.iter()
    }

    /// Points after the current one, paired with whole hours since the current point.
    ///
    /// Points that are not strictly after the current one are skipped.
    pub fn upcoming(&self) -> impl Iterator<Item = (u32, &PricePoint)> {
        let current_start = self.current().map(|point| point.start);
        self.0.iter().skip(1).filter_map(move |point| {
            let hours = (point.start - current_start?).num_hours();
            let hours = u32::try_from(hours).ok().filter(|hours| *hours != 0)?;
            Some((hours, point))
        })
    }

    /// Mean purchase rate over the whole forecast, including the current hour.
    pub fn mean_rate(&self) -> Option<KilowattHourRate> {
        if self.is_empty() {
            return None;
        }
        #[expect(clippy::cast_precision_loss)]
        let len = self.len() as f64;
        Some(self.0.iter().map(PricePoint::purchase_rate).sum::<KilowattHourRate>() / len)
    }

    /// Population standard deviation of the purchase rates.
    pub fn standard_deviation(&self) -> Option<KilowattHourRate> {
        let mean = self.mean_rate()?;
        #[expect(clippy::cast_precision_loss)]
        let len = self.len() as f64;
        let variance = self
            .0
            .iter()
            .map(|point| (point.purchase_rate() - mean).0.0.powi(2))
            .sum::<f64>()
            / len;
        Some(Quantity::from(variance.sqrt()))
    }

    /// Find the first point within the lookahead which exceeds the current rate by the ratio.
    ///
    /// The severity is that of the first spiking point, the peak is reported separately.
    pub fn find_spike(&self, ratio: f64, lookahead_hours: u32) -> Option<Spike> {
        let current_rate = self.current_rate();
        let threshold = current_rate * ratio.max(1.0);
        let mut spiking = self
            .upcoming()
            .filter(|(hours, _)| *hours <= lookahead_hours)
            .map(|(hours, point)| (hours, point.purchase_rate()))
            .filter(|(_, rate)| *rate > threshold && *rate > current_rate);
        let (hours_until, rate) = spiking.next()?;
        let (peak_hours, peak_rate) = spiking.fold((hours_until, rate), |peak, (hours, rate)| {
            if rate > peak.1 { (hours, rate) } else { peak }
        });
        let severity = if current_rate.is_positive() { rate / current_rate } else { f64::INFINITY };
        Some(Spike { hours_until, severity, rate, peak_hours, peak_rate })
    }
}
