use serde::{Deserialize, Serialize};

use crate::{
    core::{config::HourWindow, forecast::Spike},
    quantity::energy::KilowattHours,
};

/// Proactive purchase sizing: how much of the available space to fill ahead of a spike.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sizing {
    /// How quickly the severity factor saturates towards `1.0`.
    pub steepness: f64,

    /// Time factor at the far end of the proactive window, `1.0` at the near end.
    pub distant_spike_factor: f64,
}

impl Default for Sizing {
    fn default() -> Self {
        Self { steepness: 2.0, distant_spike_factor: 0.5 }
    }
}

impl Sizing {
    /// Fraction of the available space to buy, within `0.0..=1.0`.
    ///
    /// Grows with the spike severity and shrinks as the spike gets further away.
    #[must_use]
    pub fn fraction(&self, spike: &Spike, window: HourWindow) -> f64 {
        let severity_factor = 1.0 - (-self.steepness * (spike.severity - 1.0).max(0.0)).exp();

        let span = window.end.saturating_sub(window.start);
        let distance = if span == 0 {
            0.0
        } else {
            let hours = spike.hours_until.max(window.start).min(window.end) - window.start;
            f64::from(hours) / f64::from(span)
        };
        let time_factor = 1.0 - (1.0 - self.distant_spike_factor) * distance;

        let fraction = severity_factor * time_factor;
        if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 }
    }

    pub fn quantity(
        &self,
        spike: &Spike,
        window: HourWindow,
        available_space: KilowattHours,
    ) -> KilowattHours {
        available_space.non_negative() * self.fraction(spike, window)
    }
}
