use serde::Serialize;

use crate::quantity::energy::KilowattHours;

/// Net of production minus consumption within a single tick.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "energy", rename_all = "snake_case")]
pub enum EnergyBalance {
    /// Production exceeds consumption by the energy.
    Surplus(KilowattHours),

    /// Consumption exceeds production by the energy.
    Deficit(KilowattHours),

    Balanced,
}

impl EnergyBalance {
    /// Negative or non-finite readings count as zero.
    pub fn new(production: KilowattHours, consumption: KilowattHours) -> Self {
        Self::from_net(production.non_negative() - consumption.non_negative())
    }

    pub fn from_net(net: KilowattHours) -> Self {
        if !net.0.is_finite() {
            Self::Balanced
        } else if net > KilowattHours::ZERO {
            Self::Surplus(net)
        } else if net < KilowattHours::ZERO {
            Self::Deficit(-net)
        } else {
            Self::Balanced
        }
    }

    pub fn net(self) -> KilowattHours {
        match self {
            Self::Surplus(surplus) => surplus,
            Self::Deficit(deficit) => -deficit,
            Self::Balanced => KilowattHours::ZERO,
        }
    }
}
