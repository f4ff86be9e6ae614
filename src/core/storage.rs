use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{prelude::*, quantity::energy::KilowattHours};

/// Single storage as reported by its meter.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StorageUnit {
    pub level: KilowattHours,
    pub capacity: KilowattHours,
}

impl FromStr for StorageUnit {
    type Err = Error;

    /// Parse `LEVEL/CAPACITY` in kilowatt-hours, for example `4.5/10`.
    fn from_str(s: &str) -> Result<Self> {
        let (level, capacity) =
            s.split_once('/').with_context(|| format!("expected `LEVEL/CAPACITY`, got `{s}`"))?;
        Ok(Self {
            level: level.trim().parse().with_context(|| format!("invalid level: `{level}`"))?,
            capacity: capacity
                .trim()
                .parse()
                .with_context(|| format!("invalid capacity: `{capacity}`"))?,
        })
    }
}

/// Stored energy and capacity, possibly aggregated over several units.
///
/// The stored energy is always within `0..=capacity`.
#[must_use]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct StorageState {
    stored: KilowattHours,
    capacity: KilowattHours,
}

impl StorageState {
    pub fn new(stored: KilowattHours, capacity: KilowattHours) -> Self {
        let capacity = capacity.non_negative();
        Self { stored: stored.non_negative().min(capacity), capacity }
    }

    pub const fn stored(self) -> KilowattHours {
        self.stored
    }

    pub const fn capacity(self) -> KilowattHours {
        self.capacity
    }

    pub fn available_space(self) -> KilowattHours {
        self.capacity - self.stored
    }

    /// Add energy, spilling whatever does not fit.
    pub fn charged(self, energy: KilowattHours) -> Self {
        Self::new(self.stored + energy.non_negative(), self.capacity)
    }

    /// Take energy out, stopping at empty.
    pub fn discharged(self, energy: KilowattHours) -> Self {
        Self::new(self.stored - energy.non_negative(), self.capacity)
    }
}

impl From<StorageUnit> for StorageState {
    fn from(unit: StorageUnit) -> Self {
        Self::new(unit.level, unit.capacity)
    }
}

impl FromIterator<StorageUnit> for StorageState {
    /// Sum the units up, each one clamped on its own.
    fn from_iter<T: IntoIterator<Item = StorageUnit>>(iter: T) -> Self {
        iter.into_iter().map(Self::from).fold(Self::default(), |total, unit| {
            Self::new(total.stored + unit.stored, total.capacity + unit.capacity)
        })
    }
}
