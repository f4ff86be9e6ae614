use std::fmt::{Display, Formatter};

use comfy_table::Color;
use serde::Serialize;

use crate::{
    core::forecast::{PricePoint, Spike},
    quantity::{cost::Cost, energy::KilowattHours, rate::KilowattHourRate},
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Put surplus energy into the storage.
    Store,

    /// Sell surplus energy to the grid or to peers.
    Sell,

    /// Cover the deficit from the storage.
    UseStorage,

    /// Cover the deficit from the grid.
    Buy,

    /// Buy from the grid into the storage ahead of a price spike.
    ProactiveBuy,

    /// Do not do anything.
    #[serde(rename = "NONE")]
    Idle,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store => write!(f, "Store"),
            Self::Sell => write!(f, "Sell"),
            Self::UseStorage => write!(f, "Use storage"),
            Self::Buy => write!(f, "Buy"),
            Self::ProactiveBuy => write!(f, "Proactive buy"),
            Self::Idle => write!(f, "Idle"),
        }
    }
}

impl Action {
    pub const fn color(self) -> Color {
        match self {
            Self::Store => Color::Green,
            Self::Sell => Color::Cyan,
            Self::UseStorage => Color::Blue,
            Self::Buy => Color::Red,
            Self::ProactiveBuy => Color::Magenta,
            Self::Idle => Color::Reset,
        }
    }

    /// Signed effect of the action on the stored energy.
    fn storage_delta(self, quantity: KilowattHours) -> KilowattHours {
        match self {
            Self::Store | Self::ProactiveBuy => quantity,
            Self::UseStorage => -quantity,
            Self::Sell | Self::Buy | Self::Idle => KilowattHours::ZERO,
        }
    }
}

/// Where the surplus is sold.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Grid,
    Peers,
}

impl Display for Market {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grid => write!(f, "grid"),
            Self::Peers => write!(f, "peers"),
        }
    }
}

/// The rule that produced a decision.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rationale {
    /// Surplus kept for an upcoming spike.
    SpikeAhead { spike: Spike },

    /// Surplus kept because peers do not pay enough.
    PeersNotCompetitive,

    /// Remainder of the surplus after the storage got filled up.
    StorageFilled { market: Market },

    /// No space left in the storage.
    StorageFull { market: Market },

    /// Peers pay enough and there is no spike to store for.
    PeersCompetitive,

    /// Current purchase rate is above the threshold.
    HighPrice { threshold: KilowattHourRate },

    /// Remainder of the deficit after the storage got drained.
    StorageDrained,

    /// Current purchase rate is not high, the storage is saved for later.
    NormalPrice,

    /// Storage is saved for a spike coming soon.
    SpikeImminent { spike: Spike },

    /// Price is high but there is nothing stored.
    StorageEmpty,

    /// Cheap now, expensive later.
    CheapAheadOfSpike { spike: Spike, mean_rate: KilowattHourRate },

    /// No surplus, no deficit, no reason to buy.
    Balanced,
}

impl Rationale {
    /// Destination of a sale.
    pub const fn market(&self) -> Option<Market> {
        match self {
            Self::StorageFilled { market } | Self::StorageFull { market } => Some(*market),
            Self::PeersCompetitive => Some(Market::Peers),
            _ => None,
        }
    }
}

impl Display for Rationale {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpikeAhead { spike } => write!(
                f,
                "{:.2}× spike in {} h",
                spike.severity, spike.hours_until,
            ),
            Self::PeersNotCompetitive => write!(f, "peers are not competitive"),
            Self::StorageFilled { market } => write!(f, "storage filled, selling to {market}"),
            Self::StorageFull { market } => write!(f, "storage full, selling to {market}"),
            Self::PeersCompetitive => write!(f, "selling to peers"),
            Self::HighPrice { threshold } => write!(f, "price above {threshold}"),
            Self::StorageDrained => write!(f, "storage drained"),
            Self::NormalPrice => write!(f, "price is not high"),
            Self::SpikeImminent { spike } => write!(
                f,
                "saving storage for {:.2}× spike in {} h",
                spike.severity, spike.hours_until,
            ),
            Self::StorageEmpty => write!(f, "storage empty"),
            Self::CheapAheadOfSpike { spike, mean_rate } => write!(
                f,
                "below {mean_rate} mean, {:.2}× spike in {} h",
                spike.severity, spike.hours_until,
            ),
            Self::Balanced => write!(f, "balanced"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,

    /// Always non-negative.
    pub quantity: KilowattHours,

    pub rationale: Rationale,
}

impl Decision {
    pub fn new(action: Action, quantity: KilowattHours, rationale: Rationale) -> Self {
        Self { action, quantity: quantity.non_negative(), rationale }
    }

    pub const fn idle() -> Self {
        Self { action: Action::Idle, quantity: KilowattHours::ZERO, rationale: Rationale::Balanced }
    }

    /// Net cost at the given rates, positive when money is spent.
    pub fn cost(&self, point: &PricePoint, p2p_rate: Option<KilowattHourRate>) -> Cost {
        match self.action {
            Action::Buy | Action::ProactiveBuy => self.quantity * point.purchase_rate(),
            Action::Sell => {
                let rate = match (self.rationale.market(), p2p_rate) {
                    (Some(Market::Peers), Some(p2p_rate)) => p2p_rate.non_negative(),
                    _ => point.sale_rate(),
                };
                -(self.quantity * rate)
            }
            Action::Store | Action::UseStorage | Action::Idle => Cost::ZERO,
        }
    }
}

/// Decisions for a single tick: the primary one and, optionally, what to do with the remainder.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Plan {
    pub primary: Decision,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<Decision>,
}

impl Plan {
    pub const fn single(primary: Decision) -> Self {
        Self { primary, secondary: None }
    }

    /// Attach the secondary decision, if any.
    pub const fn followed_by(mut self, secondary: Option<Decision>) -> Self {
        self.secondary = secondary;
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Decision> {
        std::iter::once(&self.primary).chain(&self.secondary)
    }

    /// Total energy of the action across the plan.
    pub fn total(&self, action: Action) -> KilowattHours {
        self.iter()
            .filter(|decision| decision.action == action)
            .map(|decision| decision.quantity)
            .sum()
    }

    /// Signed change of the stored energy if the plan gets executed.
    pub fn storage_delta(&self) -> KilowattHours {
        self.iter().map(|decision| decision.action.storage_delta(decision.quantity)).sum()
    }

    pub fn net_cost(&self, point: &PricePoint, p2p_rate: Option<KilowattHourRate>) -> Cost {
        self.iter().map(|decision| decision.cost(point, p2p_rate)).sum()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{core::forecast::tests::start_time, quantity::Quantity};

    fn point() -> PricePoint {
        PricePoint {
            start: start_time(),
            purchase: Quantity::from(0.30),
            sale: Some(Quantity::from(0.10)),
        }
    }

    #[test]
    fn quantity_is_clamped() {
        let decision = Decision::new(Action::Buy, Quantity::from(-1.0), Rationale::NormalPrice);
        assert_eq!(decision.quantity, KilowattHours::ZERO);
    }

    #[test]
    fn net_cost_of_store_and_sell() {
        let plan = Plan::single(Decision::new(
            Action::Store,
            Quantity::from(2.0),
            Rationale::PeersNotCompetitive,
        ))
        .followed_by(Some(Decision::new(
            Action::Sell,
            Quantity::from(3.0),
            Rationale::StorageFilled { market: Market::Grid },
        )));
        assert_abs_diff_eq!(plan.net_cost(&point(), Some(Quantity::from(0.5))).0.0, -0.3);
        assert_eq!(plan.storage_delta(), Quantity::from(2.0));
        assert_eq!(plan.total(Action::Sell), Quantity::from(3.0));
    }

    #[test]
    fn net_cost_of_peer_sale() {
        let plan = Plan::single(Decision::new(
            Action::Sell,
            Quantity::from(2.0),
            Rationale::PeersCompetitive,
        ));
        assert_abs_diff_eq!(plan.net_cost(&point(), Some(Quantity::from(0.2))).0.0, -0.4);
    }

    #[test]
    fn net_cost_of_discharge_and_buy() {
        let plan = Plan::single(Decision::new(
            Action::UseStorage,
            Quantity::from(3.0),
            Rationale::HighPrice { threshold: Quantity::from(0.25) },
        ))
        .followed_by(Some(Decision::new(
            Action::Buy,
            Quantity::from(5.0),
            Rationale::StorageDrained,
        )));
        assert_abs_diff_eq!(plan.net_cost(&point(), None).0.0, 1.5);
        assert_eq!(plan.storage_delta(), Quantity::from(-3.0));
        assert_eq!(plan.iter().count(), 2);
    }

    #[test]
    fn serializes_to_json() {
        let plan = Plan::single(Decision::idle());
        let json = serde_json::to_value(plan).unwrap();
        assert_eq!(json["primary"]["action"], "NONE");
        assert_eq!(json["primary"]["rationale"]["rule"], "balanced");
        assert!(json.get("secondary").is_none());
    }
}
