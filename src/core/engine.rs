use bon::Builder;

use crate::{
    core::{
        balance::EnergyBalance,
        config::Config,
        decision::{Action, Decision, Market, Plan, Rationale},
        forecast::{PriceForecast, PricePoint, Spike},
        storage::StorageState,
    },
    prelude::*,
    quantity::{energy::KilowattHours, rate::KilowattHourRate},
};

/// Everything known at the moment of a decision.
#[derive(Clone, Debug, Builder)]
pub struct Snapshot {
    pub balance: EnergyBalance,
    pub forecast: PriceForecast,
    pub storage: StorageState,

    /// Peer-to-peer trading rate, if there is a market.
    pub p2p_rate: Option<KilowattHourRate>,
}

/// Rule-based decision engine.
///
/// Holds nothing but the thresholds.
#[derive(Copy, Clone)]
pub struct Engine<'a> {
    config: &'a Config,
}

impl<'a> Engine<'a> {
    pub const fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Decide what to do with the current tick's surplus or deficit.
    ///
    /// Never fails: malformed inputs are clamped, and without any applicable rule the plan is idle.
    #[instrument(skip_all, fields(balance = ?snapshot.balance))]
    pub fn decide(&self, snapshot: &Snapshot) -> Plan {
        let spike = snapshot
            .forecast
            .find_spike(self.config.spike.ratio, self.config.spike.lookahead_hours);
        let plan = match snapshot.balance {
            EnergyBalance::Surplus(surplus) => self.on_surplus(snapshot, surplus, spike),
            EnergyBalance::Deficit(need) => self.on_deficit(snapshot, need, spike),
            EnergyBalance::Balanced => {
                Plan::single(self.proactive_buy(snapshot, spike).unwrap_or_else(Decision::idle))
            }
        };
        debug!(?spike, primary = ?plan.primary, secondary = ?plan.secondary, "decided");
        plan
    }

    /// Store if there is a reason to, sell the rest.
    fn on_surplus(
        &self,
        snapshot: &Snapshot,
        surplus: KilowattHours,
        spike: Option<Spike>,
    ) -> Plan {
        let market = self.market(snapshot);
        let space = snapshot.storage.available_space();

        if space.is_positive() && (spike.is_some() || market == Market::Grid) {
            let stored = surplus.min(space);
            let rationale = match spike {
                Some(spike) => Rationale::SpikeAhead { spike },
                None => Rationale::PeersNotCompetitive,
            };
            let remainder = surplus - stored;
            return Plan::single(Decision::new(Action::Store, stored, rationale)).followed_by(
                remainder.is_positive().then(|| {
                    Decision::new(Action::Sell, remainder, Rationale::StorageFilled { market })
                }),
            );
        }

        let rationale = if space.is_positive() {
            // Peers pay well and there is no spike to store for:
            Rationale::PeersCompetitive
        } else {
            Rationale::StorageFull { market }
        };
        Plan::single(Decision::new(Action::Sell, surplus, rationale))
    }

    /// Discharge on a high price unless a spike is coming soon, buy the rest.
    fn on_deficit(&self, snapshot: &Snapshot, need: KilowattHours, spike: Option<Spike>) -> Plan {
        let current_rate = snapshot.forecast.current_rate();
        let high_price_threshold = self
            .config
            .high_price
            .resolve(&snapshot.forecast)
            .filter(|threshold| current_rate > *threshold);
        let imminent_spike =
            spike.filter(|spike| spike.hours_until <= self.config.deficit.imminent_spike_hours);
        let stored = snapshot.storage.stored();

        let rationale = match (high_price_threshold, imminent_spike) {
            (Some(threshold), None) if stored.is_positive() => {
                let used = need.min(stored);
                let remainder = need - used;
                return Plan::single(Decision::new(
                    Action::UseStorage,
                    used,
                    Rationale::HighPrice { threshold },
                ))
                .followed_by(
                    remainder.is_positive().then(|| {
                        Decision::new(Action::Buy, remainder, Rationale::StorageDrained)
                    }),
                );
            }
            (None, _) => Rationale::NormalPrice,
            (Some(_), Some(spike)) => Rationale::SpikeImminent { spike },
            (Some(_), None) => Rationale::StorageEmpty,
        };

        let proactive_buy = if self.config.proactive.alongside_deficit {
            self.proactive_buy(snapshot, spike)
        } else {
            None
        };
        Plan::single(Decision::new(Action::Buy, need, rationale)).followed_by(proactive_buy)
    }

    /// Buy into the storage when it is cheap now and a spike is forecast within the window.
    fn proactive_buy(&self, snapshot: &Snapshot, spike: Option<Spike>) -> Option<Decision> {
        let config = &self.config.proactive;
        if !config.enabled {
            return None;
        }
        let spike = spike.filter(|spike| config.window.contains(spike.hours_until))?;
        let mean_rate = snapshot.forecast.mean_rate()?;
        if snapshot.forecast.current_rate() >= mean_rate * config.discount_ratio {
            return None;
        }
        let space = snapshot.storage.available_space();
        if !space.is_positive() {
            return None;
        }
        let quantity = config.sizing.quantity(&spike, config.window, space);
        quantity.is_positive().then(|| {
            Decision::new(
                Action::ProactiveBuy,
                quantity,
                Rationale::CheapAheadOfSpike { spike, mean_rate },
            )
        })
    }

    /// Peers get the surplus only if they beat the grid sale rate by the margin.
    fn market(&self, snapshot: &Snapshot) -> Market {
        let Some(p2p_rate) = snapshot.p2p_rate.map(KilowattHourRate::non_negative) else {
            return Market::Grid;
        };
        let sale_rate = snapshot
            .forecast
            .current()
            .map_or(KilowattHourRate::ZERO, PricePoint::sale_rate);
        if p2p_rate > sale_rate * (1.0 + self.config.p2p.margin) && p2p_rate.is_positive() {
            Market::Peers
        } else {
            Market::Grid
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        core::{
            config::HighPriceThreshold,
            forecast::tests::hourly,
        },
        quantity::Quantity,
    };

    fn kwh(value: f64) -> KilowattHours {
        Quantity::from(value)
    }

    /// Flat 0.20 €/kWh with a 1.5× spike three hours ahead.
    fn spiking_forecast() -> PriceForecast {
        hourly(&[0.20, 0.20, 0.20, 0.30, 0.20, 0.20, 0.20, 0.20, 0.20, 0.20, 0.20, 0.20, 0.20])
    }

    fn flat_forecast(rate: f64) -> PriceForecast {
        hourly(&[rate; 13])
    }

    /// High current rate followed by cheaper hours, without a spike.
    fn expensive_now_forecast() -> PriceForecast {
        let mut rates = [0.30; 13];
        rates[0] = 0.40;
        hourly(&rates)
    }

    fn snapshot(
        balance: f64,
        forecast: PriceForecast,
        stored: f64,
        capacity: f64,
        p2p_rate: Option<f64>,
    ) -> Snapshot {
        Snapshot::builder()
            .balance(EnergyBalance::from_net(kwh(balance)))
            .forecast(forecast)
            .storage(StorageState::new(kwh(stored), kwh(capacity)))
            .maybe_p2p_rate(p2p_rate.map(Quantity::from))
            .build()
    }

    fn decide(snapshot: &Snapshot) -> Plan {
        Engine::new(&Config::default()).decide(snapshot)
    }

    #[test]
    fn stores_ahead_of_spike() {
        let plan = decide(&snapshot(5.0, spiking_forecast(), 0.0, 10.0, None));
        assert_eq!(plan.primary.action, Action::Store);
        assert_eq!(plan.primary.quantity, kwh(5.0));
        assert!(plan.secondary.is_none());
        let Rationale::SpikeAhead { spike } = plan.primary.rationale else {
            panic!("unexpected rationale: {:?}", plan.primary.rationale);
        };
        assert_eq!(spike.hours_until, 3);
        assert_abs_diff_eq!(spike.severity, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn sells_when_storage_is_full() {
        let plan = decide(&snapshot(5.0, spiking_forecast(), 10.0, 10.0, None));
        assert_eq!(plan.primary.action, Action::Sell);
        assert_eq!(plan.primary.quantity, kwh(5.0));
        assert_eq!(plan.primary.rationale, Rationale::StorageFull { market: Market::Grid });
    }

    #[test]
    fn stores_then_sells_remainder() {
        let plan = decide(&snapshot(5.0, flat_forecast(0.2), 8.0, 10.0, None));
        assert_eq!(plan.primary.action, Action::Store);
        assert_eq!(plan.primary.quantity, kwh(2.0));
        assert_eq!(plan.primary.rationale, Rationale::PeersNotCompetitive);
        let secondary = plan.secondary.unwrap();
        assert_eq!(secondary.action, Action::Sell);
        assert_eq!(secondary.quantity, kwh(3.0));
        assert_eq!(secondary.rationale.market(), Some(Market::Grid));
    }

    #[test]
    fn sells_to_competitive_peers_without_spike() {
        let plan = decide(&snapshot(5.0, flat_forecast(0.2), 0.0, 10.0, Some(0.25)));
        assert_eq!(plan.primary.action, Action::Sell);
        assert_eq!(plan.primary.quantity, kwh(5.0));
        assert_eq!(plan.primary.rationale.market(), Some(Market::Peers));
    }

    #[test]
    fn stores_instead_of_selling_to_peers_ahead_of_spike() {
        let plan = decide(&snapshot(5.0, spiking_forecast(), 0.0, 10.0, Some(0.25)));
        assert_eq!(plan.primary.action, Action::Store);
    }

    #[test]
    fn peers_within_margin_are_not_competitive() {
        let plan = decide(&snapshot(5.0, flat_forecast(0.2), 0.0, 10.0, Some(0.21)));
        assert_eq!(plan.primary.action, Action::Store);
        assert_eq!(plan.primary.rationale, Rationale::PeersNotCompetitive);
    }

    #[test]
    fn full_storage_sells_to_competitive_peers() {
        let plan = decide(&snapshot(5.0, flat_forecast(0.2), 10.0, 10.0, Some(0.25)));
        assert_eq!(plan.primary.rationale, Rationale::StorageFull { market: Market::Peers });
    }

    #[test]
    fn uses_storage_on_high_price() {
        let plan = decide(&snapshot(-8.0, expensive_now_forecast(), 10.0, 10.0, None));
        assert_eq!(plan.primary.action, Action::UseStorage);
        assert_eq!(plan.primary.quantity, kwh(8.0));
        assert!(matches!(plan.primary.rationale, Rationale::HighPrice { .. }));
        assert!(plan.secondary.is_none());
    }

    #[test]
    fn uses_storage_then_buys_remainder() {
        let plan = decide(&snapshot(-8.0, expensive_now_forecast(), 3.0, 10.0, None));
        assert_eq!(plan.primary.action, Action::UseStorage);
        assert_eq!(plan.primary.quantity, kwh(3.0));
        let secondary = plan.secondary.unwrap();
        assert_eq!(secondary.action, Action::Buy);
        assert_eq!(secondary.quantity, kwh(5.0));
        assert_eq!(secondary.rationale, Rationale::StorageDrained);
    }

    #[test]
    fn buys_on_normal_price() {
        let plan = decide(&snapshot(-8.0, flat_forecast(0.3), 10.0, 10.0, None));
        assert_eq!(plan.primary.action, Action::Buy);
        assert_eq!(plan.primary.quantity, kwh(8.0));
        assert_eq!(plan.primary.rationale, Rationale::NormalPrice);
        assert!(plan.secondary.is_none());
    }

    #[test]
    fn saves_storage_for_imminent_spike() {
        let mut rates = [0.30; 13];
        rates[0] = 0.40;
        rates[2] = 0.60;
        let plan = decide(&snapshot(-8.0, hourly(&rates), 10.0, 10.0, None));
        assert_eq!(plan.primary.action, Action::Buy);
        assert!(matches!(plan.primary.rationale, Rationale::SpikeImminent { .. }));
    }

    #[test]
    fn distant_spike_does_not_save_storage() {
        let mut rates = [0.30; 13];
        rates[0] = 0.40;
        rates[10] = 0.60;
        let config = Config {
            high_price: HighPriceThreshold::Absolute { rate: Quantity::from(0.35) },
            ..Config::default()
        };
        let plan = Engine::new(&config).decide(&snapshot(-8.0, hourly(&rates), 10.0, 10.0, None));
        assert_eq!(plan.primary.action, Action::UseStorage);
    }

    #[test]
    fn buys_on_high_price_with_empty_storage() {
        let plan = decide(&snapshot(-8.0, expensive_now_forecast(), 0.0, 10.0, None));
        assert_eq!(plan.primary.action, Action::Buy);
        assert_eq!(plan.primary.rationale, Rationale::StorageEmpty);
    }

    /// Current rate 0.10 €/kWh at half the 0.20 €/kWh mean, 2× spike four hours ahead.
    fn cheap_before_spike_forecast() -> PriceForecast {
        hourly(&[0.10, 0.10, 0.10, 0.10, 0.20, 0.25, 0.25, 0.25, 0.25, 0.25, 0.25, 0.25, 0.25])
    }

    #[test]
    fn buys_proactively_ahead_of_spike() {
        let forecast = cheap_before_spike_forecast();
        assert_abs_diff_eq!(forecast.mean_rate().unwrap().0.0, 0.20, epsilon = 1e-9);

        let plan = decide(&snapshot(0.0, forecast, 0.0, 20.0, None));
        assert_eq!(plan.primary.action, Action::ProactiveBuy);
        assert!(plan.primary.quantity >= kwh(12.0), "{:?}", plan.primary.quantity);
        assert!(plan.primary.quantity <= kwh(20.0));
        assert_abs_diff_eq!(plan.primary.quantity.0.0, 15.564, epsilon = 1e-3);
        assert!(plan.secondary.is_none());
        let Rationale::CheapAheadOfSpike { spike, .. } = plan.primary.rationale else {
            panic!("unexpected rationale: {:?}", plan.primary.rationale);
        };
        assert_eq!(spike.hours_until, 4);
        assert_abs_diff_eq!(spike.severity, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn mild_near_spike_is_not_reported_as_severe() {
        let mut rates = [0.10; 13];
        rates[2] = 0.131;
        rates[12] = 0.40;
        let plan = decide(&snapshot(5.0, hourly(&rates), 0.0, 10.0, None));
        assert_eq!(plan.primary.action, Action::Store);
        let Rationale::SpikeAhead { spike } = plan.primary.rationale else {
            panic!("unexpected rationale: {:?}", plan.primary.rationale);
        };
        assert_eq!(spike.hours_until, 2);
        assert_abs_diff_eq!(spike.severity, 1.31, epsilon = 1e-9);
        assert_eq!(spike.peak_hours, 12);
    }

    #[test]
    fn no_proactive_buy_when_disabled() {
        let mut config = Config::default();
        config.proactive.enabled = false;
        let plan = Engine::new(&config)
            .decide(&snapshot(0.0, cheap_before_spike_forecast(), 0.0, 20.0, None));
        assert_eq!(plan, Plan::single(Decision::idle()));
    }

    #[test]
    fn no_proactive_buy_when_spike_is_too_close() {
        let mut rates = [0.10; 13];
        rates[1] = 0.30;
        let plan = decide(&snapshot(0.0, hourly(&rates), 0.0, 20.0, None));
        assert_eq!(plan.primary.action, Action::Idle);
    }

    #[test]
    fn no_proactive_buy_when_not_discounted() {
        let mut rates = [0.20; 13];
        rates[5] = 0.30;
        let plan = decide(&snapshot(0.0, hourly(&rates), 0.0, 20.0, None));
        assert_eq!(plan.primary.action, Action::Idle);
    }

    #[test]
    fn proactive_buy_alongside_deficit() {
        let mut config = Config::default();
        config.proactive.alongside_deficit = true;
        let plan = Engine::new(&config)
            .decide(&snapshot(-2.0, cheap_before_spike_forecast(), 5.0, 20.0, None));
        assert_eq!(plan.primary.action, Action::Buy);
        assert_eq!(plan.primary.quantity, kwh(2.0));
        let secondary = plan.secondary.unwrap();
        assert_eq!(secondary.action, Action::ProactiveBuy);
        assert!(secondary.quantity <= kwh(15.0));

        let plan = decide(&snapshot(-2.0, cheap_before_spike_forecast(), 5.0, 20.0, None));
        assert!(plan.secondary.is_none());
    }

    #[test]
    fn store_wins_over_proactive_buy() {
        let plan = decide(&snapshot(1.0, cheap_before_spike_forecast(), 0.0, 20.0, None));
        assert_eq!(plan.primary.action, Action::Store);
        assert_eq!(plan.primary.quantity, kwh(1.0));
        assert!(plan.secondary.is_none());
    }

    #[test]
    fn idle_without_spike() {
        let plan = decide(&snapshot(0.0, flat_forecast(0.2), 5.0, 20.0, None));
        assert_eq!(plan, Plan::single(Decision::idle()));
    }

    #[test]
    fn empty_forecast_is_not_fatal() {
        let plan = decide(&snapshot(-3.0, PriceForecast::default(), 5.0, 10.0, Some(0.1)));
        assert_eq!(plan.primary.action, Action::Buy);
        let plan = decide(&snapshot(3.0, PriceForecast::default(), 5.0, 10.0, Some(0.1)));
        assert_eq!(plan.primary.action, Action::Sell);
        assert_eq!(plan.primary.rationale, Rationale::PeersCompetitive);
    }

    #[test]
    fn idempotent() {
        let snapshot = snapshot(-8.0, expensive_now_forecast(), 3.0, 10.0, Some(0.5));
        assert_eq!(decide(&snapshot), decide(&snapshot));
    }

    /// Sweep through balances, storage levels and forecasts and check the invariants.
    #[test]
    fn invariants() {
        let forecasts = [
            PriceForecast::default(),
            flat_forecast(0.2),
            spiking_forecast(),
            expensive_now_forecast(),
            cheap_before_spike_forecast(),
        ];
        let config = Config::default();
        let engine = Engine::new(&config);
        for forecast in forecasts {
            for balance in [-12.0, -8.0, -0.5, 0.0, 0.5, 5.0, 25.0] {
                for capacity in [0.0, 10.0, 20.0] {
                    for stored in [0.0, 3.0, 10.0, 20.0] {
                        for p2p_rate in [None, Some(0.05), Some(0.5)] {
                            let snapshot =
                                snapshot(balance, forecast.clone(), stored, capacity, p2p_rate);
                            check_invariants(&snapshot, &engine.decide(&snapshot));
                        }
                    }
                }
            }
        }
    }

    fn check_invariants(snapshot: &Snapshot, plan: &Plan) {
        let storage = snapshot.storage;
        let context = format!("{snapshot:?} → {plan:?}");

        for decision in plan.iter() {
            assert!(decision.quantity >= KilowattHours::ZERO, "{context}");
            if decision.action == Action::UseStorage {
                assert!(decision.quantity <= storage.stored(), "{context}");
            }
            if storage.capacity() == KilowattHours::ZERO {
                assert!(
                    !matches!(
                        decision.action,
                        Action::Store | Action::UseStorage | Action::ProactiveBuy
                    ),
                    "{context}",
                );
            }
        }
        assert!(
            plan.total(Action::Store) + plan.total(Action::ProactiveBuy)
                <= storage.available_space(),
            "{context}",
        );
        if plan.secondary.is_some() {
            assert_ne!(plan.primary.action, Action::Idle, "{context}");
        }

        match snapshot.balance {
            EnergyBalance::Surplus(surplus) => {
                assert_abs_diff_eq!(
                    (plan.total(Action::Store) + plan.total(Action::Sell)).0.0,
                    surplus.0.0,
                    epsilon = 1e-9,
                );
                if !storage.available_space().is_positive() {
                    assert_ne!(plan.primary.action, Action::Store, "{context}");
                }
            }
            EnergyBalance::Deficit(need) => {
                assert_abs_diff_eq!(
                    (plan.total(Action::UseStorage) + plan.total(Action::Buy)).0.0,
                    need.0.0,
                    epsilon = 1e-9,
                );
            }
            EnergyBalance::Balanced => {
                assert!(
                    matches!(plan.primary.action, Action::Idle | Action::ProactiveBuy),
                    "{context}",
                );
            }
        }
    }
}
