use bon::Builder;
use serde::Serialize;

use crate::{
    core::{
        balance::EnergyBalance,
        decision::{Action, Plan},
        engine::{Engine, Snapshot},
        forecast::PricePoint,
        storage::StorageState,
    },
    prelude::*,
    price_table::PriceTable,
    profile::{Profile, ProfilePoint},
    quantity::{cost::Cost, energy::KilowattHours},
};

/// Replays a profile hour by hour, executing every plan against the storage.
#[derive(Builder)]
pub struct Simulator<'a> {
    engine: Engine<'a>,
    prices: &'a PriceTable,
    initial_storage: StorageState,

    #[builder(default = 12)]
    horizon_hours: u32,
}

/// Single simulated hour.
#[derive(Clone, Debug, Serialize)]
pub struct Step {
    pub point: ProfilePoint,
    pub price: PricePoint,
    pub balance: EnergyBalance,
    pub plan: Plan,
    pub storage_before: StorageState,
    pub storage_after: StorageState,
    pub net_cost: Cost,
}

#[derive(Clone, Debug, Serialize)]
pub struct Simulation {
    pub steps: Vec<Step>,
    pub net_cost: Cost,

    /// Energy bought from the grid, proactively or not.
    pub bought: KilowattHours,

    /// Energy sold to the grid or to peers.
    pub sold: KilowattHours,
}

impl Simulator<'_> {
    #[instrument(skip_all, fields(n_points = profile.points.len()))]
    pub fn run(self, profile: &Profile) -> Result<Simulation> {
        let mut storage = self.initial_storage;
        let mut steps = Vec::with_capacity(profile.points.len());

        for point in &profile.points {
            let forecast = self
                .prices
                .forecast_at(point.start, self.horizon_hours)
                .with_context(|| format!("failed to slice the forecast at {}", point.start))?;
            let price = *forecast.current().context("the forecast is empty")?;
            let balance = EnergyBalance::new(point.production, point.consumption);
            let snapshot = Snapshot::builder()
                .balance(balance)
                .forecast(forecast)
                .storage(storage)
                .maybe_p2p_rate(point.p2p_rate)
                .build();
            let plan = self.engine.decide(&snapshot);

            let storage_before = storage;
            let delta = plan.storage_delta();
            storage = if delta >= KilowattHours::ZERO {
                storage.charged(delta)
            } else {
                storage.discharged(-delta)
            };
            steps.push(Step {
                point: *point,
                price,
                balance,
                plan,
                storage_before,
                storage_after: storage,
                net_cost: plan.net_cost(&price, point.p2p_rate),
            });
        }

        let net_cost = steps.iter().map(|step| step.net_cost).sum();
        let bought = steps
            .iter()
            .map(|step| step.plan.total(Action::Buy) + step.plan.total(Action::ProactiveBuy))
            .sum();
        let sold = steps.iter().map(|step| step.plan.total(Action::Sell)).sum();
        info!(
            n_steps = steps.len(),
            %net_cost,
            %bought,
            %sold,
            stored = %storage.stored(),
            "simulated",
        );
        Ok(Simulation { steps, net_cost, bought, sold })
    }
}
