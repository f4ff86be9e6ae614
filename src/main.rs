#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod cli;
mod core;
mod prelude;
mod price_table;
mod profile;
mod quantity;
mod simulation;
mod tables;

use clap::{Parser, crate_version};

use crate::{
    cli::{Args, Command, DecideArgs, SimulateArgs},
    core::engine::{Engine, Snapshot},
    prelude::*,
    profile::Profile,
    simulation::Simulator,
    tables::{build_forecast_table, build_plan_table, build_simulation_table},
};

fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().with_writer(std::io::stderr).init();
    info!(version = crate_version!(), "starting…");

    match Args::parse().command {
        Command::Decide(args) => decide(&args)?,
        Command::Simulate(args) => simulate(&args)?,
        Command::Config(args) => print!("{}", toml::to_string(&args.load()?)?),
    }

    info!("done!");
    Ok(())
}

#[instrument(skip_all)]
fn decide(args: &DecideArgs) -> Result {
    let config = args.config.load()?;
    let now = args.now();
    let forecast = args.prices.read_table()?.forecast_at(now, args.prices.horizon_hours)?;
    info!(
        %now,
        n_points = forecast.len(),
        current_rate = %forecast.current_rate(),
        "sliced the forecast",
    );

    let snapshot = Snapshot::builder()
        .balance(args.balance())
        .forecast(forecast)
        .storage(args.storage.state())
        .maybe_p2p_rate(args.p2p_rate)
        .build();
    info!(
        net = %snapshot.balance.net(),
        stored = %snapshot.storage.stored(),
        capacity = %snapshot.storage.capacity(),
        "built the snapshot",
    );

    let plan = Engine::new(&config).decide(&snapshot);
    info!(action = %plan.primary.action, quantity = %plan.primary.quantity, "decided");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{}", build_forecast_table(&snapshot.forecast, config.spike.ratio));
        println!("{}", build_plan_table(&plan, snapshot.forecast.current(), snapshot.p2p_rate));
    }
    Ok(())
}

#[instrument(skip_all)]
fn simulate(args: &SimulateArgs) -> Result {
    let config = args.config.load()?;
    let prices = args.prices.read_table()?;
    let profile = Profile::read_from(&args.profile)?;

    let simulation = Simulator::builder()
        .engine(Engine::new(&config))
        .prices(&prices)
        .initial_storage(args.storage.state())
        .horizon_hours(args.prices.horizon_hours)
        .build()
        .run(&profile)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&simulation)?);
    } else {
        println!("{}", build_simulation_table(&simulation));
    }
    Ok(())
}
