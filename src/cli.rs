use std::path::PathBuf;

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};

use crate::{
    core::{
        balance::EnergyBalance,
        config::Config,
        storage::{StorageState, StorageUnit},
    },
    prelude::*,
    price_table::PriceTable,
    quantity::{energy::KilowattHours, rate::KilowattHourRate},
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: decide what to do with the current hour's surplus or deficit.
    #[clap(name = "decide")]
    Decide(Box<DecideArgs>),

    /// Replay an hourly production and consumption profile.
    #[clap(name = "simulate")]
    Simulate(Box<SimulateArgs>),

    /// Print the effective configuration.
    #[clap(name = "config")]
    Config(ConfigArgs),
}

#[derive(Parser)]
pub struct ConfigArgs {
    /// Thresholds file, defaults are used when omitted.
    #[clap(id = "config", long = "config", env = "KESTREL_CONFIG")]
    pub path: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<Config> {
        self.path.as_ref().map_or_else(|| Ok(Config::default()), Config::read_from)
    }
}

#[derive(Parser)]
pub struct PriceArgs {
    /// Hourly price table.
    #[clap(id = "prices", long = "prices", env = "KESTREL_PRICES")]
    pub path: PathBuf,

    /// How many hours after the current one to take into account.
    #[clap(long = "horizon-hours", default_value = "12", env = "KESTREL_HORIZON_HOURS")]
    pub horizon_hours: u32,
}

impl PriceArgs {
    pub fn read_table(&self) -> Result<PriceTable> {
        PriceTable::read_from(&self.path)
    }
}

#[derive(Parser)]
pub struct StorageArgs {
    /// Storage level and capacity in kilowatt-hours, `LEVEL/CAPACITY`. Repeat for several units.
    #[clap(
        long = "storage",
        env = "KESTREL_STORAGE",
        value_delimiter = ',',
        num_args = 1..,
        required = true,
    )]
    pub units: Vec<StorageUnit>,
}

impl StorageArgs {
    pub fn state(&self) -> StorageState {
        self.units.iter().copied().collect()
    }
}

#[derive(Parser)]
pub struct DecideArgs {
    /// Energy produced within the current hour, in kilowatt-hours.
    #[clap(long = "production-kwh", env = "PRODUCTION_KWH")]
    pub production: KilowattHours,

    /// Energy consumed within the current hour, in kilowatt-hours.
    #[clap(long = "consumption-kwh", env = "CONSUMPTION_KWH")]
    pub consumption: KilowattHours,

    /// Peer-to-peer trading rate per kilowatt-hour.
    #[clap(long = "p2p-rate", env = "P2P_RATE")]
    pub p2p_rate: Option<KilowattHourRate>,

    /// Decision time, defaults to now.
    #[clap(long, env = "KESTREL_NOW")]
    pub now: Option<DateTime<Local>>,

    /// Print the plan as JSON instead of the tables.
    #[clap(long)]
    pub json: bool,

    #[clap(flatten)]
    pub prices: PriceArgs,

    #[clap(flatten)]
    pub storage: StorageArgs,

    #[clap(flatten)]
    pub config: ConfigArgs,
}

impl DecideArgs {
    pub fn balance(&self) -> EnergyBalance {
        EnergyBalance::new(self.production, self.consumption)
    }

    pub fn now(&self) -> DateTime<Local> {
        self.now.unwrap_or_else(Local::now)
    }
}

#[derive(Parser)]
pub struct SimulateArgs {
    /// Hourly production and consumption profile.
    #[clap(long = "profile", env = "KESTREL_PROFILE")]
    pub profile: PathBuf,

    /// Print the simulation as JSON instead of the table.
    #[clap(long)]
    pub json: bool,

    #[clap(flatten)]
    pub prices: PriceArgs,

    #[clap(flatten)]
    pub storage: StorageArgs,

    #[clap(flatten)]
    pub config: ConfigArgs,
}
