use std::{fmt::Debug, fs, path::Path};

use chrono::{DateTime, Local};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    prelude::*,
    quantity::{energy::KilowattHours, rate::KilowattHourRate},
};

/// Production and consumption within an hour.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilePoint {
    pub start: DateTime<Local>,
    pub production: KilowattHours,
    pub consumption: KilowattHours,

    /// Peer-to-peer rate offered within the hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p2p_rate: Option<KilowattHourRate>,
}

/// Hourly production and consumption to replay in a simulation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    #[serde(default)]
    pub points: Vec<ProfilePoint>,
}

impl Profile {
    /// Read the profile, ordered by time.
    #[instrument(name = "reading the profile…")]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let profile = Self::parse(&contents)
            .with_context(|| format!("failed to parse `{}`", path.display()))?;
        info!(n_points = profile.points.len(), "loaded");
        Ok(profile)
    }

    fn parse(contents: &str) -> Result<Self> {
        let mut profile: Self = toml::from_str(contents)?;
        profile.points.sort_by_key(|point| point.start);
        ensure!(
            profile.points.iter().map(|point| point.start).all_unique(),
            "the profile contains duplicate hours",
        );
        Ok(profile)
    }
}
