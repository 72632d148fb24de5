// Copyright (C) 2017 Hove and/or its affiliates.
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by the
// Free Software Foundation, version 3.

// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.

// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>
//! Configuration of the realtime consumer.

use crate::Result;
use anyhow::{bail, Context};
use derivative::Derivative;
use serde::Deserialize;
use std::fs::File;
use std::path;
use std::time::Duration;
use tracing::info;

/// Settings of the realtime consumer
#[derive(Derivative, Deserialize, Debug, Clone, PartialEq)]
#[derivative(Default)]
#[serde(default)]
pub struct Config {
    /// Delay between two pulls of the feed, in seconds
    #[derivative(Default(value = "10"))]
    pub poll_interval_secs: u64,
    /// First delay before retrying a failing feed, in seconds
    #[derivative(Default(value = "1"))]
    pub retry_interval_secs: u64,
    /// The delay between two retries doubles up to this value, in seconds
    #[derivative(Default(value = "60"))]
    pub max_retry_interval_secs: u64,
    /// Maximum number of messages applied in one generation of the model
    #[derivative(Default(value = "5000"))]
    pub max_batch_size: usize,
    /// Contributors whose disruptions are applied, all of them if empty
    pub contributors: Vec<String>,
}

impl Config {
    #[allow(missing_docs)]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Delay before the `attempt`-th retry (starting at 0).
    pub fn retry_interval(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_secs(
            self.retry_interval_secs
                .saturating_mul(factor)
                .min(self.max_retry_interval_secs),
        )
    }

    /// Are the disruptions of `contributor` to be applied.
    pub fn accepts(&self, contributor: &str) -> bool {
        self.contributors.is_empty() || self.contributors.iter().any(|c| c == contributor)
    }
}

/// Read the JSON configuration of the realtime consumer, missing fields
/// taking their default value. Without a path, the default configuration
/// is returned.
///
/// Below is an example of this file
/// ```text
/// {
///     "poll_interval_secs": 5,
///     "retry_interval_secs": 1,
///     "max_retry_interval_secs": 30,
///     "max_batch_size": 1000,
///     "contributors": ["realtime.chaos", "realtime.trip_updates"]
/// }
/// ```
pub fn read_config<P: AsRef<path::Path>>(config_path: Option<P>) -> Result<Config> {
    let config_path = match config_path {
        Some(config_path) => config_path,
        None => return Ok(Config::default()),
    };
    let config_path = config_path.as_ref();
    info!("Reading realtime configuration from {:?}", config_path);
    let json_config_file = File::open(config_path)
        .with_context(|| format!("Error reading {:?}", config_path))?;
    let config: Config = serde_json::from_reader(json_config_file)
        .with_context(|| format!("Error parsing {:?}", config_path))?;
    if config.poll_interval_secs == 0 {
        bail!("poll_interval_secs must be strictly positive");
    }
    if config.max_retry_interval_secs < config.retry_interval_secs {
        bail!(
            "max_retry_interval_secs ({}) must not be lower than retry_interval_secs ({})",
            config.max_retry_interval_secs,
            config.retry_interval_secs
        );
    }
    Ok(config)
}
