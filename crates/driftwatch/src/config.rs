//! Runtime configuration.
//!
//! Values come from defaults, then an optional JSON file or the environment,
//! then command line flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::aggregator::AggregatorConfig;
use crate::client::DEFAULT_BASE_URL;

const ENV_BASE_URL: &str = "DRIFTWATCH_BASE_URL";
const ENV_QUERY_TIMEOUT_SECS: &str = "DRIFTWATCH_QUERY_TIMEOUT_SECS";
const ENV_MAX_IN_FLIGHT: &str = "DRIFTWATCH_MAX_IN_FLIGHT";
const ENV_REFRESH_INTERVAL_SECS: &str = "DRIFTWATCH_REFRESH_INTERVAL_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the DriftGuard API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-call timeout for directory and alert queries
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// Cap on concurrent project queries (unbounded when absent)
    #[serde(default)]
    pub max_in_flight: Option<usize>,
    /// Interval between scheduled refreshes
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_query_timeout_secs() -> u64 {
    5
}
fn default_refresh_interval_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            query_timeout_secs: default_query_timeout_secs(),
            max_in_flight: None,
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl Config {
    /// Defaults overridden by `DRIFTWATCH_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Load a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply overrides from a key lookup; unparseable values are ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(secs) = parse_var(&lookup, ENV_QUERY_TIMEOUT_SECS) {
            self.query_timeout_secs = secs;
        }
        if let Some(cap) = parse_var(&lookup, ENV_MAX_IN_FLIGHT) {
            self.max_in_flight = Some(cap);
        }
        if let Some(secs) = parse_var(&lookup, ENV_REFRESH_INTERVAL_SECS) {
            self.refresh_interval_secs = secs;
        }
        self
    }

    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    #[must_use]
    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            max_in_flight: self.max_in_flight.filter(|cap| *cap > 0),
            query_timeout: self.query_timeout(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable configuration value");
            None
        }
    }
}
