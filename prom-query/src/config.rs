use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;

use crate::errors::{PromError, Result};

/// Overrides `address` from the config file.
pub const PROMETHEUS_SERVER_ENDPOINT_ENV: &str = "PROMETHEUS_SERVER_ENDPOINT";
/// Overrides `query_offset` from the config file.
pub const PROMETHEUS_QUERY_OFFSET_ENV: &str = "PROMETHEUS_QUERY_OFFSET";

const DEFAULT_ADDRESS: &str = "http://127.0.0.1:9090";
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Settings used to build a [`PromClient`](crate::PromClient) and its query contexts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromConfig {
    /// Base URL of the Prometheus compatible backend
    pub address: String,
    /// How far in the past instant queries are evaluated, e.g. "90s" or "1m30s".
    /// Meant for backends with delayed ingestion (thanos, cortex, ...)
    #[serde(default)]
    pub query_offset: Option<String>,
    /// Per request timeout enforced by the HTTP transport
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Name tag for the query context built from this configuration
    #[serde(default)]
    pub context_name: Option<String>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for PromConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            query_offset: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            context_name: None,
        }
    }
}

impl PromConfig {
    /// Loads the configuration from a YAML file and applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = read_to_string(path).map_err(|e| {
            PromError::Config(format!("unable to read {}: {}", path.display(), e))
        })?;
        Ok(Self::from_yaml_str(&content)?.with_env_overrides())
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: PromConfig = serde_yaml::from_str(content)
            .map_err(|e| PromError::Config(format!("invalid configuration: {}", e)))?;
        // fail early on a bad offset rather than on the first query
        config.query_offset()?;
        Ok(config)
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(address) = lookup(PROMETHEUS_SERVER_ENDPOINT_ENV).filter(|a| !a.is_empty()) {
            self.address = address;
        }
        if let Some(offset) = lookup(PROMETHEUS_QUERY_OFFSET_ENV) {
            self.query_offset = Some(offset);
        }
        self
    }

    /// The parsed instant query offset; zero when unset.
    pub fn query_offset(&self) -> Result<Duration> {
        match &self.query_offset {
            Some(offset) => parse_duration(offset),
            None => Ok(Duration::ZERO),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Parses durations such as `250ms`, `90s`, `5m`, `1h` or `1h30m`.
/// An empty string or `0` is a zero duration.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || PromError::Config(format!("invalid duration value: {}", value));

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let (number, tail) = rest.split_at(number_len);
        let unit_len = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);

        let amount: f64 = number.parse().map_err(|_| invalid())?;
        let unit_secs = match unit {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        let part = Duration::try_from_secs_f64(amount * unit_secs).map_err(|_| invalid())?;
        total = total.checked_add(part).ok_or_else(invalid)?;
        rest = next;
    }

    Ok(total)
}
