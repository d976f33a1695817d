//! Run configuration and validation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// Configuration for one scraping run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Worker concurrency. Also the driver pool capacity.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// How long a worker waits for an idle driver before giving up.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Per-driver wait during the final drain.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// Label used for log correlation only.
    #[serde(default = "default_run_id")]
    pub run_id: String,
}

fn default_concurrency() -> usize {
    1
}

fn default_acquire_timeout_ms() -> u64 {
    60_000
}

fn default_drain_timeout_ms() -> u64 {
    1_000_000
}

fn default_run_id() -> String {
    "webharvest".to_string()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            run_id: default_run_id(),
        }
    }
}

impl ScraperConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(HarvestError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ScraperConfig::default();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.acquire_timeout(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = ScraperConfig {
            concurrency: 0,
            ..ScraperConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HarvestError::Config(_))
        ));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ScraperConfig = serde_json::from_str(r#"{"concurrency": 4}"#).unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.acquire_timeout_ms, 60_000);
        assert_eq!(config.run_id, "webharvest");
    }
}
