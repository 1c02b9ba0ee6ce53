//! # CLI Settings
//!
//! Optional YAML file passed with `--config`, layered over the environment:
//!
//! ```yaml
//! api_url: https://api.oncall.example.com
//! timeout_secs: 10
//! retry_budget_secs: 120
//! time_zone_aliases:
//!   Europe/Uzhgorod: Europe/Kyiv
//! ```
//!
//! The API token is only ever read from `ONCALL_API_TOKEN`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use oncall_client::ApiConfig;
use oncall_engine::EngineConfig;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub api_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub retry_budget_secs: Option<u64>,
    /// Extra timezone aliases (alias → canonical) on top of the built-in table.
    #[serde(default)]
    pub time_zone_aliases: BTreeMap<String, String>,
}

impl Settings {
    /// Load settings from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Client configuration: environment first, then the file's overrides.
    pub fn api_config(&self) -> Result<ApiConfig> {
        let mut config = ApiConfig::from_env().context("schedule API configuration")?;
        if let Some(url) = &self.api_url {
            config = config.with_base_url(url)?;
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout_secs = timeout;
        }
        Ok(config)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::from_env();
        if let Some(budget) = self.retry_budget_secs {
            config.retry = config.retry.with_budget(Duration::from_secs(budget));
        }
        config
            .drift
            .time_zones
            .extend(self.time_zone_aliases.clone());
        config
    }
}
