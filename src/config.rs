//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`, then held as `SecretString`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::engine::{AnalysisConfig, AnalysisOptions};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Overrides for every watchlist request.
    #[serde(default)]
    pub options: AnalysisOptions,
    #[serde(default)]
    pub watchlist: Vec<WatchedMarket>,
    /// JSON case library replacing the built-in one.
    #[serde(default)]
    pub case_library_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub polymarket: PolymarketConfig,
    #[serde(default)]
    pub news: NewsProviderConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PolymarketConfig {
    /// Gamma metadata API; the public endpoint when unset.
    #[serde(default)]
    pub gamma_url: Option<String>,
    /// Data API for trades; the public endpoint when unset.
    #[serde(default)]
    pub data_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewsProviderConfig {
    pub enabled: bool,
    #[serde(default = "default_news_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_news_key_env() -> String {
    "NEWS_API_KEY".to_string()
}

impl Default for NewsProviderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key_env: default_news_key_env(),
            base_url: None,
        }
    }
}

/// A market analysed on every tick.
#[derive(Debug, Deserialize, Clone)]
pub struct WatchedMarket {
    pub market_id: String,
    #[serde(default)]
    pub topic: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.options.validate().context("Invalid [options]")?;
        if config.service.interval_secs == 0 {
            anyhow::bail!("service.interval_secs must be positive");
        }
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an environment variable holding a secret.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Self::resolve_env(env_name).map(SecretString::new)
    }
}
