//! Configuration module for the transaction pipeline
//!
//! Configuration is loaded from a TOML file, optionally overridden by
//! `TXPIPE_*` environment variables (a `.env` file is honoured), and
//! validated before use. Every section has defaults, so a partial file is
//! enough.

use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use std::time::Duration;
use thiserror::Error;

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub quote: QuoteConfig,

    #[serde(default)]
    pub submission: SubmissionConfig,

    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    #[serde(default)]
    pub fees: FeeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Commitment used for reads and status checks
    #[serde(default = "default_commitment")]
    pub commitment: CommitmentLevel,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    /// Swap aggregator base URL (quote and swap-instructions endpoints)
    #[serde(default = "default_quote_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Outbound request budget towards the aggregator
    #[serde(default = "default_quote_rate_limit")]
    pub rate_limit_rps: u32,

    #[serde(default = "default_quote_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_slippage_bps")]
    pub default_slippage_bps: u16,

    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u16,

    /// Quiet period after the last amount change before fetching
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Background refresh period while an amount is pending
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wall-clock budget for all attempts, in seconds
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,

    /// Base pause between attempts in milliseconds
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// How long a rent-exemption floor stays cached, in seconds
    #[serde(default = "default_rent_cache_ttl")]
    pub rent_cache_ttl_secs: u64,

    /// Commitment used for rent-exemption lookups
    #[serde(default = "default_commitment")]
    pub rent_commitment: CommitmentLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_rpc_url() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_commitment() -> CommitmentLevel { CommitmentLevel::Confirmed }
fn default_rpc_timeout() -> u64 { 30 }
fn default_quote_api_url() -> String { "https://lite-api.jup.ag/swap/v1".to_string() }
fn default_quote_rate_limit() -> u32 { 10 }
fn default_quote_timeout() -> u64 { 15 }
fn default_slippage_bps() -> u16 { 50 }
fn default_max_slippage_bps() -> u16 { 5000 }
fn default_debounce_ms() -> u64 { 500 }
fn default_refresh_interval() -> u64 { 5 }
fn default_max_attempts() -> u32 { 3 }
fn default_budget_secs() -> u64 { 60 }
fn default_base_backoff_ms() -> u64 { 50 }
fn default_max_backoff_ms() -> u64 { 200 }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_max_polls() -> u32 { 60 }
fn default_rent_cache_ttl() -> u64 { 30 }
fn default_log_level() -> String { "txpipe=info,warn".to_string() }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            commitment: default_commitment(),
            timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            api_url: default_quote_api_url(),
            api_key: None,
            rate_limit_rps: default_quote_rate_limit(),
            timeout_secs: default_quote_timeout(),
            default_slippage_bps: default_slippage_bps(),
            max_slippage_bps: default_max_slippage_bps(),
            debounce_ms: default_debounce_ms(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            budget_secs: default_budget_secs(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            rent_cache_ttl_secs: default_rent_cache_ttl(),
            rent_commitment: default_commitment(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl RpcConfig {
    pub fn commitment_config(&self) -> CommitmentConfig {
        CommitmentConfig {
            commitment: self.commitment,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl QuoteConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl SubmissionConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.budget_secs)
    }
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl FeeConfig {
    pub fn rent_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.rent_cache_ttl_secs)
    }
}

impl PipelineConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read config file {}: {}", path, e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `TXPIPE_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("TXPIPE_RPC_URL") {
            self.rpc.url = url;
        }
        if let Some(url) = lookup("TXPIPE_QUOTE_API_URL") {
            self.quote.api_url = url;
        }
        if let Some(key) = lookup("TXPIPE_QUOTE_API_KEY") {
            self.quote.api_key = Some(key);
        }
        if let Some(level) = lookup("TXPIPE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("TXPIPE_LOG_JSON").and_then(|v| v.parse().ok()) {
            self.logging.json = json;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [("rpc.url", &self.rpc.url), ("quote.api_url", &self.quote.api_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "Invalid URL format for {}: {}",
                    name, url
                )));
            }
        }

        if self.quote.default_slippage_bps > self.quote.max_slippage_bps {
            return Err(ConfigError::Validation(format!(
                "Default slippage {}bps exceeds maximum {}bps",
                self.quote.default_slippage_bps, self.quote.max_slippage_bps
            )));
        }

        let must_be_positive = [
            ("quote.rate_limit_rps", u64::from(self.quote.rate_limit_rps)),
            ("quote.refresh_interval_secs", self.quote.refresh_interval_secs),
            ("submission.max_attempts", u64::from(self.submission.max_attempts)),
            ("submission.budget_secs", self.submission.budget_secs),
            ("confirmation.poll_interval_ms", self.confirmation.poll_interval_ms),
            ("confirmation.max_polls", u64::from(self.confirmation.max_polls)),
        ];
        for (name, value) in must_be_positive {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{} must be > 0", name)));
            }
        }

        if self.submission.base_backoff_ms > self.submission.max_backoff_ms {
            return Err(ConfigError::Validation(
                "submission.base_backoff_ms must not exceed submission.max_backoff_ms".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration-related errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.quote.debounce_ms, 500);
        assert_eq!(config.quote.refresh_interval_secs, 5);
        assert_eq!(config.submission.max_attempts, 3);
        assert_eq!(config.submission.budget_secs, 60);
        assert_eq!(config.confirmation.poll_interval_ms, 1000);
        assert_eq!(config.confirmation.max_polls, 60);
        assert_eq!(config.fees.rent_cache_ttl_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [rpc]
            url = "http://localhost:8899"
            commitment = "finalized"

            [submission]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.rpc.url, "http://localhost:8899");
        assert_eq!(config.rpc.commitment, CommitmentLevel::Finalized);
        assert_eq!(config.submission.max_attempts, 5);
        assert_eq!(config.submission.budget_secs, 60);
        assert_eq!(config.quote.default_slippage_bps, 50);
    }

    #[test]
    fn test_config_validation() {
        let mut config = PipelineConfig::default();
        config.rpc.url = "not-a-url".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = PipelineConfig::default();
        config.confirmation.max_polls = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.quote.default_slippage_bps = 6000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PipelineConfig::default();
        config.apply_overrides(|key| match key {
            "TXPIPE_RPC_URL" => Some("http://127.0.0.1:8899".to_string()),
            "TXPIPE_QUOTE_API_KEY" => Some("secret".to_string()),
            "TXPIPE_LOG_JSON" => Some("true".to_string()),
            _ => None,
        });

        assert_eq!(config.rpc.url, "http://127.0.0.1:8899");
        assert_eq!(config.quote.api_key.as_deref(), Some("secret"));
        assert!(config.logging.json);
        assert_eq!(config.quote.api_url, "https://lite-api.jup.ag/swap/v1");
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = PipelineConfig::from_toml_str("[rpc\nurl=").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
