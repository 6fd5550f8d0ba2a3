//! Configuration for constructing a rate limiter.

use serde::{Deserialize, Serialize};

use crate::error::{RateKeeperError, Result};
use crate::ratelimit::RateLimit;

/// Top-level limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Master switch: when false, every evaluation is allowed without
    /// touching the store. Useful for deterministic testing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Prefix for all composite store keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Which store implementation to use.
    #[serde(default)]
    pub store: StoreConfig,

    /// Limits applied to every event, after any caller-supplied ones.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            key_prefix: default_key_prefix(),
            store: StoreConfig::default(),
            rules: Vec::new(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_key_prefix() -> String {
    "ratekeeper".to_string()
}

/// Store selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process store; each process enforces the full limit on its own.
    #[default]
    Memory,
    /// Redis-backed store shared across processes.
    Redis {
        /// Redis connection URL (e.g. "redis://127.0.0.1/")
        url: String,
    },
}

/// A declaratively configured rate limit rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Maximum number of events per period
    pub count: u32,
    /// Period length in seconds
    pub period_secs: i64,
    /// Optional name/description for this rule
    #[serde(default)]
    pub name: Option<String>,
}

impl RuleConfig {
    /// Build the runtime rule, validating count and period.
    pub fn to_limit(&self) -> Result<RateLimit> {
        let limit = RateLimit::new(self.count, chrono::Duration::seconds(self.period_secs))?;
        Ok(match &self.name {
            Some(name) => limit.with_name(name.clone()),
            None => limit,
        })
    }
}

impl LimiterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RateKeeperError::Config(format!("Failed to parse limiter config: {}", e)))
    }

    /// Build the configured default limits.
    pub fn default_limits(&self) -> Result<Vec<RateLimit>> {
        self.rules.iter().map(RuleConfig::to_limit).collect()
    }
}
