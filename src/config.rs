//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AdmissionError, Result};
use crate::ratelimit::{ClientTier, InMemoryTierResolver, RulesConfig};

/// Environment variable prefix, e.g. `TOLLGATE__LOGGING__LEVEL=debug`.
pub const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for a Tollgate process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Identifies this instance in logs
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// State store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Path to the rate limit rules file; built-in defaults when absent
    #[serde(default)]
    pub rules_path: Option<PathBuf>,

    /// Tier for clients without an assignment
    #[serde(default = "default_tier")]
    pub default_tier: ClientTier,

    /// Static client tier assignments
    #[serde(default)]
    pub clients: HashMap<String, ClientTier>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            instance_id: default_instance_id(),
            logging: LoggingConfig::default(),
            store: StoreConfig::default(),
            rules_path: None,
            default_tier: default_tier(),
            clients: HashMap::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// State store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How often the background sweeper drops expired entries
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

fn default_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_tier() -> ClientTier {
    ClientTier::Free
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sweep_interval() -> u64 {
    30_000
}

impl AppConfig {
    /// Load configuration from an optional YAML file, then `TOLLGATE__*`
    /// environment variables on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(AdmissionError::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }

        builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| AdmissionError::Config(e.to_string()))
    }

    /// Load the rules referenced by `rules_path`, or the built-in defaults.
    pub fn load_rules(&self) -> Result<RulesConfig> {
        match &self.rules_path {
            Some(path) => RulesConfig::from_file(path),
            None => Ok(RulesConfig::default()),
        }
    }

    /// A resolver seeded with the static client assignments.
    pub fn tier_resolver(&self) -> InMemoryTierResolver {
        InMemoryTierResolver::with_assignments(
            self.default_tier,
            self.clients.iter().map(|(client, tier)| (client.clone(), *tier)),
        )
    }
}
