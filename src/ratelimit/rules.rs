//! Rate limit rules configuration.
//!
//! This module holds the immutable per-limiter [`RateLimitConfig`] and the
//! YAML rules format that assigns one config per client tier, optionally per
//! endpoint.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::info;

use super::tier::ClientTier;
use crate::error::{AdmissionError, Result};

/// Admission algorithm used by a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    TokenBucket,
    SlidingWindow,
    FixedWindow,
}

impl Strategy {
    /// Store key prefix for limiters using this strategy.
    pub const fn namespace(&self) -> &'static str {
        match self {
            Strategy::TokenBucket => "token-bucket:",
            Strategy::SlidingWindow => "sliding-window:",
            Strategy::FixedWindow => "fixed-window:",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::TokenBucket => "token_bucket",
            Strategy::SlidingWindow => "sliding_window",
            Strategy::FixedWindow => "fixed_window",
        };
        f.write_str(name)
    }
}

/// Limits for one limiter instance.
///
/// Built once at wiring time and shared read-only. `burst_capacity` only
/// matters to the token bucket and is never below `max_requests`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRateLimitConfig", into = "RawRateLimitConfig")]
pub struct RateLimitConfig {
    max_requests: u64,
    window_ms: u64,
    strategy: Strategy,
    burst_capacity: u64,
}

impl RateLimitConfig {
    /// Create a config whose burst capacity equals `max_requests`.
    pub fn new(max_requests: u64, window_ms: u64, strategy: Strategy) -> Result<Self> {
        Self::with_burst(max_requests, window_ms, strategy, max_requests)
    }

    /// Create a config with an explicit burst capacity.
    pub fn with_burst(
        max_requests: u64,
        window_ms: u64,
        strategy: Strategy,
        burst_capacity: u64,
    ) -> Result<Self> {
        if max_requests == 0 {
            return Err(AdmissionError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if window_ms == 0 {
            return Err(AdmissionError::Config(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        if burst_capacity < max_requests {
            return Err(AdmissionError::Config(format!(
                "burst_capacity ({}) must be at least max_requests ({})",
                burst_capacity, max_requests
            )));
        }

        Ok(Self {
            max_requests,
            window_ms,
            strategy,
            burst_capacity,
        })
    }

    /// 10 requests per second, token bucket.
    pub fn default_per_second() -> Self {
        Self::preset(10)
    }

    /// 100 requests per second, token bucket.
    pub fn lenient() -> Self {
        Self::preset(100)
    }

    /// 5 requests per second, token bucket.
    pub fn strict() -> Self {
        Self::preset(5)
    }

    fn preset(max_requests: u64) -> Self {
        Self {
            max_requests,
            window_ms: 1_000,
            strategy: Strategy::TokenBucket,
            burst_capacity: max_requests,
        }
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn burst_capacity(&self) -> u64 {
        self.burst_capacity
    }
}

/// Unvalidated wire form of [`RateLimitConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawRateLimitConfig {
    max_requests: u64,
    window_ms: u64,
    strategy: Strategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    burst_capacity: Option<u64>,
}

impl TryFrom<RawRateLimitConfig> for RateLimitConfig {
    type Error = AdmissionError;

    fn try_from(raw: RawRateLimitConfig) -> Result<Self> {
        let burst = raw.burst_capacity.unwrap_or(raw.max_requests);
        RateLimitConfig::with_burst(raw.max_requests, raw.window_ms, raw.strategy, burst)
    }
}

impl From<RateLimitConfig> for RawRateLimitConfig {
    fn from(config: RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window_ms: config.window_ms,
            strategy: config.strategy,
            burst_capacity: (config.burst_capacity != config.max_requests)
                .then_some(config.burst_capacity),
        }
    }
}

/// Marker for an exempt tier or endpoint, written as the string `unlimited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unlimited {
    Unlimited,
}

/// What a single tier gets: a bounded limiter or no limit at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LimitRule {
    Unlimited(Unlimited),
    Limited(RateLimitConfig),
}

impl LimitRule {
    /// The bounded config, if any.
    pub fn config(&self) -> Option<&RateLimitConfig> {
        match self {
            LimitRule::Limited(config) => Some(config),
            LimitRule::Unlimited(_) => None,
        }
    }
}

impl From<RateLimitConfig> for LimitRule {
    fn from(config: RateLimitConfig) -> Self {
        LimitRule::Limited(config)
    }
}

/// One rule per client tier. Every tier must be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRules {
    pub free: LimitRule,
    pub premium: LimitRule,
    pub enterprise: LimitRule,
}

impl TierRules {
    /// Free 10/s, Premium 100/s, Enterprise 1000/s, all token bucket.
    pub fn default_per_second() -> Self {
        Self {
            free: RateLimitConfig::preset(10).into(),
            premium: RateLimitConfig::preset(100).into(),
            enterprise: RateLimitConfig::preset(1_000).into(),
        }
    }

    /// The same rule for every tier.
    pub fn uniform(rule: LimitRule) -> Self {
        Self {
            free: rule,
            premium: rule,
            enterprise: rule,
        }
    }

    /// Rule for `tier`.
    pub fn rule_for(&self, tier: ClientTier) -> &LimitRule {
        match tier {
            ClientTier::Free => &self.free,
            ClientTier::Premium => &self.premium,
            ClientTier::Enterprise => &self.enterprise,
        }
    }
}

/// Complete rules: a default tier table plus per-endpoint overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Applies to any endpoint without its own entry
    pub default: TierRules,
    /// Endpoint-specific tier tables
    #[serde(default)]
    pub endpoints: HashMap<String, TierRules>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            default: TierRules::default_per_second(),
            endpoints: HashMap::new(),
        }
    }
}

impl RulesConfig {
    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| AdmissionError::Config(format!("Failed to parse rate limit rules: {}", e)))
    }

    /// Tier table for `endpoint`, or the default one.
    pub fn tiers_for(&self, endpoint: &str) -> &TierRules {
        self.endpoints.get(endpoint).unwrap_or(&self.default)
    }
}
