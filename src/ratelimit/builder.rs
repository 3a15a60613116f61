//! Wiring limiters from rules.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::distributed::StoreBackedRateLimiter;
use super::endpoint::EndpointTieredRateLimiter;
use super::fixed_window::FixedWindow;
use super::limiter::{Algorithm, RateLimiter};
use super::local::LocalRateLimiter;
use super::rules::{LimitRule, RateLimitConfig, RulesConfig, Strategy, TierRules};
use super::sliding_window::SlidingWindow;
use super::state::LimiterState;
use super::tier::{ClientTier, TierResolver, TieredRateLimiter};
use super::token_bucket::TokenBucket;
use super::unlimited::UnlimitedRateLimiter;
use crate::clock::Clock;
use crate::error::Result;
use crate::store::StateStore;

/// The tier table a tiered limiter serves, as recorded in its store namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// The table for endpoints without their own rules
    Default,
    /// The table of one named endpoint
    Endpoint(&'a str),
}

impl Scope<'_> {
    /// Namespace segment for this scope.
    ///
    /// Endpoint names are length-prefixed, so no endpoint string can produce
    /// the default segment or run into the tier and client that follow it.
    pub fn segment(&self) -> String {
        match self {
            Scope::Default => "default=:".to_string(),
            Scope::Endpoint(endpoint) => format!("ep={}:{}:", endpoint.len(), endpoint),
        }
    }
}

/// Shared inputs for every limiter built from one rules file.
#[derive(Clone)]
pub struct LimiterFactory {
    store: Arc<dyn StateStore<LimiterState>>,
    clock: Arc<dyn Clock>,
}

impl LimiterFactory {
    pub fn new(store: Arc<dyn StateStore<LimiterState>>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// A store-backed limiter for `config`, with a local fallback running the
    /// same algorithm.
    ///
    /// `scope` is appended to the strategy namespace so that limiters with
    /// different rules never share keys.
    pub fn limiter(&self, config: RateLimitConfig, scope: &str) -> Arc<dyn RateLimiter> {
        let namespace = format!("{}{}", config.strategy().namespace(), scope);
        match config.strategy() {
            Strategy::TokenBucket => self.store_backed(TokenBucket::new(config), namespace),
            Strategy::SlidingWindow => self.store_backed(SlidingWindow::new(config), namespace),
            Strategy::FixedWindow => self.store_backed(FixedWindow::new(config), namespace),
        }
    }

    /// A limiter for `rule`; unlimited rules need no state.
    pub fn rule(&self, rule: &LimitRule, scope: &str) -> Arc<dyn RateLimiter> {
        match rule.config() {
            Some(config) => self.limiter(*config, scope),
            None => Arc::new(UnlimitedRateLimiter),
        }
    }

    /// One limiter per tier behind `resolver`.
    ///
    /// Keys look like `fixed-window:ep=7:/search:free:<client>`. Tier names
    /// never contain `:`, so everything after the tier is the client id.
    pub fn tiered(
        &self,
        rules: &TierRules,
        resolver: Arc<dyn TierResolver>,
        scope: Scope<'_>,
    ) -> Result<TieredRateLimiter> {
        let segment = scope.segment();
        let limiters: HashMap<ClientTier, Arc<dyn RateLimiter>> = ClientTier::ALL
            .iter()
            .map(|&tier| {
                let tier_scope = format!("{}{}:", segment, tier);
                (tier, self.rule(rules.rule_for(tier), &tier_scope))
            })
            .collect();

        TieredRateLimiter::new(resolver, limiters)
    }

    /// The full endpoint and tier composition described by `rules`.
    pub fn endpoint_tiered(
        &self,
        rules: &RulesConfig,
        resolver: Arc<dyn TierResolver>,
    ) -> Result<EndpointTieredRateLimiter> {
        let mut endpoints: HashMap<String, Arc<dyn RateLimiter>> = HashMap::new();
        for (endpoint, tiers) in &rules.endpoints {
            let limiter = self.tiered(tiers, resolver.clone(), Scope::Endpoint(endpoint))?;
            endpoints.insert(endpoint.clone(), Arc::new(limiter));
        }

        let default = Arc::new(self.tiered(&rules.default, resolver, Scope::Default)?);

        info!(endpoints = endpoints.len(), "Built endpoint rate limiters");
        Ok(EndpointTieredRateLimiter::new(endpoints, default))
    }

    fn store_backed<A>(&self, algorithm: A, namespace: String) -> Arc<dyn RateLimiter>
    where
        A: Algorithm + Clone + 'static,
    {
        let fallback = Arc::new(LocalRateLimiter::new(algorithm.clone(), self.clock.clone()));
        Arc::new(StoreBackedRateLimiter::with_namespace(
            algorithm,
            self.store.clone(),
            fallback,
            self.clock.clone(),
            namespace,
        ))
    }
}
