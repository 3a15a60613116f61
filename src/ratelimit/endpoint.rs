//! Endpoint-aware dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::limiter::{RateLimitStatus, RateLimiter};

/// The limiter contract with an endpoint alongside the client id.
pub trait EndpointRateLimiter: Send + Sync {
    fn allow_request(&self, client_id: &str, endpoint: &str) -> bool;

    fn remaining_requests(&self, client_id: &str, endpoint: &str) -> u64;

    fn limit(&self, client_id: &str, endpoint: &str) -> u64;

    fn reset(&self, client_id: &str, endpoint: &str);

    fn reset_time_millis(&self, client_id: &str, endpoint: &str) -> u64;

    /// Run one admission and collect the metadata for it.
    fn check(&self, client_id: &str, endpoint: &str) -> RateLimitStatus {
        let allowed = self.allow_request(client_id, endpoint);
        RateLimitStatus {
            allowed,
            limit: self.limit(client_id, endpoint),
            remaining: self.remaining_requests(client_id, endpoint),
            reset_after_ms: self.reset_time_millis(client_id, endpoint),
        }
    }
}

/// Routes each call to the limiter registered for its endpoint.
///
/// Endpoints are an open set: anything without its own limiter is served by
/// the default. Registered limiters are usually [`TieredRateLimiter`]s, but any
/// [`RateLimiter`] works, e.g. an [`UnlimitedRateLimiter`] for health checks.
///
/// [`TieredRateLimiter`]: super::TieredRateLimiter
/// [`UnlimitedRateLimiter`]: super::UnlimitedRateLimiter
pub struct EndpointTieredRateLimiter {
    endpoints: HashMap<String, Arc<dyn RateLimiter>>,
    default: Arc<dyn RateLimiter>,
}

impl EndpointTieredRateLimiter {
    pub fn new(endpoints: HashMap<String, Arc<dyn RateLimiter>>, default: Arc<dyn RateLimiter>) -> Self {
        Self { endpoints, default }
    }

    /// Limiter serving `endpoint`.
    pub fn limiter_for(&self, endpoint: &str) -> &dyn RateLimiter {
        match self.endpoints.get(endpoint) {
            Some(limiter) => limiter.as_ref(),
            None => {
                trace!(endpoint = %endpoint, "No endpoint-specific limiter, using default");
                self.default.as_ref()
            }
        }
    }

    /// Endpoints with their own limiter.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }
}

impl EndpointRateLimiter for EndpointTieredRateLimiter {
    fn allow_request(&self, client_id: &str, endpoint: &str) -> bool {
        self.limiter_for(endpoint).allow_request(client_id)
    }

    fn remaining_requests(&self, client_id: &str, endpoint: &str) -> u64 {
        self.limiter_for(endpoint).remaining_requests(client_id)
    }

    fn limit(&self, client_id: &str, endpoint: &str) -> u64 {
        self.limiter_for(endpoint).limit(client_id)
    }

    fn reset(&self, client_id: &str, endpoint: &str) {
        self.limiter_for(endpoint).reset(client_id)
    }

    fn reset_time_millis(&self, client_id: &str, endpoint: &str) -> u64 {
        self.limiter_for(endpoint).reset_time_millis(client_id)
    }

    fn check(&self, client_id: &str, endpoint: &str) -> RateLimitStatus {
        self.limiter_for(endpoint).check(client_id)
    }
}

/// Pins an [`EndpointRateLimiter`] to one endpoint, giving back the plain
/// [`RateLimiter`] contract so it can be nested inside other compositions.
pub struct ForEndpoint<E> {
    inner: E,
    endpoint: String,
}

impl<E: EndpointRateLimiter> ForEndpoint<E> {
    pub fn new(inner: E, endpoint: impl Into<String>) -> Self {
        Self {
            inner,
            endpoint: endpoint.into(),
        }
    }
}

impl<E: EndpointRateLimiter> RateLimiter for ForEndpoint<E> {
    fn allow_request(&self, client_id: &str) -> bool {
        self.inner.allow_request(client_id, &self.endpoint)
    }

    fn remaining_requests(&self, client_id: &str) -> u64 {
        self.inner.remaining_requests(client_id, &self.endpoint)
    }

    fn limit(&self, client_id: &str) -> u64 {
        self.inner.limit(client_id, &self.endpoint)
    }

    fn reset(&self, client_id: &str) {
        self.inner.reset(client_id, &self.endpoint)
    }

    fn reset_time_millis(&self, client_id: &str) -> u64 {
        self.inner.reset_time_millis(client_id, &self.endpoint)
    }
}

impl<E: EndpointRateLimiter + ?Sized> EndpointRateLimiter for Arc<E> {
    fn allow_request(&self, client_id: &str, endpoint: &str) -> bool {
        (**self).allow_request(client_id, endpoint)
    }

    fn remaining_requests(&self, client_id: &str, endpoint: &str) -> u64 {
        (**self).remaining_requests(client_id, endpoint)
    }

    fn limit(&self, client_id: &str, endpoint: &str) -> u64 {
        (**self).limit(client_id, endpoint)
    }

    fn reset(&self, client_id: &str, endpoint: &str) {
        (**self).reset(client_id, endpoint)
    }

    fn reset_time_millis(&self, client_id: &str, endpoint: &str) -> u64 {
        (**self).reset_time_millis(client_id, endpoint)
    }

    fn check(&self, client_id: &str, endpoint: &str) -> RateLimitStatus {
        (**self).check(client_id, endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::ratelimit::{
        ClientTier, InMemoryTierResolver, LimiterState, LocalRateLimiter, RateLimitConfig,
        StoreBackedRateLimiter, Strategy, TierResolver, TieredRateLimiter, TokenBucket,
        UnlimitedRateLimiter, UNLIMITED,
    };
    use crate::store::{MemoryStore, StateStore};

    struct Fixture {
        clock: Arc<dyn Clock>,
        store: Arc<dyn StateStore<LimiterState>>,
        resolver: Arc<dyn TierResolver>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
            Self {
                store: Arc::new(MemoryStore::<LimiterState>::new(clock.clone())),
                resolver: Arc::new(InMemoryTierResolver::new(ClientTier::Free)),
                clock,
            }
        }

        fn shared(&self, max: u64, namespace: &str) -> Arc<dyn RateLimiter> {
            let config = RateLimitConfig::new(max, 60_000, Strategy::TokenBucket).unwrap();
            let fallback = Arc::new(LocalRateLimiter::new(TokenBucket::new(config), self.clock.clone()));
            Arc::new(StoreBackedRateLimiter::with_namespace(
                TokenBucket::new(config),
                self.store.clone(),
                fallback,
                self.clock.clone(),
                format!("token-bucket:{}", namespace),
            ))
        }

        fn tiered(&self, base: u64, endpoint: &str) -> Arc<dyn RateLimiter> {
            let limiters = HashMap::from([
                (ClientTier::Free, self.shared(base, &format!("{}:free:", endpoint))),
                (ClientTier::Premium, self.shared(base * 10, &format!("{}:premium:", endpoint))),
                (
                    ClientTier::Enterprise,
                    self.shared(base * 100, &format!("{}:enterprise:", endpoint)),
                ),
            ]);
            Arc::new(TieredRateLimiter::new(self.resolver.clone(), limiters).unwrap())
        }

        fn limiter(&self) -> EndpointTieredRateLimiter {
            let endpoints = HashMap::from([
                ("/api/search".to_string(), self.tiered(5, "/api/search")),
                ("/api/users".to_string(), self.tiered(20, "/api/users")),
                (
                    "/api/health".to_string(),
                    Arc::new(UnlimitedRateLimiter) as Arc<dyn RateLimiter>,
                ),
            ]);
            EndpointTieredRateLimiter::new(endpoints, self.tiered(10, "default"))
        }
    }

    #[test]
    fn test_search_endpoint_limit() {
        let limiter = Fixture::new().limiter();
        for _ in 0..5 {
            assert!(limiter.allow_request("search-client", "/api/search"));
        }
        assert!(!limiter.allow_request("search-client", "/api/search"));
    }

    #[test]
    fn test_users_endpoint_limit() {
        let limiter = Fixture::new().limiter();
        for _ in 0..20 {
            assert!(limiter.allow_request("users-client", "/api/users"));
        }
        assert!(!limiter.allow_request("users-client", "/api/users"));
    }

    #[test]
    fn test_health_endpoint_unlimited() {
        let limiter = Fixture::new().limiter();
        for _ in 0..100 {
            assert!(limiter.allow_request("health-client", "/api/health"));
        }
        assert_eq!(limiter.limit("health-client", "/api/health"), UNLIMITED);
    }

    #[test]
    fn test_unknown_endpoint_uses_default() {
        let limiter = Fixture::new().limiter();
        for _ in 0..10 {
            assert!(limiter.allow_request("c", "/api/unknown"));
        }
        assert!(!limiter.allow_request("c", "/api/other-unknown"));
        assert_eq!(limiter.limit("c", "/nowhere"), 10);
    }

    #[test]
    fn test_endpoints_have_separate_budgets() {
        let limiter = Fixture::new().limiter();
        for _ in 0..5 {
            limiter.allow_request("c", "/api/search");
        }
        assert!(!limiter.allow_request("c", "/api/search"));
        assert_eq!(limiter.remaining_requests("c", "/api/users"), 20);
        assert!(limiter.allow_request("c", "/api/users"));
    }

    #[test]
    fn test_check_and_reset() {
        let limiter = Fixture::new().limiter();
        let status = limiter.check("c", "/api/search");
        assert!(status.allowed);
        assert_eq!(status.limit, 5);
        assert_eq!(status.remaining, 4);

        for _ in 0..4 {
            limiter.allow_request("c", "/api/search");
        }
        let status = limiter.check("c", "/api/search");
        assert!(!status.allowed);
        assert!(status.reset_after_ms > 0);

        limiter.reset("c", "/api/search");
        assert_eq!(limiter.remaining_requests("c", "/api/search"), 5);
    }

    #[test]
    fn test_pinned_endpoint_nests_as_rate_limiter() {
        let limiter = Arc::new(Fixture::new().limiter());
        let search: Arc<dyn RateLimiter> = Arc::new(ForEndpoint::new(limiter.clone(), "/api/search"));

        for _ in 0..5 {
            assert!(search.allow_request("nested"));
        }
        assert!(!search.allow_request("nested"));
        assert!(!limiter.allow_request("nested", "/api/search"));
    }
}
