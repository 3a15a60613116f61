//! Limiter whose state lives in a shared store.
//!
//! Several admission control instances pointing at the same store enforce
//! one budget per client. When the store cannot be reached, each call is
//! served by a local limiter instead, so callers never see store failures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use super::limiter::{Algorithm, RateLimitStatus, RateLimiter};
use super::state::{LimiterState, StoredShape};
use crate::clock::Clock;
use crate::store::{StateStore, StoreError};

/// A store-backed limiter running `A`, falling back to a local limiter.
///
/// Client state is stored under `namespace + client_id` with a TTL of one
/// window. Read-only queries go through the same atomic compute as
/// admissions, so they observe the same lazily advanced state without
/// consuming capacity.
pub struct StoreBackedRateLimiter<A: Algorithm> {
    algorithm: A,
    store: Arc<dyn StateStore<LimiterState>>,
    fallback: Arc<dyn RateLimiter>,
    namespace: String,
    clock: Arc<dyn Clock>,
    /// Set while the last store call failed; used to log transitions once.
    degraded: AtomicBool,
}

impl<A: Algorithm> StoreBackedRateLimiter<A> {
    /// Create a limiter under the algorithm's default namespace.
    pub fn new(
        algorithm: A,
        store: Arc<dyn StateStore<LimiterState>>,
        fallback: Arc<dyn RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_namespace(algorithm, store, fallback, clock, A::NAMESPACE)
    }

    /// Create a limiter whose keys are prefixed with `namespace`.
    ///
    /// Limiters sharing a store must use distinct namespaces unless they are
    /// meant to share client budgets.
    pub fn with_namespace(
        algorithm: A,
        store: Arc<dyn StateStore<LimiterState>>,
        fallback: Arc<dyn RateLimiter>,
        clock: Arc<dyn Clock>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            algorithm,
            store,
            fallback,
            namespace: namespace.into(),
            clock,
            degraded: AtomicBool::new(false),
        }
    }

    /// Key prefix used in the store.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The engine this limiter runs.
    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    /// Whether the most recent store call failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn key_for(&self, client_id: &str) -> String {
        format!("{}{}", self.namespace, client_id)
    }

    /// Apply `apply` to the client's state inside one atomic store compute.
    fn update_state<R>(
        &self,
        client_id: &str,
        mut apply: impl FnMut(&A, &mut A::State, u64) -> R,
    ) -> Result<R, StoreError> {
        let key = self.key_for(client_id);
        let now = self.clock.now_millis();
        let algorithm = &self.algorithm;
        let mut result = None;

        self.store.compute(
            &key,
            algorithm.state_ttl_millis(),
            &mut |stored| {
                if A::State::from_stored(stored).is_none() {
                    warn!(
                        key = %key,
                        found = stored.kind(),
                        expected = A::NAME,
                        "Stored state has the wrong shape, re-initialising"
                    );
                    *stored = algorithm.initial_state(now).into_stored();
                }
                if let Some(state) = A::State::from_stored_mut(stored) {
                    result = Some(apply(algorithm, state, now));
                }
            },
            &mut || {
                debug!(key = %key, algorithm = A::NAME, "Creating shared limiter state");
                algorithm.initial_state(now).into_stored()
            },
        )?;

        self.mark_healthy();
        result.ok_or_else(|| StoreError::Unavailable("store skipped the update".to_string()))
    }

    fn mark_healthy(&self) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            info!(namespace = %self.namespace, "State store recovered, leaving local fallback");
        }
    }

    fn mark_degraded(&self, client_id: &str, operation: &'static str, err: &StoreError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(
                namespace = %self.namespace,
                error = %err,
                "State store unavailable, serving from local fallback"
            );
        }
        debug!(
            namespace = %self.namespace,
            client_id = %client_id,
            operation,
            "Falling back to local limiter"
        );
    }
}

impl<A: Algorithm> RateLimiter for StoreBackedRateLimiter<A> {
    fn allow_request(&self, client_id: &str) -> bool {
        match self.update_state(client_id, |algorithm, state, now| algorithm.try_acquire(state, now)) {
            Ok(allowed) => {
                trace!(
                    namespace = %self.namespace,
                    client_id = %client_id,
                    allowed,
                    "Shared admission"
                );
                if !allowed {
                    debug!(namespace = %self.namespace, client_id = %client_id, "Rate limit exceeded");
                }
                allowed
            }
            Err(err) => {
                self.mark_degraded(client_id, "allow_request", &err);
                self.fallback.allow_request(client_id)
            }
        }
    }

    fn remaining_requests(&self, client_id: &str) -> u64 {
        let remaining = self.update_state(client_id, |algorithm, state, now| {
            algorithm.refresh(state, now);
            algorithm.remaining(state)
        });

        match remaining {
            Ok(remaining) => remaining,
            Err(err) => {
                self.mark_degraded(client_id, "remaining_requests", &err);
                self.fallback.remaining_requests(client_id)
            }
        }
    }

    fn limit(&self, _client_id: &str) -> u64 {
        self.algorithm.limit()
    }

    fn reset(&self, client_id: &str) {
        if let Err(err) = self.store.remove(&self.key_for(client_id)) {
            self.mark_degraded(client_id, "reset", &err);
        }
        self.fallback.reset(client_id);
    }

    fn reset_time_millis(&self, client_id: &str) -> u64 {
        let reset_after = self.update_state(client_id, |algorithm, state, now| {
            algorithm.refresh(state, now);
            algorithm.reset_after(state, now)
        });

        match reset_after {
            Ok(reset_after) => reset_after,
            Err(err) => {
                self.mark_degraded(client_id, "reset_time_millis", &err);
                self.fallback.reset_time_millis(client_id)
            }
        }
    }

    fn check(&self, client_id: &str) -> RateLimitStatus {
        let outcome = self.update_state(client_id, |algorithm, state, now| {
            let allowed = algorithm.try_acquire(state, now);
            (allowed, algorithm.remaining(state), algorithm.reset_after(state, now))
        });

        match outcome {
            Ok((allowed, remaining, reset_after_ms)) => RateLimitStatus {
                allowed,
                limit: self.algorithm.limit(),
                remaining,
                reset_after_ms,
            },
            Err(err) => {
                self.mark_degraded(client_id, "check", &err);
                self.fallback.check(client_id)
            }
        }
    }
}
