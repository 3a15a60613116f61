//! In-process limiter.

use std::sync::Arc;

use tracing::{debug, trace};

use super::limiter::{Algorithm, RateLimitStatus, RateLimiter};
use crate::clock::Clock;
use crate::store::MemoryStore;

/// Runs an [`Algorithm`] against state held in this process only.
///
/// State is keyed by client id in a sharded [`MemoryStore`], so each client's
/// read-modify-write is atomic and different clients do not contend on one
/// lock. This is what store-backed limiters fall back to; it is also a
/// complete limiter in its own right for single-instance deployments.
pub struct LocalRateLimiter<A: Algorithm> {
    algorithm: A,
    states: MemoryStore<A::State>,
    clock: Arc<dyn Clock>,
}

impl<A: Algorithm> LocalRateLimiter<A> {
    /// Create a limiter running `algorithm` with time from `clock`.
    pub fn new(algorithm: A, clock: Arc<dyn Clock>) -> Self {
        Self {
            algorithm,
            states: MemoryStore::new(clock.clone()),
            clock,
        }
    }

    /// The engine this limiter runs.
    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    /// Number of clients with state held, including not yet reclaimed ones.
    pub fn tracked_clients(&self) -> usize {
        self.states.len()
    }

    /// Drop state for clients idle longer than the window.
    pub fn purge_expired(&self) -> usize {
        self.states.purge_expired()
    }

    fn with_state<R>(&self, client_id: &str, mut apply: impl FnMut(&A, &mut A::State, u64) -> R) -> R
    where
        R: Default,
    {
        let now = self.clock.now_millis();
        let algorithm = &self.algorithm;
        let mut result = R::default();

        self.states.update(
            client_id,
            algorithm.state_ttl_millis(),
            &mut |state| result = apply(algorithm, state, now),
            &mut || {
                debug!(client_id = %client_id, algorithm = A::NAME, "Creating local limiter state");
                algorithm.initial_state(now)
            },
        );

        result
    }
}

impl<A: Algorithm> RateLimiter for LocalRateLimiter<A> {
    fn allow_request(&self, client_id: &str) -> bool {
        let allowed = self.with_state(client_id, |algorithm, state, now| {
            algorithm.try_acquire(state, now)
        });

        trace!(client_id = %client_id, algorithm = A::NAME, allowed, "Local admission");
        allowed
    }

    fn remaining_requests(&self, client_id: &str) -> u64 {
        self.with_state(client_id, |algorithm, state, now| {
            algorithm.refresh(state, now);
            algorithm.remaining(state)
        })
    }

    fn limit(&self, _client_id: &str) -> u64 {
        self.algorithm.limit()
    }

    fn reset(&self, client_id: &str) {
        self.states.delete(client_id);
    }

    fn reset_time_millis(&self, client_id: &str) -> u64 {
        self.with_state(client_id, |algorithm, state, now| {
            algorithm.refresh(state, now);
            algorithm.reset_after(state, now)
        })
    }

    fn check(&self, client_id: &str) -> RateLimitStatus {
        let (allowed, remaining, reset_after_ms) = self.with_state(client_id, |algorithm, state, now| {
            let allowed = algorithm.try_acquire(state, now);
            (allowed, algorithm.remaining(state), algorithm.reset_after(state, now))
        });

        RateLimitStatus {
            allowed,
            limit: self.algorithm.limit(),
            remaining,
            reset_after_ms,
        }
    }
}
