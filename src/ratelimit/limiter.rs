//! The limiter capability shared by engines, adapters and compositions.

use serde::{Deserialize, Serialize};

use super::rules::RateLimitConfig;
use super::state::StoredShape;

/// Sentinel limit/remaining value for limiters that never deny.
pub const UNLIMITED: u64 = u64::MAX;

/// Outcome of one admission, with the metadata a front end renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Whether the request was admitted
    pub allowed: bool,
    /// Capacity of the limiter that decided
    pub limit: u64,
    /// Requests still available after this decision
    pub remaining: u64,
    /// Milliseconds until at least one request will be admitted again
    pub reset_after_ms: u64,
}

/// Uniform admission contract.
///
/// Implemented by local limiters, store-backed adapters and every
/// composition layer, so compositions nest without special cases.
/// Implementations must be callable concurrently from any thread.
pub trait RateLimiter: Send + Sync {
    /// Admit or reject the next unit of work for `client_id`.
    fn allow_request(&self, client_id: &str) -> bool;

    /// Requests `client_id` could make right now.
    fn remaining_requests(&self, client_id: &str) -> u64;

    /// Capacity applied to `client_id`, or [`UNLIMITED`].
    fn limit(&self, client_id: &str) -> u64;

    /// Forget all state for `client_id`, fully replenishing it.
    fn reset(&self, client_id: &str);

    /// Milliseconds until `client_id` can be admitted again; zero if it can now.
    fn reset_time_millis(&self, client_id: &str) -> u64;

    /// Run one admission and collect the metadata for it.
    ///
    /// The provided version makes one call per field, so under concurrent
    /// traffic on the same client `remaining` may already reflect other
    /// admissions. Limiters that own the state override it to read every
    /// field from the same update.
    fn check(&self, client_id: &str) -> RateLimitStatus {
        let allowed = self.allow_request(client_id);
        RateLimitStatus {
            allowed,
            limit: self.limit(client_id),
            remaining: self.remaining_requests(client_id),
            reset_after_ms: self.reset_time_millis(client_id),
        }
    }
}

impl<T: RateLimiter + ?Sized> RateLimiter for std::sync::Arc<T> {
    fn allow_request(&self, client_id: &str) -> bool {
        (**self).allow_request(client_id)
    }

    fn remaining_requests(&self, client_id: &str) -> u64 {
        (**self).remaining_requests(client_id)
    }

    fn limit(&self, client_id: &str) -> u64 {
        (**self).limit(client_id)
    }

    fn reset(&self, client_id: &str) {
        (**self).reset(client_id)
    }

    fn reset_time_millis(&self, client_id: &str) -> u64 {
        (**self).reset_time_millis(client_id)
    }

    fn check(&self, client_id: &str) -> RateLimitStatus {
        (**self).check(client_id)
    }
}

/// A pure admission algorithm over one state record per client.
///
/// Engines hold only their immutable config. State is handed to them for
/// the duration of one call, by a local map or by a shared store.
pub trait Algorithm: Send + Sync + 'static {
    /// Per-client state record.
    type State: StoredShape;

    /// Short name used in logs.
    const NAME: &'static str;

    /// Default store key prefix.
    const NAMESPACE: &'static str;

    /// Config this engine enforces.
    fn config(&self) -> &RateLimitConfig;

    /// State for a client seen for the first time at `now`.
    fn initial_state(&self, now: u64) -> Self::State;

    /// Advance time-dependent bookkeeping (refill, purge, window rotation)
    /// without consuming capacity.
    fn refresh(&self, state: &mut Self::State, now: u64);

    /// Refresh, then consume one unit if available. Returns whether it did.
    fn try_acquire(&self, state: &mut Self::State, now: u64) -> bool;

    /// Requests still available in a refreshed `state`.
    fn remaining(&self, state: &Self::State) -> u64;

    /// Milliseconds until a refreshed `state` admits again.
    fn reset_after(&self, state: &Self::State, now: u64) -> u64;

    /// Reported capacity.
    fn limit(&self) -> u64 {
        self.config().max_requests()
    }

    /// How long a client's state may sit untouched before it is dropped.
    fn state_ttl_millis(&self) -> u64 {
        self.config().window_ms()
    }
}
