//! Continuous-refill token bucket.

use serde::{Deserialize, Serialize};

use super::limiter::Algorithm;
use super::rules::{RateLimitConfig, Strategy};

/// Token bucket state for one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBucketState {
    /// Available tokens, in `0.0..=burst_capacity`
    pub tokens: f64,
    /// When tokens were last added
    pub last_refill_millis: u64,
}

/// Token bucket engine.
///
/// The bucket starts full at `burst_capacity` and refills continuously at
/// `max_requests / window_ms` tokens per millisecond, never above
/// `burst_capacity`. Each admission consumes one whole token.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    config: RateLimitConfig,
    /// Tokens per millisecond
    refill_rate: f64,
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig) -> Self {
        // Must stay a float division; integer division zeroes the rate
        // whenever max_requests < window_ms.
        let refill_rate = config.max_requests() as f64 / config.window_ms() as f64;
        Self {
            config,
            refill_rate,
        }
    }

    /// Tokens added per millisecond.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    fn capacity(&self) -> f64 {
        self.config.burst_capacity() as f64
    }
}

impl Algorithm for TokenBucket {
    type State = TokenBucketState;

    const NAME: &'static str = "token_bucket";
    const NAMESPACE: &'static str = Strategy::TokenBucket.namespace();

    fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn initial_state(&self, now: u64) -> TokenBucketState {
        TokenBucketState {
            tokens: self.capacity(),
            last_refill_millis: now,
        }
    }

    fn refresh(&self, state: &mut TokenBucketState, now: u64) {
        // A clock that stalls or steps back adds nothing.
        let elapsed = match now.checked_sub(state.last_refill_millis) {
            Some(elapsed) if elapsed > 0 => elapsed,
            _ => return,
        };

        let refilled = state.tokens + elapsed as f64 * self.refill_rate;
        state.tokens = refilled.min(self.capacity());
        state.last_refill_millis = now;
    }

    fn try_acquire(&self, state: &mut TokenBucketState, now: u64) -> bool {
        self.refresh(state, now);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn remaining(&self, state: &TokenBucketState) -> u64 {
        state.tokens.max(0.0).floor() as u64
    }

    fn reset_after(&self, state: &TokenBucketState, _now: u64) -> u64 {
        if state.tokens >= 1.0 {
            return 0;
        }
        ((1.0 - state.tokens) / self.refill_rate).ceil() as u64
    }

    fn limit(&self) -> u64 {
        self.config.burst_capacity()
    }
}
