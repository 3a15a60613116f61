//! Limiter for exempt routes and tiers.

use super::limiter::{RateLimiter, UNLIMITED};

/// Admits everything and reports unbounded capacity.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedRateLimiter;

impl RateLimiter for UnlimitedRateLimiter {
    fn allow_request(&self, _client_id: &str) -> bool {
        true
    }

    fn remaining_requests(&self, _client_id: &str) -> u64 {
        UNLIMITED
    }

    fn limit(&self, _client_id: &str) -> u64 {
        UNLIMITED
    }

    fn reset(&self, _client_id: &str) {}

    fn reset_time_millis(&self, _client_id: &str) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_admits() {
        let limiter = UnlimitedRateLimiter;
        for _ in 0..1_000 {
            assert!(limiter.allow_request("anyone"));
        }
        limiter.reset("anyone");

        let status = limiter.check("anyone");
        assert!(status.allowed);
        assert_eq!(status.limit, UNLIMITED);
        assert_eq!(status.remaining, UNLIMITED);
        assert_eq!(status.reset_after_ms, 0);
    }
}
