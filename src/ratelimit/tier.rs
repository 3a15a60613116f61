//! Client tiers and tier-aware dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::limiter::RateLimiter;
use crate::error::{AdmissionError, Result};

/// Subscription tier of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientTier {
    Free,
    Premium,
    Enterprise,
}

impl ClientTier {
    /// Every tier, in ascending order.
    pub const ALL: [ClientTier; 3] = [ClientTier::Free, ClientTier::Premium, ClientTier::Enterprise];

    fn index(self) -> usize {
        match self {
            ClientTier::Free => 0,
            ClientTier::Premium => 1,
            ClientTier::Enterprise => 2,
        }
    }
}

impl fmt::Display for ClientTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientTier::Free => "free",
            ClientTier::Premium => "premium",
            ClientTier::Enterprise => "enterprise",
        };
        f.write_str(name)
    }
}

/// Looks up the tier of a client. Called on every request, so it must be cheap.
pub trait TierResolver: Send + Sync {
    fn resolve_tier(&self, client_id: &str) -> ClientTier;
}

/// Tier assignments held in memory, with a default for unknown clients.
pub struct InMemoryTierResolver {
    tiers: RwLock<HashMap<String, ClientTier>>,
    default_tier: ClientTier,
}

impl InMemoryTierResolver {
    pub fn new(default_tier: ClientTier) -> Self {
        Self {
            tiers: RwLock::new(HashMap::new()),
            default_tier,
        }
    }

    /// Create a resolver pre-populated with `assignments`.
    pub fn with_assignments(
        default_tier: ClientTier,
        assignments: impl IntoIterator<Item = (String, ClientTier)>,
    ) -> Self {
        Self {
            tiers: RwLock::new(assignments.into_iter().collect()),
            default_tier,
        }
    }

    /// Assign `tier` to `client_id`, replacing any previous assignment.
    pub fn set_tier(&self, client_id: impl Into<String>, tier: ClientTier) {
        self.tiers.write().insert(client_id.into(), tier);
    }
}

impl TierResolver for InMemoryTierResolver {
    fn resolve_tier(&self, client_id: &str) -> ClientTier {
        self.tiers
            .read()
            .get(client_id)
            .copied()
            .unwrap_or(self.default_tier)
    }
}

/// Dispatches each call to the limiter configured for the client's tier.
///
/// Tiers are a closed set, so every tier must have a limiter; a missing one
/// is a wiring bug and is rejected when the composition is built.
pub struct TieredRateLimiter {
    resolver: Arc<dyn TierResolver>,
    limiters: [Arc<dyn RateLimiter>; 3],
}

impl TieredRateLimiter {
    /// Build from one limiter per tier.
    ///
    /// Fails with [`AdmissionError::UnconfiguredTier`] if any tier is missing.
    pub fn new(
        resolver: Arc<dyn TierResolver>,
        mut limiters: HashMap<ClientTier, Arc<dyn RateLimiter>>,
    ) -> Result<Self> {
        let mut take = |tier: ClientTier| {
            limiters
                .remove(&tier)
                .ok_or(AdmissionError::UnconfiguredTier(tier))
        };

        let limiters = [
            take(ClientTier::Free)?,
            take(ClientTier::Premium)?,
            take(ClientTier::Enterprise)?,
        ];

        Ok(Self { resolver, limiters })
    }

    /// The same limiter for every tier.
    pub fn uniform(resolver: Arc<dyn TierResolver>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            resolver,
            limiters: [limiter.clone(), limiter.clone(), limiter],
        }
    }

    /// Limiter serving `client_id`, chosen by its resolved tier.
    pub fn limiter_for(&self, client_id: &str) -> &dyn RateLimiter {
        let tier = self.resolver.resolve_tier(client_id);
        trace!(client_id = %client_id, tier = %tier, "Resolved client tier");
        self.limiters[tier.index()].as_ref()
    }

    /// Limiter configured for `tier`.
    pub fn limiter_for_tier(&self, tier: ClientTier) -> &Arc<dyn RateLimiter> {
        &self.limiters[tier.index()]
    }
}

impl RateLimiter for TieredRateLimiter {
    fn allow_request(&self, client_id: &str) -> bool {
        self.limiter_for(client_id).allow_request(client_id)
    }

    fn remaining_requests(&self, client_id: &str) -> u64 {
        self.limiter_for(client_id).remaining_requests(client_id)
    }

    fn limit(&self, client_id: &str) -> u64 {
        self.limiter_for(client_id).limit(client_id)
    }

    fn reset(&self, client_id: &str) {
        self.limiter_for(client_id).reset(client_id)
    }

    fn reset_time_millis(&self, client_id: &str) -> u64 {
        self.limiter_for(client_id).reset_time_millis(client_id)
    }

    fn check(&self, client_id: &str) -> super::limiter::RateLimitStatus {
        // Resolve once so all fields describe the same limiter.
        self.limiter_for(client_id).check(client_id)
    }
}
