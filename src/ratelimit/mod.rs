//! Rate limiting engines, adapters and compositions.

mod builder;
mod distributed;
mod endpoint;
mod fixed_window;
mod limiter;
mod local;
mod rules;
mod sliding_window;
mod state;
mod tier;
mod token_bucket;
mod unlimited;

pub use builder::{LimiterFactory, Scope};
pub use distributed::StoreBackedRateLimiter;
pub use endpoint::{EndpointRateLimiter, EndpointTieredRateLimiter, ForEndpoint};
pub use fixed_window::{FixedWindow, FixedWindowState};
pub use limiter::{Algorithm, RateLimitStatus, RateLimiter, UNLIMITED};
pub use local::LocalRateLimiter;
pub use rules::{LimitRule, RateLimitConfig, RulesConfig, Strategy, TierRules, Unlimited};
pub use sliding_window::{SlidingWindow, SlidingWindowState};
pub use state::{LimiterState, StoredShape};
pub use tier::{ClientTier, InMemoryTierResolver, TierResolver, TieredRateLimiter};
pub use token_bucket::{TokenBucket, TokenBucketState};
pub use unlimited::UnlimitedRateLimiter;
