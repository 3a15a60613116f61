//! Per-client state records as they are held by a shared store.

use serde::{Deserialize, Serialize};

use super::fixed_window::FixedWindowState;
use super::sliding_window::SlidingWindowState;
use super::token_bucket::TokenBucketState;

/// The value type of a shared store: one variant per algorithm.
///
/// Namespaces keep algorithms apart, but a value of the wrong shape under a
/// key is still never reinterpreted as another algorithm's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LimiterState {
    TokenBucket(TokenBucketState),
    SlidingWindow(SlidingWindowState),
    FixedWindow(FixedWindowState),
}

impl LimiterState {
    /// Variant name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LimiterState::TokenBucket(_) => "token_bucket",
            LimiterState::SlidingWindow(_) => "sliding_window",
            LimiterState::FixedWindow(_) => "fixed_window",
        }
    }
}

/// A state record that can live inside a [`LimiterState`].
pub trait StoredShape: Clone + Send + Sync + 'static {
    /// Wrap into the shared variant.
    fn into_stored(self) -> LimiterState;

    /// Borrow the record if `stored` has this shape.
    fn from_stored(stored: &LimiterState) -> Option<&Self>;

    /// Mutably borrow the record if `stored` has this shape.
    fn from_stored_mut(stored: &mut LimiterState) -> Option<&mut Self>;
}

macro_rules! stored_shape {
    ($state:ty, $variant:ident) => {
        impl StoredShape for $state {
            fn into_stored(self) -> LimiterState {
                LimiterState::$variant(self)
            }

            fn from_stored(stored: &LimiterState) -> Option<&Self> {
                match stored {
                    LimiterState::$variant(state) => Some(state),
                    _ => None,
                }
            }

            fn from_stored_mut(stored: &mut LimiterState) -> Option<&mut Self> {
                match stored {
                    LimiterState::$variant(state) => Some(state),
                    _ => None,
                }
            }
        }
    };
}

stored_shape!(TokenBucketState, TokenBucket);
stored_shape!(SlidingWindowState, SlidingWindow);
stored_shape!(FixedWindowState, FixedWindow);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes_do_not_cross() {
        let stored = FixedWindowState {
            count: 3,
            window_start_millis: 1_000,
        }
        .into_stored();

        assert_eq!(stored.kind(), "fixed_window");
        assert!(FixedWindowState::from_stored(&stored).is_some());
        assert!(TokenBucketState::from_stored(&stored).is_none());
        assert!(SlidingWindowState::from_stored(&stored).is_none());
    }

    #[test]
    fn test_serialized_form_is_tagged() {
        let stored = TokenBucketState {
            tokens: 2.5,
            last_refill_millis: 42,
        }
        .into_stored();

        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["kind"], "token_bucket");
        assert_eq!(json["tokens"], 2.5);

        let back: LimiterState = serde_json::from_value(json).unwrap();
        assert_eq!(back, stored);
    }
}
