//! Key-value state store with atomic read-modify-write per key.
//!
//! The store stands in for a networked store shared by several admission
//! control instances. Limiters only mutate state through [`StateStore::compute`],
//! which runs as one atomic step per key.

mod fault;
mod memory;
mod sweeper;

pub use fault::FaultInjectingStore;
pub use memory::MemoryStore;
pub use sweeper::spawn_expiry_sweeper;

use thiserror::Error;

/// Errors that can occur in store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("State store unavailable: {0}")]
    Unavailable(String),
}

/// Per-key typed state with expiry.
///
/// A `ttl_millis` of zero means the entry never expires.
pub trait StateStore<V>: Send + Sync {
    /// Read the live value for `key`, if any.
    fn get(&self, key: &str) -> Result<Option<V>, StoreError>;

    /// Unconditionally replace the value for `key`.
    fn set(&self, key: &str, value: V, ttl_millis: u64) -> Result<(), StoreError>;

    /// Atomically update the value for `key` and return the new value.
    ///
    /// If no live entry exists, `init` produces the starting value. `update`
    /// then mutates it in place and the result is persisted with a refreshed
    /// expiry. Concurrent calls on the same key are serialized.
    fn compute(
        &self,
        key: &str,
        ttl_millis: u64,
        update: &mut dyn FnMut(&mut V),
        init: &mut dyn FnMut() -> V,
    ) -> Result<V, StoreError>;

    /// Delete `key`, expired or not.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Delete every entry.
    fn clear(&self) -> Result<(), StoreError>;
}

impl<V, S: StateStore<V> + ?Sized> StateStore<V> for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: V, ttl_millis: u64) -> Result<(), StoreError> {
        (**self).set(key, value, ttl_millis)
    }

    fn compute(
        &self,
        key: &str,
        ttl_millis: u64,
        update: &mut dyn FnMut(&mut V),
        init: &mut dyn FnMut() -> V,
    ) -> Result<V, StoreError> {
        (**self).compute(key, ttl_millis, update, init)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }
}
