//! Store wrapper that fails on demand.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::info;

use super::{StateStore, StoreError};

/// Wraps a [`StateStore`] and makes it unavailable on request.
///
/// Used to exercise limiter fallback without a real network store. The
/// store can be toggled directly, or armed to start failing once a number of
/// operations have succeeded.
pub struct FaultInjectingStore<S> {
    inner: S,
    unavailable: AtomicBool,
    /// Operations left before the store trips; `u64::MAX` means disarmed.
    trip_after: AtomicU64,
}

impl<S> FaultInjectingStore<S> {
    /// Wrap `inner`, initially healthy.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            unavailable: AtomicBool::new(false),
            trip_after: AtomicU64::new(u64::MAX),
        }
    }

    /// Make every subsequent operation fail (`true`) or succeed (`false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        let was = self.unavailable.swap(unavailable, Ordering::SeqCst);
        if was != unavailable {
            info!(unavailable, "Fault injection toggled");
        }
        if !unavailable {
            self.trip_after.store(u64::MAX, Ordering::SeqCst);
        }
    }

    /// Let `operations` more operations succeed, then fail from then on.
    pub fn fail_after(&self, operations: u64) {
        if operations == 0 {
            self.set_unavailable(true);
        } else {
            self.trip_after.store(operations, Ordering::SeqCst);
        }
    }

    /// Whether operations currently fail.
    pub fn is_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.is_unavailable() {
            return Err(StoreError::Unavailable("injected fault".to_string()));
        }

        let armed = self
            .trip_after
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                u64::MAX => None,
                0 => Some(0),
                n => Some(n - 1),
            });

        match armed {
            // The counter was already exhausted: trip now.
            Ok(0) => {
                self.unavailable.store(true, Ordering::SeqCst);
                Err(StoreError::Unavailable("injected fault".to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl<V, S: StateStore<V>> StateStore<V> for FaultInjectingStore<S> {
    fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        self.check()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: V, ttl_millis: u64) -> Result<(), StoreError> {
        self.check()?;
        self.inner.set(key, value, ttl_millis)
    }

    fn compute(
        &self,
        key: &str,
        ttl_millis: u64,
        update: &mut dyn FnMut(&mut V),
        init: &mut dyn FnMut() -> V,
    ) -> Result<V, StoreError> {
        self.check()?;
        self.inner.compute(key, ttl_millis, update, init)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.check()?;
        self.inner.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn store() -> FaultInjectingStore<MemoryStore<u32>> {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
        FaultInjectingStore::new(MemoryStore::new(clock))
    }

    #[test]
    fn test_toggle_unavailable() {
        let store = store();
        store.set("a", 1, 0).unwrap();

        store.set_unavailable(true);
        assert!(matches!(store.get("a"), Err(StoreError::Unavailable(_))));
        assert!(store.remove("a").is_err());

        store.set_unavailable(false);
        assert_eq!(store.get("a").unwrap(), Some(1));
    }

    #[test]
    fn test_fail_after_operations() {
        let store = store();
        store.fail_after(2);

        assert!(store.set("a", 1, 0).is_ok());
        assert!(store.get("a").is_ok());
        assert!(store.get("a").is_err());
        assert!(store.is_unavailable());
    }

    #[test]
    fn test_fail_after_zero_trips_immediately() {
        let store = store();
        store.fail_after(0);
        assert!(store.get("a").is_err());
    }

    #[test]
    fn test_wraps_shared_store() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
        let shared = Arc::new(MemoryStore::<u32>::new(clock));
        let store = FaultInjectingStore::new(shared.clone());

        store.set("a", 7u32, 0).unwrap();
        assert_eq!(shared.peek("a"), Some(7));

        store.set_unavailable(true);
        assert!(store.get("a").is_err());
        assert_eq!(shared.peek("a"), Some(7));
    }
}
