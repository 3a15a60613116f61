//! In-process store backed by a sharded concurrent map.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use super::{StateStore, StoreError};
use crate::clock::Clock;

/// A stored value and the instant it stops being live.
#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    expires_at_millis: u64,
}

impl<V> Slot<V> {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at_millis > now
    }
}

/// In-memory [`StateStore`] with lazy expiry.
///
/// Entries live in a [`DashMap`], so a `compute` holds only the write lock of
/// the shard owning its key. Keys in other shards proceed in parallel.
/// Expired entries are reclaimed when next touched, by [`MemoryStore::purge_expired`]
/// or by [`MemoryStore::clear`].
pub struct MemoryStore<V> {
    entries: DashMap<String, Slot<V>>,
    clock: Arc<dyn Clock>,
}

impl<V: Clone + Send + Sync> MemoryStore<V> {
    /// Create an empty store reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Atomically update `key`. Infallible form of [`StateStore::compute`].
    pub fn update(
        &self,
        key: &str,
        ttl_millis: u64,
        update: &mut dyn FnMut(&mut V),
        init: &mut dyn FnMut() -> V,
    ) -> V {
        let now = self.clock.now_millis();
        let expires_at_millis = expiry(now, ttl_millis);

        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if !slot.is_live(now) {
                    trace!(key = %key, "Re-initialising expired entry");
                    slot.value = init();
                }
                update(&mut slot.value);
                slot.expires_at_millis = expires_at_millis;
                slot.value.clone()
            }
            Entry::Vacant(vacant) => {
                let mut value = init();
                update(&mut value);
                let slot = vacant.insert(Slot {
                    value,
                    expires_at_millis,
                });
                slot.value.clone()
            }
        }
    }

    /// Live value for `key`, reclaiming it if it has expired.
    pub fn peek(&self, key: &str) -> Option<V> {
        let now = self.clock.now_millis();
        if let Some(slot) = self.entries.get(key) {
            if slot.is_live(now) {
                return Some(slot.value.clone());
            }
        }
        // The read guard is gone; only drop the entry if it is still stale.
        self.entries.remove_if(key, |_, slot| !slot.is_live(now));
        None
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry whose expiry has passed. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, slot| slot.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries held, live or not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<V: Clone + Send + Sync> StateStore<V> for MemoryStore<V> {
    fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        Ok(self.peek(key))
    }

    fn set(&self, key: &str, value: V, ttl_millis: u64) -> Result<(), StoreError> {
        let expires_at_millis = expiry(self.clock.now_millis(), ttl_millis);
        self.entries.insert(
            key.to_owned(),
            Slot {
                value,
                expires_at_millis,
            },
        );
        Ok(())
    }

    fn compute(
        &self,
        key: &str,
        ttl_millis: u64,
        update: &mut dyn FnMut(&mut V),
        init: &mut dyn FnMut() -> V,
    ) -> Result<V, StoreError> {
        Ok(self.update(key, ttl_millis, update, init))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.delete(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        MemoryStore::clear(self);
        Ok(())
    }
}

fn expiry(now: u64, ttl_millis: u64) -> u64 {
    if ttl_millis == 0 {
        u64::MAX
    } else {
        now.saturating_add(ttl_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (Arc<ManualClock>, MemoryStore<u64>) {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = MemoryStore::new(clock.clone() as Arc<dyn Clock>);
        (clock, store)
    }

    fn increment(store: &MemoryStore<u64>, key: &str, ttl: u64) -> u64 {
        store
            .compute(key, ttl, &mut |v| *v += 1, &mut || 0)
            .unwrap()
    }

    #[test]
    fn test_compute_initialises_then_updates() {
        let (_clock, store) = store();

        assert_eq!(increment(&store, "a", 1_000), 1);
        assert_eq!(increment(&store, "a", 1_000), 2);
        assert_eq!(store.get("a").unwrap(), Some(2));
    }

    #[test]
    fn test_expired_entry_is_reinitialised() {
        let (clock, store) = store();

        increment(&store, "a", 1_000);
        increment(&store, "a", 1_000);

        clock.advance(1_000);
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(increment(&store, "a", 1_000), 1);
    }

    #[test]
    fn test_compute_refreshes_expiry() {
        let (clock, store) = store();

        increment(&store, "a", 1_000);
        clock.advance(900);
        increment(&store, "a", 1_000);
        clock.advance(900);

        // Second compute pushed expiry to 10_000 + 900 + 1_000.
        assert_eq!(store.get("a").unwrap(), Some(2));
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let (clock, store) = store();

        store.set("forever", 7, 0).unwrap();
        clock.advance(u32::MAX as u64);
        assert_eq!(store.get("forever").unwrap(), Some(7));
    }

    #[test]
    fn test_remove_and_clear() {
        let (clock, store) = store();

        store.set("a", 1, 1_000).unwrap();
        store.set("b", 2, 1_000).unwrap();
        store.set("c", 3, 1_000).unwrap();

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);

        // Removing an expired or missing key is fine.
        clock.advance(5_000);
        store.remove("b").unwrap();
        store.remove("missing").unwrap();

        StateStore::clear(&store).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let (clock, store) = store();

        store.set("short", 1, 100).unwrap();
        store.set("long", 2, 10_000).unwrap();
        clock.advance(500);

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long").unwrap(), Some(2));
    }

    #[test]
    fn test_concurrent_compute_loses_no_updates() {
        let (_clock, store) = store();
        let store = Arc::new(store);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let store = store.clone();
                scope.spawn(move || {
                    for i in 0..1_000 {
                        increment(&store, "shared", 60_000);
                        increment(&store, &format!("own-{}", i % 16), 60_000);
                    }
                });
            }
        });

        assert_eq!(store.get("shared").unwrap(), Some(8_000));
    }
}
