//! Shared collection abstractions used by the runtime caches.
//!
//! The default build uses `dashmap::DashMap` for concurrency.

use dashmap::DashMap;
use std::hash::Hash;

pub struct ConcurrentMap<K, V> {
    inner: DashMap<K, V>,
}

impl<K, V> Default for ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: dashmap::DashMap::new(),
        }
    }

    pub fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    /// Returns the published value for `key`, computing one with `make` if
    /// none exists. `make` runs outside the shard lock, so racing callers may
    /// each compute a candidate; all of them return the first one published.
    pub fn get_or_insert_with<F>(&self, key: K, make: F) -> V
    where
        V: Clone,
        F: FnOnce() -> V,
    {
        if let Some(existing) = self.inner.get(&key) {
            return existing.value().clone();
        }
        let candidate = make();
        self.inner.entry(key).or_insert(candidate).value().clone()
    }

    /// Fallible variant of [`ConcurrentMap::get_or_insert_with`]; failures
    /// are not cached.
    pub fn try_get_or_insert_with<F, E>(&self, key: K, make: F) -> Result<V, E>
    where
        V: Clone,
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(existing) = self.inner.get(&key) {
            return Ok(existing.value().clone());
        }
        let candidate = make()?;
        Ok(self.inner.entry(key).or_insert(candidate).value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn racing_inserts_converge_on_one_value() {
        let map: Arc<ConcurrentMap<u32, Arc<String>>> = Arc::new(ConcurrentMap::new());
        let handles = (0..8)
            .map(|i| {
                let map = map.clone();
                std::thread::spawn(move || map.get_or_insert_with(7, || Arc::new(format!("v{}", i))))
            })
            .collect::<Vec<_>>();
        let values = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();
        assert!(values.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn failed_computations_are_not_cached() {
        let map: ConcurrentMap<&str, u32> = ConcurrentMap::new();
        let failed: Result<u32, &str> = map.try_get_or_insert_with("k", || Err("boom"));
        assert!(failed.is_err());
        assert!(map.is_empty());
        assert_eq!(map.try_get_or_insert_with::<_, &str>("k", || Ok(3)), Ok(3));
    }
}
