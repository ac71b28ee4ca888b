//! Memoizing map: missing entries are computed on first access and never
//! recomputed or invalidated.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
pub struct TranslationCache<K, V> {
    entries: HashMap<K, V>,
    misses: u64,
}

impl<K: Eq + Hash, V> TranslationCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            misses: 0,
        }
    }

    /// Return the cached value for `key`, computing it with `resolve` on the
    /// first access. A failed resolution caches nothing.
    pub fn get_or_try_insert_with<Q, E>(
        &mut self,
        key: &Q,
        resolve: impl FnOnce(&Q) -> Result<V, E>,
    ) -> Result<&V, E>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        if !self.entries.contains_key(key) {
            let value = resolve(key)?;
            self.misses += 1;
            self.entries.insert(key.to_owned(), value);
        }
        Ok(&self.entries[key])
    }

    #[cfg(test)]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    /// Number of entries resolved so far.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V> Default for TranslationCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_once_per_key() {
        let mut cache: TranslationCache<String, String> = TranslationCache::new();
        let mut calls = 0;

        for _ in 0..3 {
            let value = cache
                .get_or_try_insert_with("/dev/input/event4", |host| {
                    calls += 1;
                    Ok::<_, ()>(host.replace("event4", "event2"))
                })
                .unwrap();
            assert_eq!(value, "/dev/input/event2");
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failure_not_cached() {
        let mut cache: TranslationCache<String, u32> = TranslationCache::new();
        let err = cache.get_or_try_insert_with("a", |_| Err("unresolved"));
        assert_eq!(err, Err("unresolved"));
        assert!(cache.is_empty());

        let ok = cache.get_or_try_insert_with("a", |_| Ok::<_, &str>(7)).copied();
        assert_eq!(ok, Ok(7));
        assert_eq!(cache.get("a"), Some(&7));
    }
}
