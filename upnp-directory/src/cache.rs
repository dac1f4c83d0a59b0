//! Decoded-object cache
//!
//! Objects are keyed by `(filter, object id)`, since the filter decides
//! which properties a decoded object carries. An entry remembers the update
//! id its parent container had when the entry was built; once the parent's
//! counter moves on, or the entry outlives its TTL, a lookup misses and the
//! entry is dropped.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::object::DidlObject;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub filter: String,
    pub object_id: String,
}

impl CacheKey {
    pub fn new(filter: &str, object_id: &str) -> Self {
        Self {
            filter: filter.to_string(),
            object_id: object_id.to_string(),
        }
    }
}

struct CacheEntry {
    object: Arc<DidlObject>,
    parent_update_id: Option<u32>,
    inserted_at: Instant,
}

/// Hit/miss counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses caused by an advanced parent counter
    pub stale: u64,
    /// Misses caused by an expired TTL
    pub expired: u64,
}

/// LRU cache of decoded objects with a per-entry TTL
pub struct ObjectCache {
    inner: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
    stats: Mutex<CacheStats>,
}

impl ObjectCache {
    /// A capacity of zero is raised to one
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Look up `key`. `parent_counter` maps a parent container id to its
    /// current update id; an entry built under a different value is a miss.
    pub fn get<F>(&self, key: &CacheKey, now: Instant, parent_counter: F) -> Option<Arc<DidlObject>>
    where
        F: Fn(&str) -> Option<u32>,
    {
        let mut cache = self.inner.lock();
        let mut stats = self.stats.lock();

        let Some(entry) = cache.get(key) else {
            stats.misses += 1;
            return None;
        };

        if now.saturating_duration_since(entry.inserted_at) >= self.ttl {
            cache.pop(key);
            stats.misses += 1;
            stats.expired += 1;
            return None;
        }

        let current = parent_counter(entry.object.parent_id());
        if entry.parent_update_id != current {
            tracing::trace!(
                object = %key.object_id,
                cached = ?entry.parent_update_id,
                current = ?current,
                "cached object is stale"
            );
            cache.pop(key);
            stats.misses += 1;
            stats.stale += 1;
            return None;
        }

        stats.hits += 1;
        Some(Arc::clone(&entry.object))
    }

    pub fn insert(&self, key: CacheKey, object: Arc<DidlObject>, parent_update_id: Option<u32>, now: Instant) {
        self.inner.lock().put(
            key,
            CacheEntry {
                object,
                parent_update_id,
                inserted_at: now,
            },
        );
    }

    /// Cached object for `key`, or the one `build` produces, which is then
    /// cached under its parent's current counter.
    pub fn get_or_try_build<F, B, E>(
        &self,
        key: CacheKey,
        now: Instant,
        parent_counter: F,
        build: B,
    ) -> Result<Arc<DidlObject>, E>
    where
        F: Fn(&str) -> Option<u32>,
        B: FnOnce() -> Result<DidlObject, E>,
    {
        if let Some(hit) = self.get(&key, now, &parent_counter) {
            return Ok(hit);
        }
        let built = Arc::new(build()?);
        let parent_update_id = parent_counter(built.parent_id());
        self.insert(key, Arc::clone(&built), parent_update_id, now);
        Ok(built)
    }

    /// Drop every entry whose object sits in `container_id`
    pub fn invalidate_children(&self, container_id: &str) -> usize {
        let mut cache = self.inner.lock();
        let keys: Vec<CacheKey> = cache
            .iter()
            .filter(|(_, entry)| entry.object.parent_id() == container_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            cache.pop(key);
        }
        keys.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Item, ObjectBase};

    fn object(id: &str, parent: &str) -> Arc<DidlObject> {
        Arc::new(DidlObject::Item(Item {
            base: ObjectBase::new(id, parent, id, "object.item"),
            ref_id: None,
        }))
    }

    #[test]
    fn test_hit_requires_matching_parent_counter() {
        let cache = ObjectCache::new(8, Duration::from_secs(60));
        let now = Instant::now();
        let key = CacheKey::new("*", "t1");
        cache.insert(key.clone(), object("t1", "a1"), Some(3), now);

        assert!(cache.get(&key, now, |_| Some(3)).is_some());
        assert!(cache.get(&key, now, |_| Some(4)).is_none());
        // The stale entry is gone even if the old counter comes back
        assert!(cache.get(&key, now, |_| Some(3)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.stale, 1);
    }

    #[test]
    fn test_filter_is_part_of_key() {
        let cache = ObjectCache::new(8, Duration::from_secs(60));
        let now = Instant::now();
        cache.insert(CacheKey::new("*", "t1"), object("t1", "a1"), None, now);
        assert!(cache.get(&CacheKey::new("dc:title", "t1"), now, |_| None).is_none());
        assert!(cache.get(&CacheKey::new("*", "t1"), now, |_| None).is_some());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = ObjectCache::new(8, Duration::from_secs(10));
        let now = Instant::now();
        let key = CacheKey::new("*", "t1");
        cache.insert(key.clone(), object("t1", "a1"), None, now);

        assert!(cache.get(&key, now + Duration::from_secs(9), |_| None).is_some());
        assert!(cache.get(&key, now + Duration::from_secs(10), |_| None).is_none());
        assert_eq!(cache.stats().expired, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ObjectCache::new(2, Duration::from_secs(60));
        let now = Instant::now();
        for id in ["a", "b"] {
            cache.insert(CacheKey::new("*", id), object(id, "0"), None, now);
        }
        // Touch "a" so "b" is least recently used
        assert!(cache.get(&CacheKey::new("*", "a"), now, |_| None).is_some());
        cache.insert(CacheKey::new("*", "c"), object("c", "0"), None, now);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&CacheKey::new("*", "b"), now, |_| None).is_none());
        assert!(cache.get(&CacheKey::new("*", "a"), now, |_| None).is_some());
    }

    #[test]
    fn test_get_or_try_build() {
        let cache = ObjectCache::new(0, Duration::from_secs(60));
        let now = Instant::now();
        let key = CacheKey::new("*", "t1");

        let built: Result<_, String> = cache.get_or_try_build(key.clone(), now, |_| Some(1), || {
            Ok((*object("t1", "a1")).clone())
        });
        assert_eq!(built.unwrap().id(), "t1");

        let cached: Result<_, String> =
            cache.get_or_try_build(key.clone(), now, |_| Some(1), || Err("should not build".to_string()));
        assert!(cached.is_ok());

        let failed: Result<_, String> =
            cache.get_or_try_build(key, now, |_| Some(2), || Err("decode failed".to_string()));
        assert_eq!(failed.unwrap_err(), "decode failed");
    }

    #[test]
    fn test_invalidate_children() {
        let cache = ObjectCache::new(8, Duration::from_secs(60));
        let now = Instant::now();
        cache.insert(CacheKey::new("*", "t1"), object("t1", "a1"), None, now);
        cache.insert(CacheKey::new("*", "t2"), object("t2", "a1"), None, now);
        cache.insert(CacheKey::new("*", "a1"), object("a1", "0"), None, now);

        assert_eq!(cache.invalidate_children("a1"), 2);
        assert_eq!(cache.len(), 1);
    }
}
