use crate::base::ParamKey;
use lru::LruCache;
use std::sync::{atomic::AtomicU64, Arc, RwLock};

/// ParamCounter keeps a counter per argument value.
/// Past its capacity, the least recently added or refreshed value is evicted.
#[derive(Debug)]
pub struct ParamCounter {
    cache: RwLock<LruCache<ParamKey, Arc<AtomicU64>>>,
}

impl ParamCounter {
    /// A zero capacity holds a single value.
    pub fn with_capacity(cap: usize) -> Self {
        ParamCounter {
            cache: RwLock::new(LruCache::new(cap.max(1))),
        }
    }

    pub fn cap(&self) -> usize {
        self.cache.read().unwrap().cap()
    }

    /// Inserts `value` for a new `key` and returns `None`,
    /// or refreshes an existing key and returns its counter untouched.
    pub fn add_if_absent(&self, key: &ParamKey, value: u64) -> Option<Arc<AtomicU64>> {
        let mut cache = self.cache.write().unwrap();
        if let Some(counter) = cache.get(key) {
            return Some(Arc::clone(counter));
        }
        cache.put(key.clone(), Arc::new(AtomicU64::new(value)));
        None
    }

    /// Looks the counter up without refreshing it.
    pub fn get(&self, key: &ParamKey) -> Option<Arc<AtomicU64>> {
        self.cache.read().unwrap().peek(key).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
