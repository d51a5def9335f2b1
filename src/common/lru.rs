/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::time::Instant;

use parking_lot::Mutex;

/// TTL-bounded LRU cache for TXT lookup results.
#[derive(Debug)]
pub(crate) struct TxtCache<V> {
    inner: Mutex<lru_cache::LruCache<String, CacheEntry<V>, ahash::RandomState>>,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    item: V,
    valid_until: Instant,
}

impl<V: Clone> TxtCache<V> {
    pub fn with_capacity(capacity: usize) -> Self {
        TxtCache {
            inner: Mutex::new(lru_cache::LruCache::with_hasher(
                capacity,
                ahash::RandomState::new(),
            )),
        }
    }

    pub fn get(&self, name: &str) -> Option<V> {
        let mut cache = self.inner.lock();
        let entry = cache.get_mut(name)?;
        if entry.valid_until >= Instant::now() {
            entry.item.clone().into()
        } else {
            cache.remove(name);
            None
        }
    }

    pub fn insert(&self, name: String, item: V, valid_until: Instant) -> V {
        self.inner.lock().insert(
            name,
            CacheEntry {
                item: item.clone(),
                valid_until,
            },
        );
        item
    }
}
