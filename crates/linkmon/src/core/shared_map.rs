// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thread-safe keyed map with stable iteration order.
//!
//! Wraps a `BTreeMap` behind a single `parking_lot::Mutex`. The ordered
//! backing store matters: the link auditor and the connection manager both
//! scan this map, and handover must pick the same "first up" candidate on
//! every run.
//!
//! Iteration never escapes the lock. Callers either take a full
//! [`SharedMap::snapshot`] or run a closure over the entries via
//! [`SharedMap::for_each`] while the mutex is held.

use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Mutex-guarded ordered map shared across worker threads.
#[derive(Debug, Default)]
pub struct SharedMap<K, V> {
    inner: Mutex<BTreeMap<K, V>>,
}

impl<K: Ord + Clone, V: Clone> SharedMap<K, V> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    /// Insert or overwrite an entry.
    pub fn insert(&self, key: K, value: V) {
        self.inner.lock().insert(key, value);
    }

    /// Look up a single key, cloning the value out of the lock.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    /// Remove an entry. Returns true when the key was present.
    pub fn remove(&self, key: &K) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// True when the key is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Copy-under-lock: clone all entries in key order.
    ///
    /// Consumers that need consistency across multiple keys use this
    /// rather than a sequence of `get` calls.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.inner
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Run a closure over every entry while the mutex is held.
    pub fn for_each<F: FnMut(&K, &V)>(&self, mut f: F) {
        for (k, v) in self.inner.lock().iter() {
            f(k, v);
        }
    }

    /// Keys in iteration order.
    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().keys().cloned().collect()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
