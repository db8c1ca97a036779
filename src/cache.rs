//! Tag-indexed query-result cache.
//!
//! Mirrors the invalidation model the original UI relied on: every cached
//! read declares the tags it *provides*; every mutation declares the tags it
//! *invalidates*. Invalidating a tag evicts exactly the entries that provide
//! it, so the next read refetches. There is no TTL — server state only goes
//! stale through a mutation issued by this client.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Cache tags, one per backend entity family plus per-item variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Collections,
    Collection(String),
    DataSources,
    IngestionRuns(String),
    ChatModels,
    Apps,
    App(String),
}

struct Entry {
    value: Value,
    provides: Vec<Tag>,
}

/// In-memory response cache keyed by request identity.
#[derive(Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .map(|e| e.value.clone())
    }

    pub fn put(&self, key: impl Into<String>, provides: Vec<Tag>, value: Value) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.into(), Entry { value, provides });
    }

    /// Evict every entry providing any of `tags`. Returns the eviction count.
    pub fn invalidate(&self, tags: &[Tag]) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, e| !e.provides.iter().any(|p| tags.contains(p)));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
