//! Process-wide bounded FIFO stores: the query-result cache (`qr-` IDs) and
//! the visualization-spec store (`spec-` IDs). Both share the same eviction
//! policy, parameterized over the ID's prefix marker.

use crate::types::{IdPrefix, OpaqueId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A bounded FIFO keyed store. Insertion mints a fresh opaque ID; once at
/// capacity, the oldest entry is evicted to make room for the newest.
pub struct FifoStore<Prefix: IdPrefix, V> {
    capacity: usize,
    entries: Mutex<IndexMap<OpaqueId<Prefix>, V>>,
}

impl<Prefix: IdPrefix, V: Clone> FifoStore<Prefix, V> {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Mutex::new(IndexMap::new()) }
    }

    pub fn insert(&self, value: V) -> OpaqueId<Prefix> {
        let id = OpaqueId::generate();
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(id.clone(), value);
        id
    }

    pub fn get(&self, id: &OpaqueId<Prefix>) -> Option<V> {
        self.entries.lock().unwrap().get(id).cloned()
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

/// A cached query result (spec §3 `ResultCacheEntry`): the rows and column
/// order returned by `query_source`/`query_dsl`, plus the time it was cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultCacheEntry {
    pub columns: Vec<String>,
    pub rows: Vec<crate::contracts::Row>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<crate::contracts::QueryResult> for ResultCacheEntry {
    fn from(result: crate::contracts::QueryResult) -> Self {
        Self { columns: result.columns, rows: result.rows, created_at: chrono::Utc::now() }
    }
}

pub mod result_cache {
    use super::{FifoStore, ResultCacheEntry};
    use crate::types::ResultPrefix;

    pub type ResultCache = FifoStore<ResultPrefix, ResultCacheEntry>;

    pub const CAPACITY: usize = 20;

    pub fn new() -> ResultCache {
        ResultCache::new(CAPACITY)
    }
}

/// A cached visualization spec (spec §3 `SpecStoreEntry`): the recommended
/// spec, its ranked alternatives, and the time it was cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecStoreEntry {
    pub spec: crate::pattern::VisualizationSpec,
    pub alternatives: Vec<crate::pattern::VisualizationSpec>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub mod spec_store {
    use super::{FifoStore, SpecStoreEntry};
    use crate::types::SpecPrefix;

    pub type SpecStore = FifoStore<SpecPrefix, SpecStoreEntry>;

    pub const CAPACITY: usize = 20;

    pub fn new() -> SpecStore {
        SpecStore::new(CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResultPrefix;

    #[test]
    fn fifo_evicts_oldest_entry_beyond_capacity() {
        let store: FifoStore<ResultPrefix, i32> = FifoStore::new(2);
        let first = store.insert(1);
        let _second = store.insert(2);
        let _third = store.insert(3);

        assert_eq!(store.get(&first), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn get_returns_inserted_value() {
        let store: FifoStore<ResultPrefix, &str> = FifoStore::new(5);
        let id = store.insert("hello");
        assert_eq!(store.get(&id), Some("hello"));
    }

    #[test]
    fn clear_empties_store() {
        let store: FifoStore<ResultPrefix, i32> = FifoStore::new(5);
        store.insert(1);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn capacity_never_exceeded_across_many_inserts() {
        let store: FifoStore<ResultPrefix, i32> = FifoStore::new(20);
        for i in 0..100 {
            store.insert(i);
        }
        assert_eq!(store.len(), 20);
    }
}
