//! In-memory [`CacheStore`] implementation for tests and embedding.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock` so prefix scans come back
//! sorted.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncResult;

use super::CacheStore;

/// In-memory cache for tests and ephemeral sessions.
pub struct InMemoryCache {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> SyncResult<Option<Value>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> SyncResult<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> SyncResult<Vec<String>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
