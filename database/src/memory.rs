use crate::DedupStore;
use async_trait::async_trait;
use reposter_core::CoreError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Process-local store. Everything is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let value = self.entries.read().await.get(key).cloned();
        debug!("GET {} -> {:?}", key, value);
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        debug!("SET {} = {}", key, value);
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    // Check and insert under one lock so concurrent sections cannot both win
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, CoreError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            debug!("SETNX {} skipped", key);
            return Ok(false);
        }
        debug!("SETNX {} = {}", key, value);
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }
}
