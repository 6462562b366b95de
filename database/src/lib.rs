//! Persistent dedup state.
//!
//! Post ids and fingerprints live in one key space. A post id maps to the
//! fingerprint computed for it, or to [`POISON`] when it could not be
//! processed; either way its presence means "never look at this post again".
//! A fingerprint maps to the reply text replayed on reposts, or to
//! [`POISON`] when it is blacklisted. Entries are never removed.

use async_trait::async_trait;
use reposter_core::{CoreError, Fingerprint, StoreBackend, StoreConfig, POISON};
use std::sync::Arc;

pub mod memory;
pub mod sqlite;


pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostStatus {
    Poisoned,
    Fingerprinted(Fingerprint),
    /// Seen, but the stored value is neither a fingerprint nor the sentinel.
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredReply {
    Blacklisted,
    Reply(String),
}

#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), CoreError>;

    /// Writes only when the key is missing. Returns whether it wrote.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, CoreError> {
        if self.get(key).await?.is_some() {
            return Ok(false);
        }
        self.set(key, value).await?;
        Ok(true)
    }

    async fn post_status(&self, post_id: &str) -> Result<Option<PostStatus>, CoreError> {
        let status = self.get(post_id).await?.map(|value| {
            if value == POISON {
                PostStatus::Poisoned
            } else {
                match Fingerprint::parse(&value) {
                    Some(fingerprint) => PostStatus::Fingerprinted(fingerprint),
                    None => PostStatus::Unrecognized(value),
                }
            }
        });
        Ok(status)
    }

    async fn poison_post(&self, post_id: &str) -> Result<(), CoreError> {
        self.set(post_id, POISON).await
    }

    async fn record_post(&self, post_id: &str, fingerprint: &Fingerprint) -> Result<(), CoreError> {
        self.set(post_id, fingerprint.as_str()).await
    }

    async fn reply_for(&self, fingerprint: &Fingerprint) -> Result<Option<StoredReply>, CoreError> {
        let reply = self.get(fingerprint.as_str()).await?.map(|value| {
            if value == POISON {
                StoredReply::Blacklisted
            } else {
                StoredReply::Reply(value)
            }
        });
        Ok(reply)
    }

    /// First reply stored for a fingerprint wins; later ones are dropped.
    async fn record_reply_once(
        &self,
        fingerprint: &Fingerprint,
        reply: &str,
    ) -> Result<bool, CoreError> {
        self.set_if_absent(fingerprint.as_str(), reply).await
    }

    /// Overwrites whatever reply the fingerprint had.
    async fn blacklist_fingerprint(&self, fingerprint: &Fingerprint) -> Result<(), CoreError> {
        self.set(fingerprint.as_str(), POISON).await
    }
}

pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn DedupStore>, CoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sqlite => Ok(Arc::new(SqliteStore::connect(&config.url).await?)),
    }
}
