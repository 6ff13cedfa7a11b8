//! Persistent cache mapping normalized chat identifiers to resolved entities and
//! member counts, grounded in `tg/chat_cache/__init__.py`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::rpc::ChatEntity;
use crate::storage::{BlobStore, BlobStoreError};
use crate::utils::url::ensure_at_single;

const CACHE_KEY: &str = ".chat_cache";

#[derive(Debug, Error)]
pub enum ChatCacheError {
    #[error("blob store error: {0}")]
    BlobStore(#[from] BlobStoreError),

    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCacheItem {
    pub chat_entity: ChatEntity,
    pub members_count: Option<u64>,
}

impl ChatCacheItem {
    pub fn new(chat_entity: ChatEntity) -> Self {
        Self {
            chat_entity,
            members_count: None,
        }
    }
}

/// `normalized_chat_id → ChatCacheItem`, persisted as one JSON blob.
pub struct ChatCache {
    store: Arc<dyn BlobStore>,
    items: HashMap<String, ChatCacheItem>,
}

impl ChatCache {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            items: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ChatCacheItem> {
        self.items.get(&ensure_at_single(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ChatCacheItem> {
        self.items.get_mut(&ensure_at_single(key))
    }

    pub fn set(&mut self, key: &str, value: ChatCacheItem) {
        self.items.insert(ensure_at_single(key), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(&ensure_at_single(key))
    }

    /// Loads the cache from the blob store. A missing blob is an empty cache, not
    /// an error.
    pub async fn load(&mut self) -> Result<(), ChatCacheError> {
        if !self.store.exists(CACHE_KEY).await {
            self.items = HashMap::new();
            return Ok(());
        }

        let raw = self.store.read(CACHE_KEY).await?;
        let loaded: HashMap<String, ChatCacheItem> = serde_json::from_str(&raw)?;

        // Re-normalize every key on load, matching the original's defensive pass.
        self.items = loaded
            .into_iter()
            .map(|(key, value)| (ensure_at_single(&key), value))
            .collect();

        debug!("Loaded {} chat cache entries", self.items.len());
        Ok(())
    }

    /// Atomically overwrites the single cache blob.
    pub async fn save(&self) -> Result<(), ChatCacheError> {
        let raw = serde_json::to_string(&self.items)?;
        self.store.write(CACHE_KEY, &raw).await?;
        debug!("Saved {} chat cache entries", self.items.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::ChatKind;
    use crate::storage::MemoryBlobStore;

    fn entity(id: i64) -> ChatEntity {
        ChatEntity {
            id,
            kind: ChatKind::Channel,
            raw: serde_json::json!({ "id": id }),
        }
    }

    #[tokio::test]
    async fn load_with_no_blob_is_empty() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let mut cache = ChatCache::new(store);
        cache.load().await.unwrap();
        assert!(!cache.contains("@x"));
    }

    #[tokio::test]
    async fn keys_are_normalized_on_every_access() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let mut cache = ChatCache::new(store);
        cache.set("SomeChannel", ChatCacheItem::new(entity(1)));

        assert!(cache.contains("somechannel"));
        assert!(cache.contains("@SOMECHANNEL"));
        assert_eq!(cache.get("@somechannel").unwrap().chat_entity.id, 1);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let mut cache = ChatCache::new(store.clone());
        cache.set("@x", ChatCacheItem::new(entity(42)));
        cache.save().await.unwrap();

        let mut reloaded = ChatCache::new(store);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.get("@x").unwrap().chat_entity.id, 42);
    }
}
