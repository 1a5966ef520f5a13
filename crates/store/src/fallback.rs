//! Last-known-good payload store with TTL expiry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use tasksync_core::CacheKey;

use crate::error::StoreError;

/// Storage for last-known-good payloads.
///
/// Entries are written on every successful retrieval and consulted
/// exclusively from the failure path; a stored payload is never preferred
/// over a fresh success. An entry past its expiry is treated as absent on
/// read, with no active sweep.
#[async_trait]
pub trait FallbackStore: Send + Sync {
    /// Store `payload` under `key`. `ttl` of `None` means no expiry.
    async fn set(
        &self,
        key: &CacheKey,
        payload: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// The stored payload for `key`, or `None` when absent or expired.
    async fn get(&self, key: &CacheKey) -> Result<Option<Value>, StoreError>;
}

#[derive(Debug, Clone)]
struct FallbackEntry {
    payload: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl FallbackEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory fallback store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryFallbackStore {
    entries: RwLock<HashMap<CacheKey, FallbackEntry>>,
}

impl InMemoryFallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl FallbackStore for InMemoryFallbackStore {
    async fn set(
        &self,
        key: &CacheKey,
        payload: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let expires_at =
            ttl.map(|ttl| Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default());
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key.clone(),
            FallbackEntry {
                payload: payload.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.read().unwrap();
        let now = Utc::now();
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.payload.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn absent_key_reads_as_none() {
        let store = InMemoryFallbackStore::new();
        assert!(store.get(&CacheKey::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = InMemoryFallbackStore::new();
        let key = CacheKey::new("resource");
        let payload = json!({"items": [1, 2, 3]});

        store.set(&key, &payload, None).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let store = InMemoryFallbackStore::new();
        let key = CacheKey::new("resource");

        store
            .set(&key, &json!("stale"), Some(Duration::ZERO))
            .await
            .unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rewrite_refreshes_the_entry() {
        let store = InMemoryFallbackStore::new();
        let key = CacheKey::new("resource");

        store
            .set(&key, &json!("old"), Some(Duration::ZERO))
            .await
            .unwrap();
        store
            .set(&key, &json!("new"), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(store.get(&key).await.unwrap(), Some(json!("new")));
    }
}
