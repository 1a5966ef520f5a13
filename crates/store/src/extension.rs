//! Extension-record storage abstraction.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use tasksync_core::{ExtensionRecord, ExtensionRecordId, OwnerId, RemoteEntityId};

use crate::error::StoreError;

/// Storage for extension records.
///
/// Every operation is scoped by owner; an id list handed to [`delete_many`]
/// only ever removes records belonging to that owner, regardless of what the
/// caller passes in.
///
/// `delete_many` is one logical batch. The SQLite implementation issues a
/// single DELETE statement; other backends should do the same where the
/// engine can offer it.
///
/// [`delete_many`]: ExtensionStore::delete_many
#[async_trait]
pub trait ExtensionStore: Send + Sync {
    /// Insert a new record.
    async fn insert(&self, record: ExtensionRecord) -> Result<ExtensionRecordId, StoreError>;

    /// All records belonging to `owner_id`.
    async fn find_by_owner(&self, owner_id: OwnerId) -> Result<Vec<ExtensionRecord>, StoreError>;

    /// The record attached to one remote entity, if any.
    async fn find_by_entity(
        &self,
        owner_id: OwnerId,
        entity_id: &RemoteEntityId,
    ) -> Result<Option<ExtensionRecord>, StoreError>;

    /// Delete the given records in one batch, returning how many were
    /// removed. Ids not belonging to `owner_id` are skipped.
    async fn delete_many(
        &self,
        owner_id: OwnerId,
        ids: &[ExtensionRecordId],
    ) -> Result<usize, StoreError>;

    /// Delete the record attached to one remote entity (direct user
    /// deletion), returning how many were removed.
    async fn delete_by_entity(
        &self,
        owner_id: OwnerId,
        entity_id: &RemoteEntityId,
    ) -> Result<usize, StoreError>;
}

/// In-memory extension store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryExtensionStore {
    records: RwLock<HashMap<ExtensionRecordId, ExtensionRecord>>,
}

impl InMemoryExtensionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl ExtensionStore for InMemoryExtensionStore {
    async fn insert(&self, record: ExtensionRecord) -> Result<ExtensionRecordId, StoreError> {
        let mut records = self.records.write().unwrap();
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        let id = record.id;
        records.insert(id, record);
        Ok(id)
    }

    async fn find_by_owner(&self, owner_id: OwnerId) -> Result<Vec<ExtensionRecord>, StoreError> {
        let records = self.records.read().unwrap();
        let mut matching: Vec<_> = records
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        Ok(matching)
    }

    async fn find_by_entity(
        &self,
        owner_id: OwnerId,
        entity_id: &RemoteEntityId,
    ) -> Result<Option<ExtensionRecord>, StoreError> {
        let records = self.records.read().unwrap();
        Ok(records
            .values()
            .find(|r| r.owner_id == owner_id && &r.remote_entity_id == entity_id)
            .cloned())
    }

    async fn delete_many(
        &self,
        owner_id: OwnerId,
        ids: &[ExtensionRecordId],
    ) -> Result<usize, StoreError> {
        let mut records = self.records.write().unwrap();
        let mut deleted = 0;
        for id in ids {
            if records.get(id).is_some_and(|r| r.owner_id == owner_id) {
                records.remove(id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn delete_by_entity(
        &self,
        owner_id: OwnerId,
        entity_id: &RemoteEntityId,
    ) -> Result<usize, StoreError> {
        let mut records = self.records.write().unwrap();
        let matching: Vec<ExtensionRecordId> = records
            .values()
            .filter(|r| r.owner_id == owner_id && &r.remote_entity_id == entity_id)
            .map(|r| r.id)
            .collect();
        for id in &matching {
            records.remove(id);
        }
        Ok(matching.len())
    }
}
