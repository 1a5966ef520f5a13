//! Reconciliation of local extension records against the remote entity set.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use tasksync_core::{
    BearerToken, CacheKey, ContainerId, ExtensionRecordId, OwnerId, RemoteEntityId, SyncResult,
};
use tasksync_store::ExtensionStore;

use crate::client::ResilientClient;
use crate::remote::{ContainerPage, EntityPage, RemoteRequest};
use crate::retry::RetryPolicy;

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub containers_scanned: usize,
    pub entities_seen: usize,
    pub deleted_count: usize,
}

/// Garbage-collects extension records whose remote entity has disappeared.
///
/// The one correctness property everything here bends around: deletion is
/// only permitted after the remote enumeration completed without an
/// unresolved error. A partial `valid_ids` set is never used to justify
/// deleting anything — under-listing caused by a transient failure must not
/// destroy live metadata.
///
/// Concurrent runs for the same owner are not mutually excluded here; the
/// caller serializes them (see [`ReconcileWorker`]).
///
/// [`ReconcileWorker`]: crate::worker::ReconcileWorker
pub struct ReconciliationJob<S: ExtensionStore> {
    client: Arc<ResilientClient>,
    store: Arc<S>,
    policy: RetryPolicy,
}

impl<S: ExtensionStore> ReconciliationJob<S> {
    pub fn new(client: Arc<ResilientClient>, store: Arc<S>) -> Self {
        Self {
            client,
            store,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Reconcile all extension records of `owner_id`.
    ///
    /// Any enumeration failure aborts the whole job before a single record
    /// is touched.
    pub async fn reconcile(
        &self,
        owner_id: OwnerId,
        credential: &BearerToken,
    ) -> SyncResult<ReconcileReport> {
        tracing::info!(owner = %owner_id, "starting reconciliation");

        let mut report = ReconcileReport::default();
        let mut valid_ids: HashSet<RemoteEntityId> = HashSet::new();

        let containers = self.enumerate_containers(owner_id, credential).await?;
        report.containers_scanned = containers.len();

        for container in &containers {
            let entities = self
                .enumerate_entities(owner_id, container, credential, &mut valid_ids)
                .await?;
            tracing::debug!(
                owner = %owner_id,
                container = %container,
                entities,
                "container enumerated"
            );
        }
        report.entities_seen = valid_ids.len();

        // Enumeration is complete; only now is deletion on the table.
        let records = self.store.find_by_owner(owner_id).await?;
        let orphans: Vec<ExtensionRecordId> = records
            .iter()
            .filter(|record| !valid_ids.contains(&record.remote_entity_id))
            .map(|record| record.id)
            .collect();

        if orphans.is_empty() {
            tracing::info!(
                owner = %owner_id,
                records = records.len(),
                "reconciliation complete, no orphans"
            );
            return Ok(report);
        }

        report.deleted_count = self.store.delete_many(owner_id, &orphans).await?;
        tracing::info!(
            owner = %owner_id,
            deleted = report.deleted_count,
            entities = report.entities_seen,
            "reconciliation complete"
        );

        Ok(report)
    }

    async fn enumerate_containers(
        &self,
        owner_id: OwnerId,
        credential: &BearerToken,
    ) -> SyncResult<Vec<ContainerId>> {
        let mut containers = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let key = CacheKey::containers(&owner_id, cursor.as_deref());
            let request = RemoteRequest::list_containers(credential, cursor.as_deref());
            let fetched = self
                .client
                .fetch_resource(&key, &request, &self.policy)
                .await?;

            let page = ContainerPage::from_payload(&fetched.payload)?;
            containers.extend(page.containers.into_iter().map(|c| c.id));

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(containers)
    }

    async fn enumerate_entities(
        &self,
        owner_id: OwnerId,
        container: &ContainerId,
        credential: &BearerToken,
        valid_ids: &mut HashSet<RemoteEntityId>,
    ) -> SyncResult<usize> {
        let mut seen = 0;
        let mut cursor: Option<String> = None;

        loop {
            let key = CacheKey::entities(&owner_id, container, cursor.as_deref());
            let request = RemoteRequest::list_entities(container, credential, cursor.as_deref());
            let fetched = self
                .client
                .fetch_resource(&key, &request, &self.policy)
                .await?;

            let page = EntityPage::from_payload(&fetched.payload)?;
            seen += page.entities.len();
            valid_ids.extend(page.entities.into_iter().map(|e| e.id));

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(seen)
    }
}
