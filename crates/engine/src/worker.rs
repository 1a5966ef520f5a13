//! Background worker for scheduled reconciliation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};

use tasksync_core::{BearerToken, OwnerId};
use tasksync_store::ExtensionStore;

use crate::reconcile::ReconciliationJob;

/// Periodically reconciles every registered owner.
///
/// Owners are processed sequentially on one task per tick, which keeps
/// reconciliation runs serialized per owner — the engine itself does not
/// mutually exclude concurrent runs.
pub struct ReconcileWorker<S: ExtensionStore> {
    job: Arc<ReconciliationJob<S>>,
    interval: Duration,
    shutdown: Arc<Notify>,
    owners: Arc<RwLock<Vec<(OwnerId, BearerToken)>>>,
}

impl<S: ExtensionStore + 'static> ReconcileWorker<S> {
    pub fn new(job: Arc<ReconciliationJob<S>>, interval: Duration) -> Self {
        Self {
            job,
            interval,
            shutdown: Arc::new(Notify::new()),
            owners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register an owner for scheduled reconciliation, replacing a
    /// previously stored credential.
    pub async fn register_owner(&self, owner_id: OwnerId, credential: BearerToken) {
        let mut owners = self.owners.write().await;
        match owners.iter_mut().find(|(id, _)| *id == owner_id) {
            Some(entry) => entry.1 = credential,
            None => {
                owners.push((owner_id, credential));
                tracing::info!(owner = %owner_id, "registered owner for reconciliation");
            }
        }
    }

    /// Stop reconciling an owner.
    pub async fn deregister_owner(&self, owner_id: OwnerId) {
        let mut owners = self.owners.write().await;
        owners.retain(|(id, _)| *id != owner_id);
        tracing::info!(owner = %owner_id, "deregistered owner from reconciliation");
    }

    /// Request graceful shutdown of the worker task.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Spawn the worker loop.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let job = self.job.clone();
        let shutdown = self.shutdown.clone();
        let owners = self.owners.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "reconcile worker started");

            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            let mut consecutive_failures = 0u32;

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        tracing::info!("reconcile worker received shutdown signal");
                        break;
                    }
                    _ = tick.tick() => {
                        let registered = { owners.read().await.clone() };
                        if registered.is_empty() {
                            tracing::debug!("no owners registered, skipping tick");
                            continue;
                        }

                        for (owner_id, credential) in registered {
                            match job.reconcile(owner_id, &credential).await {
                                Ok(report) => {
                                    consecutive_failures = 0;
                                    if report.deleted_count > 0 {
                                        tracing::info!(
                                            owner = %owner_id,
                                            deleted = report.deleted_count,
                                            "scheduled reconciliation removed orphans"
                                        );
                                    }
                                }
                                Err(error) => {
                                    consecutive_failures += 1;
                                    tracing::warn!(
                                        owner = %owner_id,
                                        error = %error,
                                        consecutive_failures,
                                        "scheduled reconciliation failed"
                                    );
                                }
                            }
                        }
                    }
                }
            }

            tracing::info!("reconcile worker stopped");
        })
    }
}
