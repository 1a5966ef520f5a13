//! Resilient retrieval: conditional read → bounded retries → fallback.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use tasksync_core::{CacheKey, SyncError, SyncResult};
use tasksync_store::FallbackStore;

use crate::conditional::ConditionalCache;
use crate::remote::{RemoteRequest, Transport};
use crate::retry::{RetryPolicy, execute_with_retry};

/// A successfully retrieved payload.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub payload: Value,
    /// False when the conditional read short-circuited on "unchanged".
    pub changed: bool,
    /// True when the payload came from the fallback store because the live
    /// retrieval chain failed.
    pub degraded: bool,
}

/// One retrieval call per logical resource key.
///
/// Composes the conditional cache, the retry executor and the fallback
/// store. Per-key calls are not serialized against each other: two
/// concurrent callers on the same key may each trigger a remote call
/// (no single-flight collapsing).
///
/// Construct one instance at application start and share it; both caches
/// are injected state, not globals.
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    conditional: ConditionalCache,
    fallback: Arc<dyn FallbackStore>,
    fallback_ttl: Option<Duration>,
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn Transport>, fallback: Arc<dyn FallbackStore>) -> Self {
        Self {
            transport,
            conditional: ConditionalCache::new(),
            fallback,
            // A stale payload a day old still beats an error page.
            fallback_ttl: Some(Duration::from_secs(24 * 60 * 60)),
        }
    }

    /// Override how long fallback entries stay usable. `None` disables
    /// expiry.
    pub fn with_fallback_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.fallback_ttl = ttl;
        self
    }

    /// Fetch one resource.
    ///
    /// On success the payload also refreshes the fallback store. If the
    /// retrieval chain fails — retries exhausted or a non-retryable remote
    /// failure — the fallback store is consulted and a hit is returned
    /// flagged as degraded; a miss re-raises the chain's error.
    ///
    /// Dropping the returned future aborts the fetch: no further retries
    /// are scheduled and neither cache is written.
    pub async fn fetch_resource(
        &self,
        key: &CacheKey,
        request: &RemoteRequest,
        policy: &RetryPolicy,
    ) -> SyncResult<FetchedResource> {
        if key.as_str().trim().is_empty() {
            return Err(SyncError::validation("cache key must not be empty"));
        }
        policy.validate()?;

        let transport = &self.transport;
        let chain = self
            .conditional
            .get(key, |precondition| async move {
                execute_with_retry(policy, |_| {
                    transport.execute(request, precondition.as_ref())
                })
                .await
            })
            .await;

        match chain {
            Ok(fetch) => {
                if let Err(error) = self
                    .fallback
                    .set(key, &fetch.payload, self.fallback_ttl)
                    .await
                {
                    tracing::warn!(key = %key, error = %error, "failed to refresh fallback entry");
                }
                Ok(FetchedResource {
                    payload: fetch.payload,
                    changed: fetch.changed,
                    degraded: false,
                })
            }
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "retrieval chain failed, consulting fallback");
                match self.fallback.get(key).await {
                    Ok(Some(payload)) => {
                        tracing::info!(key = %key, "serving stale payload from fallback store");
                        Ok(FetchedResource {
                            payload,
                            changed: true,
                            degraded: true,
                        })
                    }
                    Ok(None) => Err(error),
                    Err(store_error) => {
                        tracing::warn!(key = %key, error = %store_error, "fallback lookup failed");
                        Err(error)
                    }
                }
            }
        }
    }
}
