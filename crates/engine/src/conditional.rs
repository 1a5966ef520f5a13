//! Version-token conditional caching around remote reads.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value;

use tasksync_core::{CacheKey, SyncError, SyncResult, VersionToken};

use crate::remote::RemoteResponse;

/// A stored revision: the token the remote issued and the payload it
/// covers. The token only ever changes alongside fresh payload data.
#[derive(Debug, Clone)]
struct CachedRevision {
    token: VersionToken,
    payload: Value,
    fetched_at: DateTime<Utc>,
}

/// Result of a conditional read.
#[derive(Debug, Clone)]
pub struct ConditionalFetch {
    pub payload: Value,
    /// False when the remote answered "unchanged" for the stored token.
    pub changed: bool,
}

/// Conditional read-through cache keyed by [`CacheKey`].
///
/// An explicit store object: construct one at startup and inject it where
/// needed, so tests get isolated instances and nothing hides in module
/// state. A missing entry is not an error; the read simply goes out
/// unconditioned.
#[derive(Debug, Default)]
pub struct ConditionalCache {
    revisions: RwLock<HashMap<CacheKey, CachedRevision>>,
}

impl ConditionalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The version token currently stored for `key`.
    pub fn stored_token(&self, key: &CacheKey) -> Option<VersionToken> {
        let revisions = self.revisions.read().unwrap();
        revisions.get(key).map(|rev| rev.token.clone())
    }

    /// When the stored payload for `key` was last fetched.
    pub fn fetched_at(&self, key: &CacheKey) -> Option<DateTime<Utc>> {
        let revisions = self.revisions.read().unwrap();
        revisions.get(key).map(|rev| rev.fetched_at)
    }

    /// Run `remote_call` with the stored token for `key` as precondition.
    ///
    /// "Unchanged" short-circuits to the stored payload without any further
    /// deserialization. A fresh payload carrying a token replaces the
    /// stored revision; one without a token makes this a pure pass-through
    /// (nothing persists, every call reads as changed).
    pub async fn get<F, Fut>(&self, key: &CacheKey, remote_call: F) -> SyncResult<ConditionalFetch>
    where
        F: FnOnce(Option<VersionToken>) -> Fut,
        Fut: Future<Output = SyncResult<RemoteResponse>>,
    {
        // Token is cloned out so no lock is held across the await.
        let token = self.stored_token(key);

        match remote_call(token).await? {
            RemoteResponse::NotModified => {
                let revisions = self.revisions.read().unwrap();
                match revisions.get(key) {
                    Some(rev) => Ok(ConditionalFetch {
                        payload: rev.payload.clone(),
                        changed: false,
                    }),
                    // A 304 is only valid in reply to a precondition we
                    // sent, which requires a stored revision.
                    None => Err(SyncError::remote(
                        304,
                        "unchanged response without a stored revision",
                    )),
                }
            }
            RemoteResponse::Fresh {
                payload,
                version: Some(token),
            } => {
                tracing::debug!(key = %key, "storing fresh revision");
                let mut revisions = self.revisions.write().unwrap();
                revisions.insert(
                    key.clone(),
                    CachedRevision {
                        token,
                        payload: payload.clone(),
                        fetched_at: Utc::now(),
                    },
                );
                Ok(ConditionalFetch {
                    payload,
                    changed: true,
                })
            }
            RemoteResponse::Fresh {
                payload,
                version: None,
            } => Ok(ConditionalFetch {
                payload,
                changed: true,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> CacheKey {
        CacheKey::new("resource")
    }

    #[tokio::test]
    async fn first_read_sends_no_precondition_and_stores_the_token() {
        let cache = ConditionalCache::new();

        let fetch = cache
            .get(&key(), |precondition| async move {
                assert!(precondition.is_none());
                Ok(RemoteResponse::Fresh {
                    payload: json!({"value": 1}),
                    version: Some(VersionToken::new("v1")),
                })
            })
            .await
            .unwrap();

        assert!(fetch.changed);
        assert_eq!(fetch.payload, json!({"value": 1}));
        assert_eq!(cache.stored_token(&key()), Some(VersionToken::new("v1")));
    }

    #[tokio::test]
    async fn unchanged_short_circuits_to_the_stored_payload() {
        let cache = ConditionalCache::new();

        cache
            .get(&key(), |_| async move {
                Ok(RemoteResponse::Fresh {
                    payload: json!({"value": 1}),
                    version: Some(VersionToken::new("v1")),
                })
            })
            .await
            .unwrap();

        let second = cache
            .get(&key(), |precondition| async move {
                assert_eq!(precondition, Some(VersionToken::new("v1")));
                Ok(RemoteResponse::NotModified)
            })
            .await
            .unwrap();

        assert!(!second.changed);
        assert_eq!(second.payload, json!({"value": 1}));
    }

    #[tokio::test]
    async fn a_new_revision_replaces_payload_and_token() {
        let cache = ConditionalCache::new();

        for (value, version) in [(1, "v1"), (2, "v2")] {
            let fetch = cache
                .get(&key(), |_| async move {
                    Ok(RemoteResponse::Fresh {
                        payload: json!({"value": value}),
                        version: Some(VersionToken::new(version)),
                    })
                })
                .await
                .unwrap();
            assert!(fetch.changed);
        }

        assert_eq!(cache.stored_token(&key()), Some(VersionToken::new("v2")));
    }

    #[tokio::test]
    async fn tokenless_responses_pass_through_without_persisting() {
        let cache = ConditionalCache::new();

        for _ in 0..2 {
            let fetch = cache
                .get(&key(), |precondition| async move {
                    assert!(precondition.is_none());
                    Ok(RemoteResponse::Fresh {
                        payload: json!([1, 2]),
                        version: None,
                    })
                })
                .await
                .unwrap();
            assert!(fetch.changed);
        }

        assert_eq!(cache.stored_token(&key()), None);
    }

    #[tokio::test]
    async fn unchanged_without_a_stored_revision_is_a_remote_error() {
        let cache = ConditionalCache::new();

        let err = cache
            .get(&key(), |_| async move { Ok(RemoteResponse::NotModified) })
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Remote { status: 304, .. }));
    }

    #[tokio::test]
    async fn remote_failure_leaves_the_stored_revision_untouched() {
        let cache = ConditionalCache::new();

        cache
            .get(&key(), |_| async move {
                Ok(RemoteResponse::Fresh {
                    payload: json!({"value": 1}),
                    version: Some(VersionToken::new("v1")),
                })
            })
            .await
            .unwrap();

        let err = cache
            .get(&key(), |_| async move {
                Err(SyncError::remote(503, "unavailable"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Remote { status: 503, .. }));

        assert_eq!(cache.stored_token(&key()), Some(VersionToken::new("v1")));
    }
}
