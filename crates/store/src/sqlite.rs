//! SQLite-backed stores for durable deployments.
//!
//! Both stores initialize their connection pool lazily on first use and
//! keep timestamps as RFC 3339 text, so the database files stay inspectable
//! with any SQLite tooling.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use sqlx::error::ErrorKind;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use tokio::sync::Mutex;

use tasksync_core::{
    CacheKey, ExtensionRecord, ExtensionRecordId, OwnerId, Priority, RemoteEntityId,
};

use crate::error::StoreError;
use crate::extension::ExtensionStore;
use crate::fallback::FallbackStore;

async fn connect(db_path: &Path, schema: &str) -> anyhow::Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create store directory at {:?}", parent))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options)
        .await
        .with_context(|| format!("failed to open SQLite store at {:?}", db_path))?;

    sqlx::query(schema)
        .execute(&pool)
        .await
        .context("failed to create store schema")?;

    tracing::debug!(path = %db_path.display(), "opened SQLite store");
    Ok(pool)
}

fn storage(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(format!("{context}: {err}"))
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| storage(&format!("invalid {column} timestamp"), e))
}

/// SQLite-backed extension store.
///
/// Cheap to clone; clones share one lazily-initialized pool.
#[derive(Debug, Clone)]
pub struct SqliteExtensionStore {
    db_path: PathBuf,
    pool: Arc<Mutex<Option<SqlitePool>>>,
}

const EXTENSION_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS extension_records (
        id               TEXT PRIMARY KEY,
        owner_id         TEXT NOT NULL,
        remote_entity_id TEXT NOT NULL,
        priority         TEXT NULL,
        tags             TEXT NOT NULL,
        created_at       TEXT NOT NULL,
        updated_at       TEXT NOT NULL
    )
"#;

impl SqliteExtensionStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            pool: Arc::new(Mutex::new(None)),
        }
    }

    async fn get_pool(&self) -> Result<SqlitePool, StoreError> {
        let mut guard = self.pool.lock().await;
        if guard.is_none() {
            let pool = connect(&self.db_path, EXTENSION_SCHEMA)
                .await
                .map_err(|e| StoreError::Storage(format!("{e:#}")))?;
            *guard = Some(pool);
        }
        Ok(guard.as_ref().unwrap().clone())
    }

    fn decode_record(row: &SqliteRow) -> Result<ExtensionRecord, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| storage("failed to read id", e))?;
        let owner_id: String = row
            .try_get("owner_id")
            .map_err(|e| storage("failed to read owner_id", e))?;
        let remote_entity_id: String = row
            .try_get("remote_entity_id")
            .map_err(|e| storage("failed to read remote_entity_id", e))?;
        let priority: Option<String> = row
            .try_get("priority")
            .map_err(|e| storage("failed to read priority", e))?;
        let tags: String = row
            .try_get("tags")
            .map_err(|e| storage("failed to read tags", e))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| storage("failed to read created_at", e))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| storage("failed to read updated_at", e))?;

        Ok(ExtensionRecord {
            id: id
                .parse::<ExtensionRecordId>()
                .map_err(|e| storage("invalid record id", e))?,
            owner_id: owner_id
                .parse::<OwnerId>()
                .map_err(|e| storage("invalid owner id", e))?,
            remote_entity_id: RemoteEntityId::new(remote_entity_id),
            priority: priority
                .map(|p| p.parse::<Priority>())
                .transpose()
                .map_err(|e| storage("invalid priority", e))?,
            tags: serde_json::from_str(&tags).map_err(|e| storage("invalid tags", e))?,
            created_at: parse_timestamp(&created_at, "created_at")?,
            updated_at: parse_timestamp(&updated_at, "updated_at")?,
        })
    }
}

#[async_trait]
impl ExtensionStore for SqliteExtensionStore {
    async fn insert(&self, record: ExtensionRecord) -> Result<ExtensionRecordId, StoreError> {
        let pool = self.get_pool().await?;
        let tags = serde_json::to_string(&record.tags)
            .map_err(|e| storage("failed to serialize tags", e))?;

        sqlx::query(
            r#"
            INSERT INTO extension_records (
                id,
                owner_id,
                remote_entity_id,
                priority,
                tags,
                created_at,
                updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.owner_id.to_string())
        .bind(record.remote_entity_id.as_str())
        .bind(record.priority.map(|p| p.as_str()))
        .bind(&tags)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if matches!(db.kind(), ErrorKind::UniqueViolation) {
                    return StoreError::AlreadyExists(record.id);
                }
            }
            storage("failed to insert extension record", e)
        })?;

        Ok(record.id)
    }

    async fn find_by_owner(&self, owner_id: OwnerId) -> Result<Vec<ExtensionRecord>, StoreError> {
        let pool = self.get_pool().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, remote_entity_id, priority, tags, created_at, updated_at
            FROM extension_records
            WHERE owner_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_all(&pool)
        .await
        .map_err(|e| storage("failed to list extension records", e))?;

        rows.iter().map(Self::decode_record).collect()
    }

    async fn find_by_entity(
        &self,
        owner_id: OwnerId,
        entity_id: &RemoteEntityId,
    ) -> Result<Option<ExtensionRecord>, StoreError> {
        let pool = self.get_pool().await?;

        let row = sqlx::query(
            r#"
            SELECT id, owner_id, remote_entity_id, priority, tags, created_at, updated_at
            FROM extension_records
            WHERE owner_id = ?1
              AND remote_entity_id = ?2
            "#,
        )
        .bind(owner_id.to_string())
        .bind(entity_id.as_str())
        .fetch_optional(&pool)
        .await
        .map_err(|e| storage("failed to fetch extension record", e))?;

        row.as_ref().map(Self::decode_record).transpose()
    }

    async fn delete_many(
        &self,
        owner_id: OwnerId,
        ids: &[ExtensionRecordId],
    ) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let pool = self.get_pool().await?;

        // One statement, so the batch is applied atomically by SQLite.
        let placeholders = (0..ids.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "DELETE FROM extension_records WHERE owner_id = ?1 AND id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(owner_id.to_string());
        for id in ids {
            query = query.bind(id.to_string());
        }

        let result = query
            .execute(&pool)
            .await
            .map_err(|e| storage("failed to delete extension records", e))?;

        Ok(result.rows_affected() as usize)
    }

    async fn delete_by_entity(
        &self,
        owner_id: OwnerId,
        entity_id: &RemoteEntityId,
    ) -> Result<usize, StoreError> {
        let pool = self.get_pool().await?;

        let result = sqlx::query(
            r#"
            DELETE FROM extension_records
            WHERE owner_id = ?1
              AND remote_entity_id = ?2
            "#,
        )
        .bind(owner_id.to_string())
        .bind(entity_id.as_str())
        .execute(&pool)
        .await
        .map_err(|e| storage("failed to delete extension record", e))?;

        Ok(result.rows_affected() as usize)
    }
}

/// SQLite-backed fallback store.
#[derive(Debug, Clone)]
pub struct SqliteFallbackStore {
    db_path: PathBuf,
    pool: Arc<Mutex<Option<SqlitePool>>>,
}

const FALLBACK_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS fallback_cache (
        key        TEXT PRIMARY KEY,
        payload    TEXT NOT NULL,
        fetched_at TEXT NOT NULL,
        expires_at TEXT NULL
    )
"#;

impl SqliteFallbackStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            pool: Arc::new(Mutex::new(None)),
        }
    }

    async fn get_pool(&self) -> Result<SqlitePool, StoreError> {
        let mut guard = self.pool.lock().await;
        if guard.is_none() {
            let pool = connect(&self.db_path, FALLBACK_SCHEMA)
                .await
                .map_err(|e| StoreError::Storage(format!("{e:#}")))?;
            *guard = Some(pool);
        }
        Ok(guard.as_ref().unwrap().clone())
    }
}

#[async_trait]
impl FallbackStore for SqliteFallbackStore {
    async fn set(
        &self,
        key: &CacheKey,
        payload: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let pool = self.get_pool().await?;
        let now = Utc::now();
        let expires_at =
            ttl.map(|ttl| now + chrono::Duration::from_std(ttl).unwrap_or_default());

        sqlx::query(
            r#"
            INSERT INTO fallback_cache (key, payload, fetched_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key)
            DO UPDATE SET
                payload = excluded.payload,
                fetched_at = excluded.fetched_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key.as_str())
        .bind(payload.to_string())
        .bind(now.to_rfc3339())
        .bind(expires_at.map(|at| at.to_rfc3339()))
        .execute(&pool)
        .await
        .map_err(|e| storage("failed to upsert fallback entry", e))?;

        Ok(())
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Value>, StoreError> {
        let pool = self.get_pool().await?;

        let row = sqlx::query(
            r#"
            SELECT payload, expires_at
            FROM fallback_cache
            WHERE key = ?1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&pool)
        .await
        .map_err(|e| storage("failed to fetch fallback entry", e))?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let expires_at: Option<String> = row
            .try_get("expires_at")
            .map_err(|e| storage("failed to read expires_at", e))?;
        if let Some(raw) = expires_at {
            if Utc::now() >= parse_timestamp(&raw, "expires_at")? {
                return Ok(None);
            }
        }

        let payload: String = row
            .try_get("payload")
            .map_err(|e| storage("failed to read payload", e))?;
        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|e| storage("invalid fallback payload", e))
    }
}
