//! Local extension records attached to remote task entities.
//!
//! The remote API is the sole source of truth for task content; these
//! records only carry the supplementary metadata (priority, tags) the local
//! application layers on top, keyed by the remote entity identifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::id::{ExtensionRecordId, OwnerId, RemoteEntityId};

/// User-assigned priority of a remote entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl core::str::FromStr for Priority {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(SyncError::validation(format!("invalid priority: {other}"))),
        }
    }
}

/// Supplementary metadata for one remote entity.
///
/// Created when a user attaches metadata to a remote entity; deleted either
/// directly by the user or by reconciliation once the remote entity is gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    pub id: ExtensionRecordId,
    pub owner_id: OwnerId,
    pub remote_entity_id: RemoteEntityId,
    pub priority: Option<Priority>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtensionRecord {
    /// Create a new record with no metadata set yet.
    pub fn new(owner_id: OwnerId, remote_entity_id: RemoteEntityId) -> Self {
        let now = Utc::now();
        Self {
            id: ExtensionRecordId::new(),
            owner_id,
            remote_entity_id,
            priority: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self.updated_at = Utc::now();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self.updated_at = Utc::now();
        self
    }
}
