//! Remote task API contract: requests, responses, wire shapes.
//!
//! The remote API is consumed, never implemented, by this engine. Resource
//! kinds are containers and entities; list operations return a collection
//! plus an opaque continuation cursor while more pages exist, and reads
//! accept a version-token precondition answered with an "unchanged" signal.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use tasksync_core::{
    BearerToken, ContainerId, RemoteEntityId, SyncError, SyncResult, VersionToken,
};

/// One read against the remote task API.
///
/// The bearer credential is supplied by the caller per request; issuance
/// and refresh are external to the engine.
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub credential: BearerToken,
}

impl RemoteRequest {
    pub fn new(path: impl Into<String>, credential: BearerToken) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
            credential,
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// List the containers owned by the credential's principal.
    pub fn list_containers(credential: &BearerToken, cursor: Option<&str>) -> Self {
        let mut request = Self::new("/containers", credential.clone());
        if let Some(cursor) = cursor {
            request = request.with_query("cursor", cursor);
        }
        request
    }

    /// List the entities in one container, continuing from `cursor`.
    pub fn list_entities(
        container_id: &ContainerId,
        credential: &BearerToken,
        cursor: Option<&str>,
    ) -> Self {
        let mut request = Self::new(
            format!("/containers/{}/entities", container_id),
            credential.clone(),
        );
        if let Some(cursor) = cursor {
            request = request.with_query("cursor", cursor);
        }
        request
    }

    /// The continuation cursor this request carries, if any.
    pub fn cursor(&self) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == "cursor")
            .map(|(_, value)| value.as_str())
    }
}

/// Outcome of a conditional remote read.
#[derive(Debug, Clone)]
pub enum RemoteResponse {
    /// The precondition matched; the caller's stored payload is current.
    NotModified,
    /// A fresh payload, with the token identifying this revision when the
    /// remote supplied one.
    Fresh {
        payload: Value,
        version: Option<VersionToken>,
    },
}

/// Transport executing reads against the remote API.
///
/// `precondition` carries the stored version token for a conditional read;
/// `None` sends an unconditional request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &RemoteRequest,
        precondition: Option<&VersionToken>,
    ) -> SyncResult<RemoteResponse>;
}

/// A container as the remote lists it.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteContainer {
    pub id: ContainerId,
    #[serde(default)]
    pub name: String,
}

/// One page of the container listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerPage {
    pub containers: Vec<RemoteContainer>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl ContainerPage {
    pub fn from_payload(payload: &Value) -> SyncResult<Self> {
        serde_json::from_value(payload.clone())
            .map_err(|e| SyncError::parse(format!("malformed container page: {e}")))
    }
}

/// An entity as the remote lists it.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEntity {
    pub id: RemoteEntityId,
    #[serde(default)]
    pub container_id: Option<ContainerId>,
}

/// One page of an entity listing.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityPage {
    pub entities: Vec<RemoteEntity>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl EntityPage {
    pub fn from_payload(payload: &Value) -> SyncResult<Self> {
        serde_json::from_value(payload.clone())
            .map_err(|e| SyncError::parse(format!("malformed entity page: {e}")))
    }
}
