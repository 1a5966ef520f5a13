//! Strongly-typed identifiers used across the engine.
//!
//! Locally-issued identifiers are UUIDv7 newtypes; identifiers issued by the
//! remote task API are opaque strings and stay opaque here.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;

/// Identifier of the principal owning extension records.
///
/// Every store lookup and every reconciliation run is scoped to one owner;
/// records belonging to another owner are never visible across the boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(Uuid);

/// Identifier of a locally-stored extension record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionRecordId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in
            /// tests for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $t {
            type Err = SyncError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| SyncError::validation(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(OwnerId, "OwnerId");
impl_uuid_newtype!(ExtensionRecordId, "ExtensionRecordId");

/// Identifier of a remote container, issued by the task API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

/// Identifier of a remote entity, issued by the task API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteEntityId(String);

/// Opaque revision identifier for a remote resource (ETag-equivalent).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

macro_rules! impl_string_newtype {
    ($t:ty) => {
        impl $t {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

impl_string_newtype!(ContainerId);
impl_string_newtype!(RemoteEntityId);
impl_string_newtype!(VersionToken);

/// Cache key scoping a cached resource and, where relevant, its owning
/// principal.
///
/// Keys are opaque to the caches; the constructors here only exist so every
/// call site builds them the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl_string_newtype!(CacheKey);

impl CacheKey {
    /// Key for one page of the container listing of `owner`.
    pub fn containers(owner: &OwnerId, cursor: Option<&str>) -> Self {
        Self(format!("containers/{}/{}", owner, cursor.unwrap_or("first")))
    }

    /// Key for one page of the entity listing of `container`, scoped to
    /// `owner`.
    pub fn entities(owner: &OwnerId, container: &ContainerId, cursor: Option<&str>) -> Self {
        Self(format!(
            "entities/{}/{}/{}",
            owner,
            container,
            cursor.unwrap_or("first")
        ))
    }
}

/// Opaque bearer credential, supplied by the caller on every remote call.
///
/// Issuance and refresh are entirely external to this engine.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw credential, for placing into an Authorization header.
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BearerToken").field(&"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_id_round_trips_through_str() {
        let id = OwnerId::new();
        let parsed: OwnerId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn invalid_uuid_is_a_validation_error() {
        let err = "not-a-uuid".parse::<OwnerId>().unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn cache_keys_are_scoped_per_owner_and_cursor() {
        let owner = OwnerId::new();
        let other = OwnerId::new();
        let container = ContainerId::new("c-1");

        assert_ne!(
            CacheKey::containers(&owner, None),
            CacheKey::containers(&other, None)
        );
        assert_ne!(
            CacheKey::entities(&owner, &container, None),
            CacheKey::entities(&owner, &container, Some("page-2"))
        );
    }

    #[test]
    fn bearer_token_debug_is_redacted() {
        let token = BearerToken::new("super-secret");
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
