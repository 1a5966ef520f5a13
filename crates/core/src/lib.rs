//! `tasksync-core` — domain foundation for the synchronization engine.
//!
//! This crate contains **pure domain** primitives (no network or storage
//! concerns): strongly-typed identifiers, the error taxonomy shared across
//! the engine, and the extension-record model that attaches local metadata
//! to remote task entities.

pub mod error;
pub mod id;
pub mod record;

pub use error::{SyncError, SyncResult};
pub use id::{
    BearerToken, CacheKey, ContainerId, ExtensionRecordId, OwnerId, RemoteEntityId, VersionToken,
};
pub use record::{ExtensionRecord, Priority};
