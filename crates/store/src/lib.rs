//! `tasksync-store` — local persistence collaborators.
//!
//! Two concerns live here, both behind traits so the engine can be tested
//! against in-memory implementations:
//!
//! - [`ExtensionStore`]: find/delete over [`ExtensionRecord`]s, always
//!   scoped by owner.
//! - [`FallbackStore`]: TTL-bounded last-known-good payloads, consulted
//!   only when a live retrieval ultimately fails.
//!
//! SQLite-backed implementations are provided for durable deployments;
//! the in-memory ones back tests and short-lived processes.
//!
//! [`ExtensionRecord`]: tasksync_core::ExtensionRecord

pub mod error;
pub mod extension;
pub mod fallback;
pub mod sqlite;

pub use error::StoreError;
pub use extension::{ExtensionStore, InMemoryExtensionStore};
pub use fallback::{FallbackStore, InMemoryFallbackStore};
pub use sqlite::{SqliteExtensionStore, SqliteFallbackStore};
