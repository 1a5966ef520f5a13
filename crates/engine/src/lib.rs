//! `tasksync-engine` — synchronization and resilience core.
//!
//! The engine keeps locally-stored extension records consistent with an
//! external, rate-limited task API that is the sole source of truth for
//! task content. It is built from small composable pieces:
//!
//! - [`retry`]: bounded exponential backoff with jitter around one remote
//!   call.
//! - [`conditional`]: version-token conditional reads that short-circuit on
//!   "unchanged".
//! - [`client`]: the resilient retrieval chain (conditional read → retries
//!   → fallback store on failure).
//! - [`reconcile`]: the job that enumerates the full remote entity set and
//!   garbage-collects orphaned extension records.
//! - [`worker`]: a background task running reconciliation on a schedule.
//!
//! All cache state is held by explicit store objects constructed at startup
//! and injected; nothing here is process-global.

pub mod client;
pub mod conditional;
pub mod http;
pub mod reconcile;
pub mod remote;
pub mod retry;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{FetchedResource, ResilientClient};
pub use conditional::{ConditionalCache, ConditionalFetch};
pub use http::HttpTransport;
pub use reconcile::{ReconcileReport, ReconciliationJob};
pub use remote::{RemoteRequest, RemoteResponse, Transport};
pub use retry::{RetryPolicy, execute_with_retry};
pub use worker::ReconcileWorker;
