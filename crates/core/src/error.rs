//! Error taxonomy for the synchronization engine.

use thiserror::Error;

/// Result type used across the engine.
pub type SyncResult<T> = Result<T, SyncError>;

/// Failure classes surfaced by the synchronization engine.
///
/// "Unchanged" is deliberately absent: a matching precondition is a control
/// signal on the remote-response type, not a failure, and it never escapes
/// the conditional cache.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No response was obtained from the remote (DNS, connect, timeout).
    #[error("connectivity failure: {0}")]
    Connectivity(String),

    /// The remote responded with an error status.
    #[error("remote error ({status}): {message}")]
    Remote {
        status: u16,
        /// Server-specified wait hint in milliseconds, if the response
        /// carried one.
        retry_after_ms: Option<i64>,
        message: String,
    },

    /// The retry budget was spent; wraps the last failure observed.
    #[error("retries exhausted after {attempts} attempt(s): {source}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        source: Box<SyncError>,
    },

    /// A malformed call, rejected before any network attempt.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A response payload could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// The local datastore failed.
    #[error("store error: {0}")]
    Store(String),
}

impl SyncError {
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    pub fn remote(status: u16, msg: impl Into<String>) -> Self {
        Self::Remote {
            status,
            retry_after_ms: None,
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Remote status code, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-specified wait hint in milliseconds, if present.
    pub fn wait_hint_ms(&self) -> Option<i64> {
        match self {
            Self::Remote { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// True when no response was obtained at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}
