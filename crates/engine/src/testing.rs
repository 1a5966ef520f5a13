//! Test doubles shared across the engine's test modules.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use tasksync_core::{SyncError, SyncResult, VersionToken};

use crate::remote::{RemoteRequest, RemoteResponse, Transport};

/// Scripted transport.
///
/// Responses are queued per path+cursor and popped in order; the final
/// response for a key is repeated once the queue is down to one, so a
/// single scripted error models a permanently failing endpoint.
#[derive(Default)]
pub(crate) struct FakeTransport {
    scripts: Mutex<HashMap<String, VecDeque<SyncResult<RemoteResponse>>>>,
    calls: AtomicU32,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn script_key(path: &str, cursor: Option<&str>) -> String {
        format!("{path}|{}", cursor.unwrap_or(""))
    }

    pub(crate) fn push(
        &self,
        path: &str,
        cursor: Option<&str>,
        response: SyncResult<RemoteResponse>,
    ) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .entry(Self::script_key(path, cursor))
            .or_default()
            .push_back(response);
    }

    pub(crate) fn push_fresh(
        &self,
        path: &str,
        cursor: Option<&str>,
        payload: Value,
        version: Option<&str>,
    ) {
        self.push(
            path,
            cursor,
            Ok(RemoteResponse::Fresh {
                payload,
                version: version.map(VersionToken::new),
            }),
        );
    }

    pub(crate) fn push_err(&self, path: &str, cursor: Option<&str>, error: SyncError) {
        self.push(path, cursor, Err(error));
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(
        &self,
        request: &RemoteRequest,
        _precondition: Option<&VersionToken>,
    ) -> SyncResult<RemoteResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let key = Self::script_key(&request.path, request.cursor());
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts
            .get_mut(&key)
            .unwrap_or_else(|| panic!("no scripted response for {key}"));

        if queue.len() > 1 {
            queue.pop_front().expect("queue is non-empty")
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| panic!("no scripted response for {key}"))
        }
    }
}
