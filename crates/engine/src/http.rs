//! reqwest-backed transport with per-minute quota pacing.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use tasksync_core::{SyncError, SyncResult, VersionToken};

use crate::remote::{RemoteRequest, RemoteResponse, Transport};

/// HTTP transport for the remote task API.
///
/// Sends conditional reads via `If-None-Match`, maps 304 to
/// [`RemoteResponse::NotModified`], and surfaces 429 with the parsed
/// `retry-after` hint so the retry layer can honor the server's wait.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    min_request_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpTransport {
    /// Transport without client-side pacing.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            min_request_interval: Duration::ZERO,
            last_request: Mutex::new(None),
        }
    }

    /// Transport that spaces requests to stay under a per-minute quota.
    pub fn with_requests_per_minute(base_url: impl Into<String>, requests_per_minute: u32) -> Self {
        let rpm = requests_per_minute.max(1);
        Self {
            min_request_interval: Duration::from_millis((60_000 / rpm as u64).max(10)),
            ..Self::new(base_url)
        }
    }

    /// Wait out the remainder of the minimum interval since the last
    /// request. Suspends only this unit of work.
    async fn pace(&self) {
        if self.min_request_interval.is_zero() {
            return;
        }

        let wait = {
            let mut last = self.last_request.lock().await;
            let now = Instant::now();
            let wait = match *last {
                Some(previous) => self
                    .min_request_interval
                    .saturating_sub(now.duration_since(previous)),
                None => Duration::ZERO,
            };
            *last = Some(now + wait);
            wait
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("min_request_interval", &self.min_request_interval)
            .finish()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &RemoteRequest,
        precondition: Option<&VersionToken>,
    ) -> SyncResult<RemoteResponse> {
        self.pace().await;

        let url = format!("{}{}", self.base_url, request.path);
        let mut req = self
            .client
            .get(&url)
            .bearer_auth(request.credential.reveal());

        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        if let Some(token) = precondition {
            req = req.header(reqwest::header::IF_NONE_MATCH, token.as_str());
        }

        // No response at all (DNS, connect, timeout) is a connectivity
        // failure; anything the server answered is classified by status.
        let response = req
            .send()
            .await
            .map_err(|e| SyncError::connectivity(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(RemoteResponse::NotModified);
        }

        if status.is_success() {
            let version = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|value| value.to_str().ok())
                .map(VersionToken::new);
            let payload: Value = response
                .json()
                .await
                .map_err(|e| SyncError::parse(format!("failed to decode response body: {e}")))?;
            return Ok(RemoteResponse::Fresh { payload, version });
        }

        let retry_after_ms = parse_retry_after_ms(response.headers());
        let message = response.text().await.unwrap_or_default();
        Err(SyncError::Remote {
            status: status.as_u16(),
            retry_after_ms,
            message,
        })
    }
}

fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<i64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<f64>().ok())
        .map(|seconds| (seconds * 1000.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn retry_after_seconds_become_exact_milliseconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(parse_retry_after_ms(&headers), Some(2_000));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("1.5"));
        assert_eq!(parse_retry_after_ms(&headers), Some(1_500));
    }

    #[test]
    fn missing_or_unparseable_hint_is_none() {
        assert_eq!(parse_retry_after_ms(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        // HTTP-date form is not numeric; the hint is ignored.
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after_ms(&headers), None);
    }

    #[tokio::test]
    async fn pacing_spaces_consecutive_requests() {
        let transport = HttpTransport::with_requests_per_minute("http://localhost", 1_200);
        assert_eq!(transport.min_request_interval, Duration::from_millis(50));

        let started = Instant::now();
        transport.pace().await;
        transport.pace().await;
        transport.pace().await;
        // First call is free, the next two wait ~50ms each.
        assert!(started.elapsed() >= Duration::from_millis(90));
    }
}
