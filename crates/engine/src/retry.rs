//! Bounded exponential backoff with jitter.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use tasksync_core::{SyncError, SyncResult};

/// Retry policy for remote calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts beyond the first (0 = single attempt).
    pub max_retries: u32,
    /// Base delay before the first retry.
    pub initial_delay: Duration,
    /// Cap applied to every computed backoff delay.
    pub max_delay: Duration,
    /// Remote status codes considered transient.
    pub retryable_statuses: HashSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            retryable_statuses: [408, 429, 500, 502, 503, 504].into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// Policy with no retries: one attempt, no wait.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Policy with exponential backoff between `initial_delay` and
    /// `max_delay`.
    pub fn exponential(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Reject a malformed policy before any network attempt is made.
    pub fn validate(&self) -> SyncResult<()> {
        if self.initial_delay > self.max_delay {
            return Err(SyncError::validation(format!(
                "initial delay {:?} exceeds max delay {:?}",
                self.initial_delay, self.max_delay
            )));
        }
        Ok(())
    }

    /// Whether `error` is worth another attempt under this policy.
    ///
    /// Connectivity failures are always transient; remote errors only when
    /// their status is in `retryable_statuses`.
    pub fn is_retryable(&self, error: &SyncError) -> bool {
        match error {
            SyncError::Connectivity(_) => true,
            SyncError::Remote { status, .. } => self.retryable_statuses.contains(status),
            _ => false,
        }
    }

    /// Backoff delay for a 0-indexed attempt: `initial * 2^attempt` plus a
    /// uniform jitter of up to 10%, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let computed = base_ms * 2_f64.powi(attempt.min(63) as i32);
        let jitter = rand::thread_rng().gen_range(0.0..=(computed * 0.1));

        Duration::from_millis((computed + jitter).min(max_ms) as u64)
    }
}

/// Delay before the next attempt: a server wait hint overrides the computed
/// backoff entirely, with non-positive hints meaning "retry immediately".
fn retry_delay(policy: &RetryPolicy, attempt: u32, error: &SyncError) -> Duration {
    match error.wait_hint_ms() {
        Some(hint) => Duration::from_millis(hint.max(0) as u64),
        None => policy.delay_for_attempt(attempt),
    }
}

/// Run `operation` with bounded retries under `policy`.
///
/// The operation receives the 0-indexed attempt number. Attempts are
/// strictly sequential; waits suspend only this unit of work
/// (`tokio::time::sleep`). On exhaustion the last failure is returned
/// wrapped in [`SyncError::ExhaustedRetries`] with the attempt count;
/// non-retryable failures propagate immediately. Dropping the returned
/// future stops scheduling further attempts.
pub async fn execute_with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> SyncResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    policy.validate()?;

    let mut attempt: u32 = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if policy.is_retryable(&error) && attempt < policy.max_retries => {
                let delay = retry_delay(policy, attempt, &error);
                tracing::warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, backing off before retry"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) if policy.is_retryable(&error) => {
                return Err(SyncError::ExhaustedRetries {
                    attempts: attempt + 1,
                    source: Box::new(error),
                });
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::exponential(
            max_retries,
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn permanently_failing_op_runs_exactly_n_plus_one_times() {
        let policy = fast_policy(3);
        let calls = Arc::new(AtomicU32::new(0));

        let started = Instant::now();
        let result: SyncResult<()> = execute_with_retry(&policy, |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::remote(503, "unavailable"))
            }
        })
        .await;
        let elapsed = started.elapsed();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(
            result,
            Err(SyncError::ExhaustedRetries { attempts: 4, .. })
        ));
        // Waits of 10 + 20 + 40 ms minimum (jitter only adds).
        assert!(elapsed >= Duration::from_millis(63), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = fast_policy(3);
        let calls = Arc::new(AtomicU32::new(0));

        let result = execute_with_retry(&policy, |_| {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SyncError::connectivity("refused"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_immediately() {
        let policy = fast_policy(3);
        let calls = Arc::new(AtomicU32::new(0));

        let result: SyncResult<()> = execute_with_retry(&policy, |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::remote(404, "not found"))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(SyncError::Remote { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn zero_retries_means_a_single_attempt_without_wait() {
        let policy = fast_policy(0);
        let calls = Arc::new(AtomicU32::new(0));

        let started = Instant::now();
        let result: SyncResult<()> = execute_with_retry(&policy, |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::remote(503, "unavailable"))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(SyncError::ExhaustedRetries { attempts: 1, .. })
        ));
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn invalid_policy_is_rejected_before_the_first_attempt() {
        let policy = RetryPolicy::exponential(
            3,
            Duration::from_secs(10),
            Duration::from_secs(1),
        );
        let calls = Arc::new(AtomicU32::new(0));

        let result: SyncResult<()> = execute_with_retry(&policy, |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    #[test]
    fn wait_hint_overrides_the_computed_backoff_exactly() {
        let policy = fast_policy(3);

        let hinted = SyncError::Remote {
            status: 429,
            retry_after_ms: Some(7_000),
            message: "too many requests".to_string(),
        };
        assert_eq!(
            retry_delay(&policy, 0, &hinted),
            Duration::from_millis(7_000)
        );

        // A non-positive hint means retry immediately.
        let immediate = SyncError::Remote {
            status: 429,
            retry_after_ms: Some(-500),
            message: "too many requests".to_string(),
        };
        assert_eq!(retry_delay(&policy, 2, &immediate), Duration::ZERO);
    }

    #[test]
    fn connectivity_is_always_retryable_and_statuses_follow_the_policy() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(&SyncError::connectivity("timeout")));
        assert!(policy.is_retryable(&SyncError::remote(429, "slow down")));
        assert!(!policy.is_retryable(&SyncError::remote(404, "gone")));
        assert!(!policy.is_retryable(&SyncError::validation("bad key")));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: every backoff delay stays within
            /// [computed, min(computed * 1.1, max)].
            #[test]
            fn delay_is_bounded(
                initial_ms in 1u64..2_000,
                max_ms in 2_000u64..120_000,
                attempt in 0u32..20,
            ) {
                let policy = RetryPolicy::exponential(
                    5,
                    Duration::from_millis(initial_ms),
                    Duration::from_millis(max_ms),
                );

                let delay = policy.delay_for_attempt(attempt);
                prop_assert!(delay <= Duration::from_millis(max_ms));

                let computed = (initial_ms as f64) * 2_f64.powi(attempt as i32);
                let floor = computed.min(max_ms as f64) as u64;
                // The cast truncates, so allow 1ms of slack.
                prop_assert!(delay >= Duration::from_millis(floor.saturating_sub(1)));
            }
        }
    }
}
