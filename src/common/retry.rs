//! Retry-with-resync wrapper for authenticated exchange calls
//!
//! Exchange rejections fall into three classes: transient network trouble,
//! clock-skew rejections (the request timestamp fell outside the server's
//! `recvWindow`), and everything that retrying cannot fix. This module owns
//! the one retry loop used by every call site, so backoff and classification
//! are not re-derived per endpoint.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::time_sync::{TimeSync, TimeSource};

/// How a failed call should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, connection trouble, HTTP 5xx: retry after a backoff.
    Transient,
    /// The exchange rejected the timestamp: force a resync, then retry.
    ClockSkew,
    /// Bad credentials, bad parameters, insufficient balance: propagate
    /// immediately without consuming retry budget.
    Fatal,
}

/// Classifies an error for the retry loop.
pub trait Retryable {
    fn failure_kind(&self) -> FailureKind;
}

/// Retry parameters for one call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }
}

/// Run `op` with clock-resync-aware retries.
///
/// `op` receives a freshly adjusted timestamp on every attempt. Before the
/// first attempt the clock is refreshed only if stale (or unconditionally
/// when `critical` is set, e.g. order placement); before every retry it is
/// refreshed unconditionally, since a clock-skew rejection means the offset
/// is wrong. Fatal failures return immediately; transient and clock-skew
/// failures back off exponentially until the attempt budget is exhausted,
/// at which point the last error is returned.
pub async fn with_resync<S, T, E, F, Fut>(
    policy: &RetryPolicy,
    clock: &TimeSync<S>,
    critical: bool,
    mut op: F,
) -> Result<T, E>
where
    S: TimeSource,
    E: Retryable + std::fmt::Display,
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = policy.base_delay;
    let mut last_err = None;

    for attempt in 1..=policy.max_attempts {
        if attempt == 1 {
            clock.force_sync_if_needed(critical).await;
        } else {
            // a retry implies the previous timestamp may have been bad
            clock.force_sync_if_needed(true).await;
        }

        let timestamp = clock.adjusted_timestamp_ms();
        match op(timestamp).await {
            Ok(value) => return Ok(value),
            Err(e) => match e.failure_kind() {
                FailureKind::Fatal => {
                    debug!(attempt, error = %e, "Non-retryable failure, propagating");
                    return Err(e);
                }
                kind => {
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        kind = ?kind,
                        error = %e,
                        "Request failed, will retry after resync"
                    );
                    last_err = Some(e);
                }
            },
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(delay).await;
            delay = delay.mul_f64(policy.backoff_multiplier);
        }
    }

    Err(last_err.expect("retry loop ran at least one attempt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use crate::time_sync::local_time_ms;

    #[derive(Debug)]
    struct TestError(FailureKind);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error: {:?}", self.0)
        }
    }

    impl Retryable for TestError {
        fn failure_kind(&self) -> FailureKind {
            self.0
        }
    }

    struct CountingSource {
        calls: AtomicU64,
    }

    impl CountingSource {
        fn new() -> Arc<Self> {
            Arc::new(CountingSource {
                calls: AtomicU64::new(0),
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TimeSource for Arc<CountingSource> {
        async fn server_time_ms(&self) -> anyhow::Result<i64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(local_time_ms())
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default().with_base_delay(Duration::from_millis(1))
    }

    /// A freshly synced clock, so the first non-critical attempt does not
    /// trigger an extra network call.
    fn fresh_clock(source: &Arc<CountingSource>) -> TimeSync<Arc<CountingSource>> {
        let clock = TimeSync::new(Arc::clone(source), Duration::from_secs(60));
        clock.update_offset(local_time_ms());
        clock
    }

    #[tokio::test]
    async fn test_clock_skew_recovers_with_forced_resyncs() {
        let source = CountingSource::new();
        let clock = fresh_clock(&source);
        let invocations = AtomicU64::new(0);

        let result: Result<&str, TestError> =
            with_resync(&fast_policy(), &clock, false, |_ts| {
                let n = invocations.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(TestError(FailureKind::ClockSkew))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
        // attempt 1 skipped the sync (fresh clock); attempts 2 and 3 forced one each
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_fatal_failure_returns_immediately() {
        let source = CountingSource::new();
        let clock = fresh_clock(&source);
        let invocations = AtomicU64::new(0);

        let result: Result<(), TestError> = with_resync(&fast_policy(), &clock, false, |_ts| {
            invocations.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError(FailureKind::Fatal)) }
        })
        .await;

        assert_eq!(result.unwrap_err().failure_kind(), FailureKind::Fatal);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_transient_exhausts_budget() {
        let source = CountingSource::new();
        let clock = fresh_clock(&source);
        let invocations = AtomicU64::new(0);

        let result: Result<(), TestError> = with_resync(&fast_policy(), &clock, false, |_ts| {
            invocations.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError(FailureKind::Transient)) }
        })
        .await;

        assert_eq!(result.unwrap_err().failure_kind(), FailureKind::Transient);
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_critical_call_forces_upfront_sync() {
        let source = CountingSource::new();
        let clock = fresh_clock(&source);

        let result: Result<(), TestError> =
            with_resync(&fast_policy(), &clock, true, |_ts| async { Ok(()) }).await;

        assert!(result.is_ok());
        // even though the clock was fresh, criticality forced one sync
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_op_receives_adjusted_timestamp() {
        let source = CountingSource::new();
        let clock = fresh_clock(&source);
        clock.update_offset(local_time_ms() + 10_000);

        let result: Result<i64, TestError> =
            with_resync(&fast_policy(), &clock, false, |ts| async move { Ok(ts) }).await;

        let ts = result.unwrap();
        assert!((ts - (local_time_ms() + 10_000)).abs() < 200);
    }
}
