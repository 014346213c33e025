// =============================================================================
// Retry Policy — bounded attempt-with-retry for any fallible async operation
// =============================================================================
//
// Used for price fetches and notification deliveries alike.  A policy allows
// `max_retries` attempts after the first, waiting between attempts with a
// delay that starts at `initial_delay_ms`, grows by `factor`, and is capped at
// `max_delay_ms`.  A `factor` of 1.0 gives a constant delay.
//
// `timeout_secs` bounds every single attempt; it is applied by the caller on
// the request itself (reqwest per-request timeout).
// =============================================================================

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use tracing::warn;

fn default_max_retries() -> usize {
    2
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_factor() -> f32 {
    2.0
}

fn default_timeout_secs() -> u64 {
    30
}

/// Retry settings for one kind of outbound call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Delay before the first retry.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays (>= 1.0).
    #[serde(default = "default_factor")]
    pub factor: f32,

    /// Timeout for each individual attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            factor: default_factor(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RetryPolicy {
    /// Same delay between every attempt.
    pub fn constant(max_retries: usize, delay: Duration, timeout: Duration) -> Self {
        let delay_ms = delay.as_millis() as u64;
        Self {
            max_retries,
            initial_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            factor: 1.0,
            timeout_secs: timeout.as_secs().max(1),
        }
    }

    /// Delay doubles after each failed attempt, up to `max_delay`.
    pub fn exponential(
        max_retries: usize,
        initial_delay: Duration,
        max_delay: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            max_retries,
            initial_delay_ms: initial_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
            factor: 2.0,
            timeout_secs: timeout.as_secs().max(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reason this policy cannot be used, if any.  A zero timeout would fail
    /// every attempt before a response could arrive.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be at least 1".to_string());
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(format!("factor must be a finite number >= 1.0, got {}", self.factor));
        }
        Ok(())
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    fn backoff(&self) -> ExponentialBuilder {
        let initial = Duration::from_millis(self.initial_delay_ms);
        let cap = Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms));
        ExponentialBuilder::default()
            .with_min_delay(initial)
            .with_max_delay(cap)
            .with_factor(self.factor.max(1.0))
            .with_max_times(self.max_retries)
    }
}

/// Final result of a retried operation plus how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `operation` until it succeeds or the policy is exhausted.
///
/// Every error is treated as retryable.
pub async fn attempt_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    operation: F,
) -> Attempted<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    attempt_with_retry_when(policy, label, operation, |_| true).await
}

/// Like [`attempt_with_retry`], but stops early when `retryable` returns
/// `false` for an error.
pub async fn attempt_with_retry_when<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
    retryable: R,
) -> Attempted<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: FnMut(&E) -> bool,
{
    let attempts = AtomicU32::new(0);

    let result = (|| {
        attempts.fetch_add(1, Ordering::Relaxed);
        operation()
    })
    .retry(policy.backoff())
    .sleep(tokio::time::sleep)
    .when(retryable)
    .notify(|err: &E, delay: Duration| {
        warn!(
            label,
            error = %err,
            retry_in_ms = delay.as_millis() as u64,
            "attempt failed, retrying"
        );
    })
    .await;

    Attempted {
        result,
        attempts: attempts.into_inner(),
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn fast(max_retries: usize) -> RetryPolicy {
        RetryPolicy::constant(max_retries, Duration::from_millis(1), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn first_success_takes_one_attempt() {
        let out: Attempted<u32, String> =
            attempt_with_retry(&fast(3), "ok", || async { Ok(7) }).await;
        assert_eq!(out.result.unwrap(), 7);
        assert_eq!(out.attempts, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_stop_at_max_attempts() {
        let policy = fast(2);
        let out: Attempted<(), String> =
            attempt_with_retry(&policy, "fail", || async { Err("boom".to_string()) }).await;
        assert_eq!(out.result.unwrap_err(), "boom");
        assert_eq!(out.attempts as usize, policy.max_attempts());
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let out: Attempted<(), String> =
            attempt_with_retry(&fast(0), "once", || async { Err("no".to_string()) }).await;
        assert!(out.result.is_err());
        assert_eq!(out.attempts, 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out: Attempted<&str, String> = attempt_with_retry(&fast(3), "flaky", || {
            let n = calls.fetch_add(1, Ordering::Relaxed);
            async move {
                if n < 2 {
                    Err(format!("transient {n}"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(out.result.unwrap(), "done");
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let out: Attempted<(), String> = attempt_with_retry_when(
            &fast(5),
            "fatal",
            || async { Err("permanent".to_string()) },
            |e: &String| !e.starts_with("perm"),
        )
        .await;
        assert!(out.result.is_err());
        assert_eq!(out.attempts, 1);
    }

    #[test]
    fn constructors() {
        let c = RetryPolicy::constant(2, Duration::from_secs(2), Duration::from_secs(30));
        assert_eq!(c.initial_delay_ms, 2_000);
        assert_eq!(c.max_delay_ms, 2_000);
        assert_eq!(c.factor, 1.0);
        assert_eq!(c.max_attempts(), 3);

        let e = RetryPolicy::exponential(
            2,
            Duration::from_secs(1),
            Duration::from_secs(4),
            Duration::from_secs(30),
        );
        assert_eq!(e.factor, 2.0);
        assert_eq!(e.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn validate_rejects_zero_timeout_and_bad_factor() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(fast(0).validate().is_ok());

        let zero_timeout: RetryPolicy = serde_json::from_str(r#"{ "timeout_secs": 0 }"#).unwrap();
        assert!(zero_timeout.validate().unwrap_err().contains("timeout_secs"));

        for factor in [f32::NAN, f32::INFINITY, 0.5] {
            let p = RetryPolicy {
                factor,
                ..RetryPolicy::default()
            };
            assert!(p.validate().unwrap_err().contains("factor"), "factor {factor}");
        }
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let p: RetryPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(p, RetryPolicy::default());
    }
}
