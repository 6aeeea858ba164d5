//! Retry and backoff primitives shared by every part of the compiler that
//! calls an external collaborator over the network: the Action Pin Cache's
//! resolver adapter, MCP server connection probes during tool validation,
//! and the audit engine's CI-API reads.
//!
//! The pattern is the same everywhere (see `DESIGN.md`): classify an error
//! as transient or permanent, back off exponentially with jitter between
//! attempts, and make the wait cancellable so a batch compile or an audit
//! run can be aborted promptly instead of riding out a multi-second sleep.
//! This crate implements that pattern once; callers only supply a
//! classifier and an async operation.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use aw_duration::{deserialize_duration, serialize_duration};

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// No delay between retries.
    Immediate,
    /// Delay doubles each attempt (default).
    #[default]
    Exponential,
    /// Delay grows linearly with attempt number.
    Linear,
    /// Same delay every attempt.
    Constant,
}

/// A fully-specified backoff policy: how many attempts, how the delay
/// between them grows, and how much jitter to apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub strategy: BackoffStrategy,
    pub max_attempts: u32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub base_delay: Duration,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub max_delay: Duration,
    /// Jitter factor in `[0.0, 1.0]`: `0.0` is no jitter, `1.0` is full jitter.
    pub jitter: f64,
}

impl BackoffPolicy {
    /// Preset used by the Action Pin Cache's resolver adapter: the
    /// distilled spec does not mandate specific numbers here, so this
    /// mirrors the teacher's balanced "Default" publish-retry preset.
    pub fn action_resolution() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: 0.3,
        }
    }

    /// Preset for MCP server connection probes during tool-binding
    /// validation: up to three attempts, exponential backoff of 1s then
    /// 2s.
    pub fn mcp_connection() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(2),
            jitter: 0.0,
        }
    }

    /// Preset for audit-engine reads against the CI platform's job-metadata
    /// API: a handful of attempts, moderate backoff, since a partial report
    /// is an acceptable degradation if these are exhausted.
    pub fn audit_api() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            max_attempts: 3,
            base_delay: Duration::from_millis(750),
            max_delay: Duration::from_secs(6),
            jitter: 0.2,
        }
    }

    /// Delay to wait before the given attempt number (1-indexed: the delay
    /// that precedes attempt `attempt`, so `delay_for(1)` is the wait
    /// before the *second* try).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = match self.strategy {
            BackoffStrategy::Immediate => Duration::ZERO,
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(30));
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt.max(1)),
            BackoffStrategy::Constant => self.base_delay,
        };
        let capped = base.min(self.max_delay);
        apply_jitter(capped, self.jitter)
    }
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let jitter = jitter.clamp(0.0, 1.0);
    let millis = delay.as_millis() as f64;
    let spread = millis * jitter;
    let offset = rand::rng().random_range(-spread..=spread);
    let jittered = (millis + offset).max(0.0);
    Duration::from_millis(jittered as u64)
}

/// Whether an error should be retried or treated as final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Timeouts, connection refused/reset, DNS/host unreachable — worth
    /// another attempt.
    Transient,
    /// Authentication failures, 404s, malformed input — retrying changes
    /// nothing.
    Permanent,
}

/// Classifies an error as transient or permanent so the retry loop knows
/// whether another attempt is worthwhile.
pub trait Classify {
    fn classify(&self) -> ErrorClass;
}

/// Outcome of a cancellable retry loop.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded, possibly after some retries.
    Ok(T),
    /// All attempts were exhausted; carries the last error.
    Exhausted(E),
    /// A permanent error was returned and no further attempts were made.
    Permanent(E),
    /// The cancellation token fired while waiting between attempts.
    Cancelled,
}

/// Run `op` up to `policy.max_attempts` times, classifying each failure and
/// backing off between transient failures. Returns immediately on a
/// permanent error. Cancellation is checked both before each attempt and
/// during the backoff sleep, so a cancelled caller never rides out a full
/// wait.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> RetryOutcome<T, E>
where
    E: Classify,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled;
        }

        match op(attempt).await {
            Ok(v) => return RetryOutcome::Ok(v),
            Err(e) => {
                let class = e.classify();
                if class == ErrorClass::Permanent {
                    tracing::warn!(attempt, "permanent error, not retrying");
                    return RetryOutcome::Permanent(e);
                }
                if attempt >= policy.max_attempts {
                    tracing::warn!(attempt, "retry attempts exhausted");
                    return RetryOutcome::Exhausted(e);
                }

                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt, ?delay, "transient error, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return RetryOutcome::Cancelled,
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Fake(ErrorClass);
    impl Classify for Fake {
        fn classify(&self) -> ErrorClass {
            self.0
        }
    }

    #[test]
    fn exponential_delay_doubles_and_caps() {
        let p = BackoffPolicy {
            strategy: BackoffStrategy::Exponential,
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            jitter: 0.0,
        };
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(3), Duration::from_secs(4));
        // would be 8s uncapped; capped at max_delay
        assert_eq!(p.delay_for(4), Duration::from_secs(4));
    }

    #[test]
    fn constant_delay_never_changes() {
        let p = BackoffPolicy {
            strategy: BackoffStrategy::Constant,
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
        };
        assert_eq!(p.delay_for(1), p.delay_for(5));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let policy = BackoffPolicy::mcp_connection();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&policy, &cancel, |attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(Fake(ErrorClass::Transient))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert!(matches!(result, RetryOutcome::Ok(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_error_stops_immediately() {
        let policy = BackoffPolicy::action_resolution();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: RetryOutcome<(), Fake> = retry_with_backoff(&policy, &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Fake(ErrorClass::Permanent)) }
        })
        .await;

        assert!(matches!(result, RetryOutcome::Permanent(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let policy = BackoffPolicy {
            strategy: BackoffStrategy::Immediate,
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        };
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: RetryOutcome<(), Fake> = retry_with_backoff(&policy, &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Fake(ErrorClass::Transient)) }
        })
        .await;

        assert!(matches!(result, RetryOutcome::Exhausted(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_aborts_before_first_attempt() {
        let policy = BackoffPolicy::mcp_connection();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: RetryOutcome<(), Fake> =
            retry_with_backoff(&policy, &cancel, |_| async { Ok(()) }).await;

        assert!(matches!(result, RetryOutcome::Cancelled));
    }
}
