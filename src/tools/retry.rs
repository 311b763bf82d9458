//! Retryable client with exponential backoff
//!
//! Wraps exactly one external call. Failures are classified by the provider
//! edge into transient and fatal kinds:
//! - Transient: retried up to `max_attempts`
//! - Fatal: returned on first occurrence
//! - Delay: base · multiplier^(attempt-1), capped, plus bounded jitter;
//!   never shorter than the previous delay
//!
//! Every attempt lands in the caller's `AttemptLog`, which the enclosing
//! workflow step turns into metadata.

use crate::errors::{ProviderError, ProviderErrorKind, RagError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Backoff policy for one kind of external call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first call included
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub base_delay: Duration,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,

    /// Cap applied before jitter
    pub max_delay: Duration,

    /// Jitter upper bound as a fraction of the capped delay
    pub jitter_ratio: f64,

    /// Timeout for each individual attempt
    pub attempt_timeout: Duration,

    /// Decides whether a failed attempt may be retried
    pub retryable: fn(&ProviderError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(8),
            jitter_ratio: 0.1,
            attempt_timeout: Duration::from_secs(15),
            retryable: ProviderError::is_transient,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt`, without jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw_ms = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms.max(0.0) as u64)
    }

    /// Add random jitter in `[0, jitter_ratio · delay]`
    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_ratio <= 0.0 {
            return delay;
        }
        let extra = delay.as_millis() as f64 * self.jitter_ratio * rand::random::<f64>();
        delay + Duration::from_millis(extra as u64)
    }

    /// Jittered delay after `attempt`, never shorter than `previous`
    ///
    /// With a multiplier of at least 1.0 the result stays within
    /// `delay_for(attempt) · (1 + jitter_ratio)`.
    pub fn next_delay(&self, attempt: u32, previous: Duration) -> Duration {
        self.jittered(self.delay_for(attempt)).max(previous)
    }

    /// Upper bound on time spent waiting between attempts, jitter included
    pub fn max_total_wait(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| {
                let delay = self.delay_for(attempt);
                delay + delay.mul_f64(self.jitter_ratio.max(0.0))
            })
            .sum()
    }
}

/// How a single attempt ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failed {
        kind: ProviderErrorKind,
        transient: bool,
    },
}

/// Metadata for one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt_number: u32,

    pub latency_ms: u64,

    pub outcome: AttemptOutcome,

    /// Backoff waited after this attempt, if another one followed
    pub delay_before_next_ms: Option<u64>,
}

/// Attempt records collected while a workflow step runs
///
/// Clones share the same buffer, so a step can hand a clone to concurrent
/// sub-calls and read everything back once they finish.
#[derive(Debug, Clone, Default)]
pub struct AttemptLog {
    records: Arc<Mutex<Vec<AttemptRecord>>>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: AttemptRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }

    /// Snapshot of all records, in completion order
    pub fn records(&self) -> Vec<AttemptRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attempts beyond the first of each call
    pub fn retry_count(&self) -> usize {
        self.records()
            .iter()
            .filter(|r| r.attempt_number > 1)
            .count()
    }
}

/// Executes provider calls under a `RetryPolicy`
#[derive(Debug, Clone, Default)]
pub struct RetryableClient {
    policy: RetryPolicy,
}

impl RetryableClient {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails fatally, or the policy is
    /// exhausted
    ///
    /// `provider` names the callee in logs and in synthesized timeout errors.
    pub async fn call<F, Fut, T>(
        &self,
        provider: &str,
        log: &AttemptLog,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 0;
        let mut previous_delay = Duration::ZERO;

        loop {
            attempt += 1;
            let started = Instant::now();

            let result = match timeout(self.policy.attempt_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::new(
                    provider,
                    ProviderErrorKind::Timeout,
                    format!(
                        "attempt exceeded {}ms",
                        self.policy.attempt_timeout.as_millis()
                    ),
                )),
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let error = match result {
                Ok(value) => {
                    log.push(AttemptRecord {
                        attempt_number: attempt,
                        latency_ms,
                        outcome: AttemptOutcome::Success,
                        delay_before_next_ms: None,
                    });
                    debug!(provider, attempt, latency_ms, "Provider call succeeded");
                    return Ok(value);
                }
                Err(error) => error,
            };

            let transient = (self.policy.retryable)(&error);
            let failed = AttemptOutcome::Failed {
                kind: error.kind,
                transient,
            };

            if !transient {
                log.push(AttemptRecord {
                    attempt_number: attempt,
                    latency_ms,
                    outcome: failed,
                    delay_before_next_ms: None,
                });
                warn!(provider, attempt, kind = %error.kind, "Fatal provider error, not retrying");
                return Err(RagError::FatalProvider(error));
            }

            if attempt >= self.policy.max_attempts {
                log.push(AttemptRecord {
                    attempt_number: attempt,
                    latency_ms,
                    outcome: failed,
                    delay_before_next_ms: None,
                });
                warn!(provider, attempts = attempt, kind = %error.kind, "Retries exhausted");
                return Err(RagError::RetryExhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.policy.next_delay(attempt, previous_delay);
            previous_delay = delay;
            log.push(AttemptRecord {
                attempt_number: attempt,
                latency_ms,
                outcome: failed,
                delay_before_next_ms: Some(delay.as_millis() as u64),
            });
            warn!(
                provider,
                attempt,
                kind = %error.kind,
                delay_ms = delay.as_millis() as u64,
                "Transient provider error, backing off"
            );

            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(4),
            jitter_ratio: 0.0,
            attempt_timeout: Duration::from_millis(200),
            retryable: ProviderError::is_transient,
        }
    }

    fn transient() -> ProviderError {
        ProviderError::from_status("test", 503)
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(500),
            jitter_ratio: 0.0,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(10), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy {
            jitter_ratio: 0.5,
            ..RetryPolicy::default()
        };
        let base = Duration::from_millis(1000);
        for _ in 0..50 {
            let delay = policy.jittered(base);
            assert!(delay >= base);
            assert!(delay <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_jittered_delays_never_shrink_at_cap() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(20),
            jitter_ratio: 0.5,
            ..RetryPolicy::default()
        };

        for _ in 0..50 {
            let mut previous = Duration::ZERO;
            for attempt in 1..=8 {
                let delay = policy.next_delay(attempt, previous);
                assert!(delay >= previous, "{:?} after {:?}", delay, previous);
                assert!(delay >= policy.delay_for(attempt));
                assert!(delay <= Duration::from_millis(30));
                previous = delay;
            }
        }
    }

    #[tokio::test]
    async fn test_recorded_delays_non_decreasing_with_jitter() {
        let client = RetryableClient::new(RetryPolicy {
            max_attempts: 8,
            base_delay: Duration::from_millis(2),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(4),
            jitter_ratio: 0.5,
            attempt_timeout: Duration::from_millis(200),
            retryable: ProviderError::is_transient,
        });
        let log = AttemptLog::new();

        let result: Result<()> = client
            .call("test", &log, || async { Err(transient()) })
            .await;
        assert!(matches!(result, Err(RagError::RetryExhausted { attempts: 8, .. })));

        let delays: Vec<u64> = log
            .records()
            .iter()
            .filter_map(|r| r.delay_before_next_ms)
            .collect();
        assert_eq!(delays.len(), 7);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]), "delays {:?}", delays);
        assert!(delays.iter().all(|d| *d <= 6), "delays {:?}", delays);
        assert!(delays[2..].iter().all(|d| *d >= 4), "delays {:?}", delays);
    }

    #[test]
    fn test_max_total_wait() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter_ratio: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.max_total_wait(), Duration::from_millis(700));
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let client = RetryableClient::new(fast_policy(5));
        let log = AttemptLog::new();
        let calls = Arc::new(Mutex::new(0u32));

        let counter = calls.clone();
        let result = client
            .call("test", &log, || {
                let counter = counter.clone();
                async move {
                    let mut n = counter.lock().unwrap();
                    *n += 1;
                    if *n <= 2 {
                        Err(transient())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(*calls.lock().unwrap(), 3);
        assert_eq!(log.len(), 3);
        assert_eq!(log.retry_count(), 2);
        assert_eq!(log.records()[2].outcome, AttemptOutcome::Success);
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let client = RetryableClient::new(fast_policy(5));
        let log = AttemptLog::new();

        let result: Result<()> = client
            .call("test", &log, || async {
                Err(ProviderError::from_status("test", 401))
            })
            .await;

        assert!(matches!(result, Err(RagError::FatalProvider(_))));
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let client = RetryableClient::new(fast_policy(3));
        let log = AttemptLog::new();

        let result: Result<()> = client
            .call("test", &log, || async { Err(transient()) })
            .await;

        match result {
            Err(RagError::RetryExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error.kind, ProviderErrorKind::Server);
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.records()[2].delay_before_next_ms, None);
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out_and_retries() {
        let mut policy = fast_policy(2);
        policy.attempt_timeout = Duration::from_millis(10);
        let client = RetryableClient::new(policy);
        let log = AttemptLog::new();

        let result: Result<()> = client
            .call("slow", &log, || async {
                sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;

        match result {
            Err(RagError::RetryExhausted { last_error, .. }) => {
                assert_eq!(last_error.kind, ProviderErrorKind::Timeout);
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
        assert_eq!(log.len(), 2);
    }
}
