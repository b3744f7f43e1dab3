//! Retry driver with exponential backoff.
//!
//! Every network call in the crate goes through [`BackoffRetrier`]. The wait
//! between attempts is a `tokio` timer, so one caller's backoff never stalls
//! another task.

use crate::client::error_classification::classify;
use crate::Error;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = if factor.is_finite() && factor >= 1.0 {
            factor
        } else {
            1.0
        };
        self
    }

    fn first_delay(&self) -> Duration {
        self.initial_delay.min(self.max_delay)
    }

    fn next_delay(&self, current: Duration) -> Duration {
        // `factor` is a public field; NaN and values below 1 mean no growth.
        let scaled = current.as_secs_f64() * self.factor.max(1.0);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled).max(current)
        }
    }

    /// The waits `run` uses between attempts when no failure asks for a longer one.
    /// Has `max_attempts - 1` entries.
    pub fn delay_schedule(&self) -> Vec<Duration> {
        let mut out = Vec::with_capacity(self.max_attempts.saturating_sub(1) as usize);
        let mut current = self.first_delay();
        for _ in 1..self.max_attempts.max(1) {
            out.push(current);
            current = self.next_delay(current);
        }
        out
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    Stop,
    /// Retry, waiting at least the given duration (still capped by `max_delay`).
    Retry { at_least: Option<Duration> },
}

/// Generic retry driver.
#[derive(Debug, Clone, Default)]
pub struct BackoffRetrier {
    policy: RetryPolicy,
}

impl BackoffRetrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, `should_retry` says no, or attempts run out.
    ///
    /// The failure of the last attempt is returned as-is. `operation` receives the
    /// 0-based attempt number.
    pub async fn run<T, E, F, Fut, S>(&self, should_retry: S, operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        S: Fn(&E) -> bool,
    {
        self.run_with(
            |e| {
                if should_retry(e) {
                    RetryVerdict::Retry { at_least: None }
                } else {
                    RetryVerdict::Stop
                }
            },
            operation,
        )
        .await
    }

    /// [`run`](Self::run) with a verdict that may also stretch the next wait.
    pub async fn run_with<T, E, F, Fut, V>(&self, verdict: V, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        V: Fn(&E) -> RetryVerdict,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut delay = self.policy.first_delay();
        let mut attempt: u32 = 0;

        loop {
            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let at_least = match verdict(&err) {
                RetryVerdict::Stop => return Err(err),
                RetryVerdict::Retry { at_least } => at_least,
            };
            if attempt + 1 >= max_attempts {
                warn!(attempts = attempt + 1, "retries exhausted");
                return Err(err);
            }

            if let Some(min) = at_least {
                delay = delay.max(min.min(self.policy.max_delay));
            }
            debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "retrying after failure"
            );
            tokio::time::sleep(delay).await;
            delay = self.policy.next_delay(delay);
            attempt += 1;
        }
    }

    /// Retry crate operations according to the error classifier.
    ///
    /// Rate-limited failures wait at least the server's `Retry-After`, or twice
    /// the initial delay when the server gave none.
    pub async fn retry_classified<T, F, Fut>(&self, operation: F) -> crate::Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let longer = self.policy.initial_delay.saturating_mul(2);
        self.run_with(
            |err: &Error| {
                let decision = classify(err);
                if !decision.retryable {
                    return RetryVerdict::Stop;
                }
                debug!(category = decision.category.name(), "retryable failure");
                let at_least = if decision.wants_longer_backoff() {
                    Some(decision.retry_after.unwrap_or(longer))
                } else {
                    None
                };
                RetryVerdict::Retry { at_least }
            },
            operation,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(attempts)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(4))
    }

    #[test]
    fn default_schedule() {
        let schedule = RetryPolicy::default().delay_schedule();
        assert_eq!(
            schedule,
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[test]
    fn schedule_is_capped_and_non_decreasing() {
        let policy = RetryPolicy::new()
            .with_max_attempts(8)
            .with_initial_delay(Duration::from_millis(300))
            .with_max_delay(Duration::from_millis(2_000))
            .with_factor(2.0);
        let schedule = policy.delay_schedule();
        assert_eq!(schedule.len(), 7);
        for w in schedule.windows(2) {
            assert!(w[0] <= w[1]);
        }
        assert!(schedule.iter().all(|d| *d <= policy.max_delay));
        assert_eq!(*schedule.last().unwrap(), Duration::from_millis(2_000));
    }

    #[test]
    fn invalid_factor_is_clamped() {
        let policy = RetryPolicy::new().with_factor(0.1).with_max_attempts(3);
        assert_eq!(policy.factor, 1.0);
        let s = policy.delay_schedule();
        assert_eq!(s[0], s[1]);
    }

    #[test]
    fn factor_set_directly_never_shrinks_the_delay() {
        for factor in [-1.0, 0.0, f64::NAN] {
            let policy = RetryPolicy {
                factor,
                ..fast_policy(4)
            };
            let s = policy.delay_schedule();
            assert_eq!(s, vec![Duration::from_millis(1); 3], "factor {factor}");
        }
    }

    #[tokio::test]
    async fn negative_factor_still_retries() {
        let retrier = BackoffRetrier::new(RetryPolicy {
            factor: -2.0,
            ..fast_policy(3)
        });
        let calls = AtomicU32::new(0);
        let out: Result<(), &str> = retrier
            .run(
                |_| true,
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("down") }
                },
            )
            .await;
        assert_eq!(out, Err("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retryable_errors_use_all_attempts_and_return_last() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), String> = BackoffRetrier::new(fast_policy(3))
            .run(
                |_| true,
                move |attempt| {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err(format!("failure {}", attempt))
                    }
                },
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err(), "failure 2");
    }

    #[tokio::test]
    async fn non_retryable_errors_run_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), &str> = BackoffRetrier::new(fast_policy(5))
            .run(
                |_| false,
                move |_| {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err("fatal")
                    }
                },
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err(), "fatal");
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let result: Result<u32, &str> = BackoffRetrier::new(fast_policy(3))
            .run(
                |_| true,
                |attempt| async move {
                    if attempt < 2 {
                        Err("transient")
                    } else {
                        Ok(attempt)
                    }
                },
            )
            .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn classified_retry_stops_on_not_found() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: crate::Result<()> = BackoffRetrier::new(fast_policy(3))
            .retry_classified(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Remote {
                        status: 404,
                        message: "missing".to_string(),
                        retry_after_ms: None,
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn classified_retry_repeats_server_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: crate::Result<()> = BackoffRetrier::new(fast_policy(3))
            .retry_classified(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Remote {
                        status: 429,
                        message: "slow down".to_string(),
                        retry_after_ms: Some(1),
                    })
                }
            })
            .await;
        assert_eq!(result.unwrap_err().status(), Some(429));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
