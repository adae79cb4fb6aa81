//! Resilient invocation of generation-model calls.
//!
//! [`ResilientInvoker`] wraps one logical call in a bounded attempt loop:
//! every attempt runs under a timeout, and failed attempts wait a
//! full-jitter exponential backoff before the next one. Cancellation aborts
//! both the running attempt and any pending backoff sleep.
//!
//! Classification per attempt:
//!
//! | Outcome | Action |
//! |---------|--------|
//! | success | return the value |
//! | timeout, rate limit, HTTP failure | log a warning, back off, retry |
//! | unexpected error | log it in full, back off, retry |
//! | local precondition error | return it unchanged |
//! | cancellation | return [`RagError::Cancelled`] at once |
//!
//! Exhausting the attempt budget yields [`RagError::RetriesExhausted`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::error::{RagError, Result};

/// Attempt budget, per-attempt timeout and backoff parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Time limit for a single attempt.
    pub timeout: Duration,
    /// Backoff cap for the first retry; doubles per attempt.
    pub base_delay: Duration,
    /// Upper bound on any backoff cap.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(120),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Check that the policy can make progress.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `max_attempts == 0`, the timeout
    /// is zero, or `max_delay < base_delay`.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RagError::ConfigError("max_attempts must be at least 1".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(RagError::ConfigError("timeout must be greater than zero".to_string()));
        }
        if self.max_delay < self.base_delay {
            return Err(RagError::ConfigError(format!(
                "max_delay ({:?}) must not be less than base_delay ({:?})",
                self.max_delay, self.base_delay
            )));
        }
        Ok(())
    }

    /// Upper bound of the backoff after failed attempt `attempt` (1-indexed):
    /// `min(base_delay * 2^(attempt-1), max_delay)`.
    pub fn delay_cap(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(1023) as i32;
        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(exponent);
        Duration::from_secs_f64(exponential.min(self.max_delay.as_secs_f64()))
    }

    /// Sample the full-jitter backoff for `attempt`: uniform in
    /// `[0, delay_cap(attempt)]`.
    pub fn backoff_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let cap = self.delay_cap(attempt).as_secs_f64();
        if cap <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(rng.gen_range(0.0..=cap))
    }
}

/// A failed attempt and the backoff chosen before the next one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryAttempt {
    /// The attempt that just failed, starting at 1.
    pub attempt_number: u32,
    /// The sampled wait before the next attempt.
    pub computed_delay: Duration,
}

/// Runs fallible async operations under a [`RetryPolicy`].
///
/// The invoker holds no mutable state; concurrent calls are independent.
///
/// # Example
///
/// ```rust,ignore
/// use docmind_rag::{ResilientInvoker, RetryPolicy};
///
/// let invoker = ResilientInvoker::new(RetryPolicy::default());
/// let answer = invoker
///     .invoke(Some("req-42"), |_attempt| provider.generate(&request))
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct ResilientInvoker {
    policy: RetryPolicy,
    name: String,
}

impl ResilientInvoker {
    /// Create an invoker with the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, name: "generation".to_string() }
    }

    /// Set the provider name reported in timeout errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// `operation` receives the 1-indexed attempt number. Dropping the
    /// returned future cancels the current attempt and any pending sleep.
    pub async fn invoke<T, F, Fut>(&self, correlation_id: Option<&str>, operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(None, correlation_id, operation).await
    }

    /// Like [`invoke`](Self::invoke), but also stops with
    /// [`RagError::Cancelled`] as soon as `cancel` fires, whether an attempt
    /// or a backoff sleep is in progress.
    pub async fn invoke_with_cancel<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        correlation_id: Option<&str>,
        operation: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(Some(cancel), correlation_id, operation).await
    }

    async fn run<T, F, Fut>(
        &self,
        cancel: Option<&CancellationToken>,
        correlation_id: Option<&str>,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let span = info_span!(
            "resilient_invoke",
            provider = %self.name,
            correlation_id = correlation_id.unwrap_or("-"),
            max_attempts,
        );

        async move {
            let mut last_error = None;

            for attempt in 1..=max_attempts {
                debug!(attempt, max_attempts, "model attempt");

                let attempt_future = tokio::time::timeout(self.policy.timeout, operation(attempt));
                let error = match race_cancel(cancel, attempt_future).await {
                    None | Some(Ok(Err(RagError::Cancelled))) => {
                        warn!(attempt, "model call was cancelled");
                        return Err(RagError::Cancelled);
                    }
                    Some(Ok(Ok(value))) => return Ok(value),
                    Some(Ok(Err(e))) if e.is_local() => return Err(e),
                    Some(Ok(Err(e))) if e.is_transient() => {
                        warn!(attempt, error = %e, "transient provider error");
                        e
                    }
                    Some(Ok(Err(e))) => {
                        error!(attempt, error = ?e, "unexpected error during model call");
                        e
                    }
                    Some(Err(_elapsed)) => {
                        warn!(attempt, timeout = ?self.policy.timeout, "model request timed out");
                        RagError::ProviderTimeout {
                            provider: self.name.clone(),
                            timeout: self.policy.timeout,
                        }
                    }
                };
                last_error = Some(error);

                if attempt == max_attempts {
                    break;
                }

                let retry = RetryAttempt {
                    attempt_number: attempt,
                    computed_delay: self.policy.backoff_delay(attempt, &mut rand::thread_rng()),
                };
                debug!(
                    attempt = retry.attempt_number,
                    delay_secs = retry.computed_delay.as_secs_f64(),
                    "retrying after backoff"
                );
                if race_cancel(cancel, tokio::time::sleep(retry.computed_delay)).await.is_none() {
                    warn!(attempt, "model call was cancelled during backoff");
                    return Err(RagError::Cancelled);
                }
            }

            let last_error = last_error.unwrap_or_else(|| {
                RagError::PipelineError("no attempt was made".to_string())
            });
            error!(attempts = max_attempts, error = %last_error, "exceeded maximum retries");
            Err(RagError::RetriesExhausted { attempts: max_attempts, last_error: Box::new(last_error) })
        }
        .instrument(span)
        .await
    }
}

/// Await `future` unless `cancel` fires first, in which case `None`.
async fn race_cancel<F: Future>(cancel: Option<&CancellationToken>, future: F) -> Option<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => None,
            output = future => Some(output),
        },
        None => Some(future.await),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn transient() -> RagError {
        RagError::ProviderTransient {
            provider: "test".into(),
            status: Some(429),
            message: "rate limited".into(),
        }
    }

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[test]
    fn delay_cap_doubles_until_capped() {
        let policy = RetryPolicy::default();
        let caps: Vec<f64> = (1..=8).map(|n| policy.delay_cap(n).as_secs_f64()).collect();
        assert_eq!(caps, vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 60.0, 60.0]);
        assert_eq!(policy.delay_cap(10_000), Duration::from_secs(60));
    }

    #[test]
    fn mean_delay_grows_with_attempt_until_capped() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        let means: Vec<f64> = (1..=7)
            .map(|n| {
                let total: f64 =
                    (0..2_000).map(|_| policy.backoff_delay(n, &mut rng).as_secs_f64()).sum();
                total / 2_000.0
            })
            .collect();
        for pair in means.windows(2) {
            assert!(pair[0] < pair[1], "means not increasing: {means:?}");
        }
    }

    #[test]
    fn validate_rejects_unusable_policies() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy { max_attempts: 0, ..Default::default() }.validate().is_err());
        assert!(RetryPolicy { timeout: Duration::ZERO, ..Default::default() }.validate().is_err());
        assert!(
            RetryPolicy { max_delay: Duration::from_millis(10), ..Default::default() }
                .validate()
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_success() {
        let calls = counter();
        let invoker = ResilientInvoker::new(RetryPolicy::default());
        let value = invoker
            .invoke(None, |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, RagError>("ok")
                }
            })
            .await
            .unwrap();
        assert_eq!(value, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_then_succeeds() {
        let invoker = ResilientInvoker::new(RetryPolicy::default());
        let attempts = invoker
            .invoke(Some("abc"), |attempt| async move {
                if attempt < 3 { Err(transient()) } else { Ok(attempt) }
            })
            .await
            .unwrap();
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_errors_are_retried_until_exhausted() {
        let calls = counter();
        let invoker = ResilientInvoker::new(RetryPolicy::default());
        let err = invoker
            .invoke(None, |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(RagError::GenerationError {
                        provider: "test".into(),
                        message: "malformed output".into(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            RagError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last_error, RagError::GenerationError { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_attempts_count_against_the_budget() {
        let policy = RetryPolicy { max_attempts: 2, ..Default::default() };
        let invoker = ResilientInvoker::new(policy).with_name("slow");
        let err = invoker
            .invoke(None, |_| async {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok::<_, RagError>(())
            })
            .await
            .unwrap_err();

        match err {
            RagError::RetriesExhausted { attempts: 2, last_error } => {
                assert!(matches!(*last_error, RagError::ProviderTimeout { ref provider, .. } if provider == "slow"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn local_errors_are_not_retried() {
        let calls = counter();
        let invoker = ResilientInvoker::new(RetryPolicy::default());
        let err = invoker
            .invoke(None, |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(RagError::InvalidInput("blank".into()))
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_cancellation_propagates_without_retry() {
        let calls = counter();
        let invoker = ResilientInvoker::new(RetryPolicy::default());
        let err = invoker
            .invoke(None, |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(RagError::Cancelled)
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let calls = counter();
        let token = CancellationToken::new();
        let invoker = ResilientInvoker::new(RetryPolicy::default());
        let err = invoker
            .invoke_with_cancel(&token, None, |_| {
                let calls = calls.clone();
                let token = token.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    token.cancel();
                    Err::<(), _>(transient())
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_running_attempt() {
        let token = CancellationToken::new();
        let invoker = ResilientInvoker::new(RetryPolicy::default());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let err = invoker
            .invoke_with_cancel(&token, None, |_| std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Cancelled));
    }
}
