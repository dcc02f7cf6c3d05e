//! Retry, timeout, and fallback primitives
//!
//! These wrappers are the only place the pipeline spends time waiting. The
//! backoff schedule is a pure function ([`compute_delay`]) over an immutable
//! [`RetryPolicy`], with sleeping injected separately so the schedule can be
//! tested without wall-clock waits. The wrappers keep no state between calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{classify, PipelineError};

/// Immutable retry configuration, constructed once per call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total invocation budget, at least 1.
    pub attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling applied to every computed delay.
    pub max_delay: Duration,
    /// Multiplier applied per retry; greater than 1.
    pub backoff_factor: f64,
    /// When enabled, each delay is stretched by a random factor in [1, 2).
    pub jitter: bool,
    /// Evaluated against the last failure before each retry.
    pub should_retry: fn(&PipelineError) -> bool,
}

/// Default eligibility: only transient API categories are worth another try.
fn retry_transient(error: &PipelineError) -> bool {
    classify(error).category.is_retryable()
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget and sensible defaults.
    /// An attempt budget of zero is clamped to one.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            jitter: true,
            should_retry: retry_transient,
        }
    }

    /// The default policy for marketplace API calls: 4 attempts, 500 ms
    /// initial delay, factor 2, 5 s cap, jitter on, transient-only retries.
    pub fn api_default() -> Self {
        Self::new(4)
    }

    /// Sets the delay before the first retry.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the delay ceiling.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Replaces the retry eligibility predicate.
    pub fn with_should_retry(mut self, predicate: fn(&PipelineError) -> bool) -> Self {
        self.should_retry = predicate;
        self
    }
}

/// Computes the delay before the retry following attempt `attempt`
/// (0-indexed): `min(initial * factor^attempt, max)`, stretched by a random
/// factor in [1, 2) when jitter is enabled.
pub fn compute_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let base = policy.initial_delay.as_millis() as f64 * policy.backoff_factor.powi(attempt as i32);
    let capped = base.min(policy.max_delay.as_millis() as f64);
    let stretched = if policy.jitter {
        capped * (1.0 + fastrand::f64())
    } else {
        capped
    };
    Duration::from_millis(stretched as u64)
}

/// Invokes `op` up to `policy.attempts` times, sleeping between attempts per
/// the backoff schedule. A non-retryable failure, or the last failure once
/// the budget is exhausted, is returned immediately without an extra delay.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    with_retry_using(policy, op, tokio::time::sleep).await
}

/// [`with_retry`] with the sleep primitive injected, for schedule tests.
pub async fn with_retry_using<T, F, Fut, S, SFut>(
    policy: &RetryPolicy,
    mut op: F,
    mut sleep: S,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
    S: FnMut(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let next = attempt + 1;
                if next >= attempts || !(policy.should_retry)(&error) {
                    return Err(error);
                }
                let delay = compute_delay(attempt, policy);
                warn!(
                    attempt = next,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after transient failure"
                );
                sleep(delay).await;
                attempt = next;
            }
        }
    }
}

/// Races `op` against a timer. If the timer fires first the operation is
/// dropped and a timeout failure carrying `label` is returned; whichever
/// branch completes cancels the other, so no stray timer outlives the call.
pub async fn with_timeout<T, Fut>(
    label: &str,
    timeout: Duration,
    op: Fut,
) -> Result<T, PipelineError>
where
    Fut: Future<Output = Result<T, PipelineError>>,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::timeout(label, timeout.as_millis() as u64)),
    }
}

/// Runs `primary`; on a failure accepted by `should_fallback`, runs and
/// returns `fallback` instead. Any other failure is re-raised unchanged.
pub async fn with_fallback<T, P, PFut, F, FFut>(
    primary: P,
    fallback: F,
    should_fallback: impl Fn(&PipelineError) -> bool,
) -> Result<T, PipelineError>
where
    P: FnOnce() -> PFut,
    PFut: Future<Output = Result<T, PipelineError>>,
    F: FnOnce() -> FFut,
    FFut: Future<Output = Result<T, PipelineError>>,
{
    match primary().await {
        Ok(value) => Ok(value),
        Err(error) if should_fallback(&error) => {
            debug!(error = %error, "primary failed; taking fallback path");
            fallback().await
        }
        Err(error) => Err(error),
    }
}
