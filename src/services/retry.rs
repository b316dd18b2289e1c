//! Bounded retry for remote service calls

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::ServiceError;

/// Retry policy for one remote service
///
/// Controls how many attempts are made, how long each attempt may take
/// and how long to wait between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Double the delay after every attempt instead of keeping it fixed
    pub exponential: bool,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Deadline for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(1),
            exponential: false,
            max_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay between attempts
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Override the per-attempt deadline
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }
}

/// Compute the delay before retry number `attempt` (0-based).
///
/// Fixed policies always wait `base_delay`; exponential ones wait
/// `base_delay * 2^attempt`. Both are capped at `max_delay`.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let delay = if policy.exponential {
        policy
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    } else {
        policy.base_delay
    };

    delay.min(policy.max_delay)
}

/// Run `call` until it succeeds, fails definitively or attempts run out.
///
/// Each attempt is bounded by `policy.attempt_timeout`; an expired deadline
/// counts as [`ServiceError::Timeout`]. Only retryable errors are retried and
/// the last error is returned unchanged.
///
/// # Errors
///
/// Returns the last [`ServiceError`] when no attempt succeeded
pub async fn call_with_retry<T, F, Fut>(
    operation: &'static str,
    policy: &RetryPolicy,
    mut call: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let started = Instant::now();

        let outcome = match tokio::time::timeout(policy.attempt_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout(format!(
                "{operation} gave no response within {}ms",
                policy.attempt_timeout.as_millis()
            ))),
        };

        let elapsed_ms = started.elapsed().as_millis();
        match outcome {
            Ok(value) => {
                tracing::debug!(operation, attempt, elapsed_ms, "service call succeeded");
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = delay_for_attempt(policy, attempt - 1);
                tracing::warn!(
                    operation,
                    attempt,
                    elapsed_ms,
                    retry_in_ms = delay.as_millis(),
                    error = %e,
                    "service call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::warn!(operation, attempt, elapsed_ms, error = %e, "service call failed");
                return Err(e);
            }
        }
    }
}
