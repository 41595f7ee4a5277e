// src/retry.rs
//! Bounded exponential backoff applied at every external-call boundary.

use std::future::Future;
use std::time::Duration;

use metrics::counter;

use crate::error::CallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_delay: Duration,
    /// Upper bound on the sum of all sleeps for one call.
    pub max_total_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_total_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_total_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_total_delay,
        }
    }

    /// Same attempt budget, no sleeping. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before attempt `attempt + 1`, given `attempt` failures so far (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }

    /// Run `op` until it succeeds, fails permanently, or the budget runs out.
    /// Exhaustion on a transient error returns [`CallError::Exhausted`].
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let max = self.max_attempts.max(1);
        let mut waited = Duration::ZERO;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(v) => return Ok(v),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => e,
            };

            let delay = self.delay_after(attempt);
            let over_budget = waited.saturating_add(delay) > self.max_total_delay;
            if attempt >= max || over_budget {
                tracing::warn!(op = what, attempt, error = %err, "retries exhausted");
                return Err(CallError::Exhausted {
                    attempts: attempt,
                    last: err.to_string(),
                });
            }

            counter!("pipeline_retry_attempts_total").increment(1);
            tracing::debug!(op = what, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            waited += delay;
        }
    }
}
