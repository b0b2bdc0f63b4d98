//! Retry policy for async operations.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// How delays grow between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt-1)` with jitter, capped at `max_delay`
    Exponential,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    pub fn linear(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: base_delay.saturating_mul(max_retries.max(1)),
            strategy: BackoffStrategy::Linear,
        }
    }

    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt).min(self.max_delay),
            BackoffStrategy::Exponential => calculate_backoff(
                attempt,
                self.base_delay.as_millis() as u64,
                self.max_delay.as_millis() as u64,
            ),
        }
    }

    pub fn none() -> Self {
        Self::linear(0, Duration::ZERO)
    }
}

/// Delay for retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `max_ms`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let capped = base_ms
        .saturating_mul(2u64.saturating_pow(attempt - 1))
        .min(max_ms);
    let jitter = match capped / 10 {
        0 => 0,
        spread => rand::thread_rng().gen_range(0..spread),
    };
    Duration::from_millis(capped + jitter)
}

/// Run `op` until it succeeds, its error is not retryable, or retries run out.
///
/// Returns the last error together with the number of attempts made.
pub async fn retry_async<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    is_retryable: R,
    mut op: F,
) -> Result<T, (E, u32)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt > policy.max_retries || !is_retryable(&e) {
                    return Err((e, attempt));
                }
                tokio::time::sleep(policy.delay(attempt)).await;
            }
        }
    }
}
