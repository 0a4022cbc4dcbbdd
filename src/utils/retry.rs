// @file: kline_engine/src/utils/retry.rs
// @description: Explicit retry policy and a thin async wrapper that applies it.
// @author: LAS.

use log::warn;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use crate::core::errors::KlineError;


//
// POLICY
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor: u32 = 2u32.saturating_pow(retry.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(delay),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::fixed(3, Duration::from_secs(5))
    }
}


//
// WRAPPER
//

/// Runs `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// `op` receives the 1-based attempt number. Only errors for which
/// [`KlineError::is_transient`] holds are retried. Cancellation interrupts the
/// wait between attempts, never an attempt in flight.
pub async fn retry_with<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> Result<T, KlineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, KlineError>>,
{
    let mut attempt: u32 = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay: Duration = policy.backoff.delay(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    label, attempt, policy.max_attempts, e, delay
                );

                if !sleep_or_cancel(delay, cancel).await {
                    return Err(KlineError::Cancelled);
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Cooperative wait. Returns `false` when the token fired first.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
