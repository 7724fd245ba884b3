//! Retry with exponential backoff
//!
//! TigerStyle: Bounded attempts, bounded delays, deterministic jitter.
//!
//! Only errors classified retriable by [`selkie_core::Error::is_retriable`]
//! are retried; validation and invariant errors fail immediately.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use selkie_core::{
    Error, Result, TimeProvider, PROVIDER_RETRY_ATTEMPTS_MAX, PROVIDER_RETRY_DELAY_MS_INITIAL,
    PROVIDER_RETRY_DELAY_MS_MAX,
};

/// Retry policy for provider calls
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts including the first
    pub attempts_max: u32,
    /// Delay before the first retry in milliseconds
    pub delay_initial_ms: u64,
    /// Ceiling applied to every delay in milliseconds
    pub delay_max_ms: u64,
    /// Multiplier applied per attempt
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts_max: PROVIDER_RETRY_ATTEMPTS_MAX,
            delay_initial_ms: PROVIDER_RETRY_DELAY_MS_INITIAL,
            delay_max_ms: PROVIDER_RETRY_DELAY_MS_MAX,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            attempts_max: 1,
            ..Default::default()
        }
    }

    /// Compute the delay before the retry following `attempt` (0-based)
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let base = self.delay_initial_ms as f64 * self.multiplier.powi(attempt as i32);
        let jitter = (base * 0.1 * deterministic_jitter(attempt)) as u64;
        (base as u64).saturating_add(jitter).min(self.delay_max_ms)
    }
}

/// Deterministic jitter in [0, 1) derived from the attempt number
///
/// Keeps backoff tests reproducible without threading an RNG through.
fn deterministic_jitter(attempt: u32) -> f64 {
    let x = attempt.wrapping_add(1).wrapping_mul(2_654_435_761);
    f64::from(x % 100) / 100.0
}

/// Run an operation with retries per the policy
///
/// Sleeps through the provided [`TimeProvider`], so tests under a manual
/// clock complete instantly.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    time: &Arc<dyn TimeProvider>,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    assert!(policy.attempts_max > 0, "attempts_max must be positive");

    let mut last_error: Option<Error> = None;

    for attempt in 0..policy.attempts_max {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let final_attempt = attempt + 1 == policy.attempts_max;
                if final_attempt || !err.is_retriable() {
                    return Err(err);
                }

                let delay = match err {
                    Error::RateLimited { retry_after_ms, .. } => {
                        retry_after_ms.min(policy.delay_max_ms)
                    }
                    _ => policy.delay_ms(attempt),
                };

                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    attempts_max = policy.attempts_max,
                    delay_ms = delay,
                    error = %err,
                    "Retrying after transient failure"
                );

                time.sleep_ms(delay).await;
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::internal("retry loop exited without error")))
}
