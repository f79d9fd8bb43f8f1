//! Exponential backoff with additive jitter
//!
//! `delay = min(initial * 2^(attempt - 1) + uniform(0, 0.3 * base), max)`
//!
//! Jitter is additive-uniform, never subtractive: the delay for attempt
//! `k` always lands in `[base_k, 1.3 * base_k]` before the cap.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

const JITTER_FACTOR: f64 = 0.3;

/// Delay to sleep after a failed attempt (1-indexed) before the next one.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn backoff_delay(attempt: u32, retry: &RetryConfig) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let base = if exponent >= 63 {
        retry.max_retry_ms
    } else {
        retry
            .initial_retry_ms
            .saturating_mul(1u64 << exponent)
            .min(retry.max_retry_ms)
    };

    let jitter = rand::rng().random_range(0.0..=(base as f64) * JITTER_FACTOR);
    let delay = ((base as f64) + jitter) as u64;
    Duration::from_millis(delay.min(retry.max_retry_ms))
}
