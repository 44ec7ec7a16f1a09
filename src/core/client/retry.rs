// src/core/client/retry.rs

use crate::config::RetrySettings;
use rand::Rng;
use std::time::Duration;

/// Computes the wait before retry number `attempt` (0-based): exponential growth
/// from `min_backoff`, capped at `max_backoff`, with jitter in the upper half.
/// The result always lies within `[min_backoff, max_backoff]`.
pub fn backoff_delay(attempt: u32, retry: &RetrySettings) -> Duration {
    let base = retry
        .min_backoff
        .saturating_mul(1u32 << attempt.min(16))
        .min(retry.max_backoff);
    if base.is_zero() {
        return base;
    }
    let low = (base / 2).max(retry.min_backoff).min(base);
    rand::thread_rng().gen_range(low..=base)
}
