//! Exponential backoff with full jitter.

use rand::Rng;
use std::time::Duration;

/// Deterministic backoff ceiling: `base * 2^(attempt-1)`, capped.
/// Attempt 0 means "no delay".
pub fn backoff_ceiling(attempt: u32, base_ms: u64, cap_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential).min(cap_ms);
    Duration::from_millis(delay_ms)
}

/// Full jitter: a uniform draw over `[0, ceiling]`. Decorrelates retry
/// storms across instances better than fixed-fraction jitter.
pub fn full_jitter(ceiling: Duration) -> Duration {
    let ceiling_ms = ceiling.as_millis() as u64;
    if ceiling_ms == 0 {
        return Duration::from_millis(0);
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling_ms))
}
