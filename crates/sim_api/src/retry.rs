use std::time::Duration;

/// Reconnection attempts allowed after an unexpected disconnect.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Delay before the first reconnection attempt.
pub const BASE_DELAY_MS: u64 = 1000;
/// Upper bound for any single reconnection delay.
pub const MAX_DELAY_MS: u64 = 5000;

/// Compute the capped exponential backoff for a 1-based reconnection attempt.
///
/// Attempt `0` is treated as attempt `1`.
pub fn reconnect_delay(attempt: u32) -> Duration {
    backoff_delay(attempt, BASE_DELAY_MS, MAX_DELAY_MS)
}

/// Capped exponential backoff with explicit bounds.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(30);
    let delay = base_ms.saturating_mul(2u64.saturating_pow(exponent));
    Duration::from_millis(delay.min(max_ms))
}

/// Statuses worth reconnecting after when opening the event stream.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}
