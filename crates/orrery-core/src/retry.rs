// Exponential backoff for session opening.

use std::time::Duration;

use crate::config::RetryConfig;

/// Delay before retry number `attempt` (0-based).
///
/// `delay = min(initial * 2^attempt, max)` with +-25% deterministic jitter.
pub(crate) fn backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
    let capped = base.min(config.max_delay.as_secs_f64());

    // Seeded from the attempt number; only needs to spread concurrent reconnects.
    let jitter = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter).max(0.0))
}
