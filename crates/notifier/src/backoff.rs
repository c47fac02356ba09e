//! Backoff policy for long-polling workers

use std::time::Duration;
use tokio::time::Instant;

/// Delay for `failures` consecutive failures.
///
/// Grows linearly with the failure count and is clamped to `max` once
/// `failures` exceeds `max_failures`. No failures means no delay beyond
/// `min`.
pub fn failure_backoff(failures: u32, min: Duration, max: Duration, max_failures: u32) -> Duration {
    if failures == 0 {
        return min;
    }
    if max_failures == 0 || failures > max_failures {
        return max;
    }

    let step = max.saturating_sub(min) / max_failures;
    step * failures
}

/// Raise `backoff` so consecutive calls start at least `min_spacing` apart
pub fn pace(backoff: Duration, elapsed: Duration, min_spacing: Duration) -> Duration {
    backoff.max(min_spacing.saturating_sub(elapsed))
}

/// Failure count after a call finished at `now`.
///
/// A failed call counts as a failure. So does a successful one when the
/// call `window_calls` starts ago (`window_oldest`) began less than
/// `window` before `now`. Any other success resets the count.
pub fn next_failures(
    failures: u32,
    succeeded: bool,
    window_oldest: Option<Instant>,
    now: Instant,
    window: Duration,
) -> u32 {
    if !succeeded {
        return failures.saturating_add(1);
    }

    let too_fast = window_oldest.is_some_and(|oldest| now.saturating_duration_since(oldest) < window);
    if too_fast {
        failures.saturating_add(1)
    } else {
        0
    }
}
