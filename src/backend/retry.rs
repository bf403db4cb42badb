use std::time::Duration;

use rand::Rng;

/// Up to 3 retries (4 total attempts) on transient failures (§4.1 retry policy).
pub const MAX_RETRIES: u32 = 3;

/// Base delay for the exponential backoff schedule (`initial * 2^attempt`).
const INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Per-request deadline (§4.10): no amount of retrying is allowed to push a
/// single logical query past this wall-clock budget, measured from its
/// first attempt.
pub const MAX_TOTAL_DURATION: Duration = Duration::from_secs(120);

/// A decision about what to do after one failed attempt.
pub enum RetryDecision {
    /// Wait this long, then retry.
    Retry(Duration),
    /// Retries are exhausted or the failure was non-retryable; give up.
    GiveUp,
}

/// Whether an HTTP status is retryable per §4.1: 429 (honoring
/// `Retry-After` separately) and any 5xx. Non-retryable: any other 4xx.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Decide the backoff for `attempt` (0-indexed, i.e. attempt 0 is the
/// delay before the *first* retry). `retry_after_secs` overrides the
/// exponential schedule when the server provided one (429 only).
///
/// Jitter resolves the Open Question in SPEC_FULL.md §4.10: full jitter
/// is applied on top of the exponential schedule so retries from
/// multiple concurrent models don't synchronize, but never on a
/// server-provided `Retry-After` (honoring the server's literal request
/// takes precedence over jitter).
pub fn backoff_for(attempt: u32, retry_after_secs: Option<u64>) -> RetryDecision {
    if attempt >= MAX_RETRIES {
        return RetryDecision::GiveUp;
    }
    if let Some(secs) = retry_after_secs {
        return RetryDecision::Retry(Duration::from_secs(secs));
    }
    let base = INITIAL_DELAY * 2u32.pow(attempt);
    let jittered = base.mul_f64(rand::thread_rng().gen_range(0.0..=1.0));
    RetryDecision::Retry(jittered)
}

/// Clamp a backoff delay so a retry wait never outlives the per-request
/// deadline (§5 "Suspension points" — a retry sleep must still respect
/// the caller's cancellation/deadline budget).
pub fn clamp_to_remaining(delay: Duration, remaining: Duration) -> Duration {
    delay.min(remaining)
}

/// [`backoff_for`], but bounded by [`MAX_TOTAL_DURATION`]: `elapsed` is the
/// time since the logical query's first attempt. If the jittered delay
/// would push total elapsed time past the deadline it's clamped to
/// whatever remains; if nothing remains at all, retrying is pointless and
/// this gives up outright rather than sleeping for zero.
pub fn scheduled_retry(attempt: u32, retry_after_secs: Option<u64>, elapsed: Duration) -> RetryDecision {
    match backoff_for(attempt, retry_after_secs) {
        RetryDecision::Retry(delay) => {
            let remaining = MAX_TOTAL_DURATION.saturating_sub(elapsed);
            if remaining.is_zero() {
                RetryDecision::GiveUp
            } else {
                RetryDecision::Retry(clamp_to_remaining(delay, remaining))
            }
        }
        RetryDecision::GiveUp => RetryDecision::GiveUp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gives_up_after_max_retries() {
        assert!(matches!(
            backoff_for(MAX_RETRIES, None),
            RetryDecision::GiveUp
        ));
    }

    #[test]
    fn honors_retry_after_verbatim() {
        match backoff_for(0, Some(7)) {
            RetryDecision::Retry(d) => assert_eq!(d, Duration::from_secs(7)),
            RetryDecision::GiveUp => panic!("expected retry"),
        }
    }

    #[test]
    fn exponential_schedule_grows_with_attempt() {
        // jitter scales the base delay down to [0, base] — assert the
        // jittered delay never exceeds the un-jittered exponential cap.
        for attempt in 0..MAX_RETRIES {
            match backoff_for(attempt, None) {
                RetryDecision::Retry(d) => {
                    let cap = INITIAL_DELAY * 2u32.pow(attempt);
                    assert!(d <= cap);
                }
                RetryDecision::GiveUp => panic!("expected retry at attempt {attempt}"),
            }
        }
    }

    #[test]
    fn retryable_status_covers_429_and_5xx() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(599));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn clamp_never_exceeds_remaining_budget() {
        let delay = Duration::from_secs(10);
        let remaining = Duration::from_secs(3);
        assert_eq!(clamp_to_remaining(delay, remaining), remaining);
    }

    #[test]
    fn clamp_passes_through_when_delay_fits() {
        let delay = Duration::from_millis(200);
        let remaining = Duration::from_secs(3);
        assert_eq!(clamp_to_remaining(delay, remaining), delay);
    }

    #[test]
    fn scheduled_retry_gives_up_once_the_deadline_is_exhausted() {
        assert!(matches!(
            scheduled_retry(0, None, MAX_TOTAL_DURATION),
            RetryDecision::GiveUp
        ));
    }

    #[test]
    fn scheduled_retry_clamps_a_delay_that_would_overrun_the_deadline() {
        let elapsed = MAX_TOTAL_DURATION - Duration::from_millis(500);
        match scheduled_retry(2, None, elapsed) {
            RetryDecision::Retry(d) => assert!(d <= Duration::from_millis(500)),
            RetryDecision::GiveUp => panic!("expected a clamped retry, not give-up"),
        }
    }

    #[test]
    fn scheduled_retry_honors_retry_after_within_budget() {
        match scheduled_retry(0, Some(2), Duration::from_secs(1)) {
            RetryDecision::Retry(d) => assert_eq!(d, Duration::from_secs(2)),
            RetryDecision::GiveUp => panic!("expected retry"),
        }
    }
}
