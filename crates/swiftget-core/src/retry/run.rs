//! Cancel-aware retry loop.

use std::time::Duration;

use rand::Rng;

use crate::control::CancelToken;

use super::classify;
use super::error::TransferError;
use super::policy::{RetryDecision, RetryPolicy};

/// Granularity of the backoff sleep, so cancellation during a wait is
/// observed quickly.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Runs `attempt_fn` until it succeeds, the policy gives up, or the token is
/// canceled. Once cancellation is observed no further attempt is made and the
/// last error is returned as-is.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut attempt_fn: F,
) -> Result<T, TransferError>
where
    F: FnMut() -> Result<T, TransferError>,
{
    let mut attempt = 1u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) => {
                if cancel.is_canceled() {
                    return Err(e);
                }
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(delay) => {
                        tracing::debug!(
                            attempt,
                            ?kind,
                            delay_ms = delay.as_millis() as u64,
                            "retrying transfer: {}",
                            e
                        );
                        if !sleep_cancelable(with_jitter(delay, policy.jitter), cancel) {
                            return Err(e);
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }
}

/// Randomize `delay` by ±`jitter` so synchronized workers do not reconnect in
/// lockstep.
fn with_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    delay.mul_f64(factor.max(0.0))
}

/// Sleep in slices, returning false as soon as cancellation is observed.
fn sleep_cancelable(total: Duration, cancel: &CancelToken) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if cancel.is_canceled() {
            return false;
        }
        let slice = remaining.min(SLEEP_SLICE);
        std::thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
    !cancel.is_canceled()
}
