//! Retry loop: run a closure until success or policy says stop.

use super::classify;
use super::error::FetchError;
use super::policy::{RetryDecision, RetryPolicy};

/// Final result of a retried operation plus how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, FetchError>,
    pub attempts: u32,
}

/// Runs `f` until it succeeds or the retry policy says to stop. `f` receives
/// the 1-based attempt number. On retryable failure, sleeps for the backoff
/// duration then tries again. When transient failures use up the whole
/// budget the last error is wrapped in `FetchError::ExhaustedRetries`.
pub fn run_with_retry<T, F>(policy: &RetryPolicy, mut f: F) -> Attempted<T>
where
    F: FnMut(u32) -> Result<T, FetchError>,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(v) => {
                return Attempted {
                    result: Ok(v),
                    attempts: attempt,
                }
            }
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => {
                        let result = if kind.is_transient() {
                            Err(FetchError::ExhaustedRetries {
                                attempts: attempt,
                                last: Box::new(e),
                            })
                        } else {
                            Err(e)
                        };
                        return Attempted {
                            result,
                            attempts: attempt,
                        };
                    }
                    RetryDecision::RetryAfter(d) => {
                        let backoff_ms = d.as_millis() as u64;
                        tracing::warn!(attempt, error = %e, backoff_ms, "retrying");
                        std::thread::sleep(d);
                        attempt += 1;
                    }
                }
            }
        }
    }
}
