//! Bounded retry with fixed backoff for collaborator reads.

use std::thread;
use std::time::Duration;
use tracing::warn;

use crate::domain::error::ScoretraderError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempts run out. The last error is returned.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: impl FnMut() -> Result<T, ScoretraderError>,
) -> Result<T, ScoretraderError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                warn!(operation, attempt, attempts, error = %err, "retrying");
                if !policy.backoff.is_zero() {
                    thread::sleep(policy.backoff);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result = with_retry(&quick(3), "fetch_candles", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(ScoretraderError::data_fetch("fetch_candles", "timeout"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(&quick(3), "get_open_position", || {
            calls.set(calls.get() + 1);
            Err(ScoretraderError::data_fetch("get_open_position", "503"))
        });
        assert!(matches!(result, Err(ScoretraderError::DataFetch { .. })));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(&quick(5), "get_min_order_qty", || {
            calls.set(calls.get() + 1);
            Err(ScoretraderError::Exchange {
                operation: "get_min_order_qty".into(),
                reason: "unknown symbol".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let calls = Cell::new(0);
        let _ = with_retry(&quick(0), "op", || {
            calls.set(calls.get() + 1);
            Ok::<_, ScoretraderError>(())
        });
        assert_eq!(calls.get(), 1);
    }
}
