//! Bounded exponential backoff for calls to upstream services.

use std::fmt;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

/// Retry policy for transient upstream failures.
///
/// Delay doubles after each failed attempt: `base, 2*base, 4*base, ...`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given retry (1-based attempt that just failed).
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << (attempt.saturating_sub(1)).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Runs `op` up to `policy.max_attempts` times, sleeping between attempts.
///
/// Only errors for which `is_retryable` returns true are retried; all other
/// errors (and the final attempt's error) are returned to the caller.
pub fn with_backoff<T, E, F, R>(
    policy: &RetryPolicy,
    op_name: &str,
    is_retryable: R,
    mut op: F,
) -> Result<T, E>
where
    E: fmt::Display,
    F: FnMut() -> Result<T, E>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 1u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_retryable(&e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    op = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient failure"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_succeeds_first_try() {
        let calls = Cell::new(0u32);
        let result: Result<u32, String> =
            with_backoff(&RetryPolicy::default(), "op", |_| true, || {
                calls.set(calls.get() + 1);
                Ok(42)
            });
        assert_eq!(result, Ok(42));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_retries_then_succeeds() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
        };
        let calls = Cell::new(0u32);
        let result: Result<u32, String> = with_backoff(&policy, "op", |_| true, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err("transient".to_string())
            } else {
                Ok(7)
            }
        });
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_exhausts_attempts() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
        };
        let calls = Cell::new(0u32);
        let result: Result<u32, String> = with_backoff(&policy, "op", |_| true, || {
            calls.set(calls.get() + 1);
            Err("down".to_string())
        });
        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_non_retryable_fails_immediately() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 1,
        };
        let calls = Cell::new(0u32);
        let result: Result<u32, String> = with_backoff(&policy, "op", |_| false, || {
            calls.set(calls.get() + 1);
            Err("fatal".to_string())
        });
        assert_eq!(result, Err("fatal".to_string()));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 100,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }
}
