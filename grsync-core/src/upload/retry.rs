use std::time::Duration;

use crate::error::Result;

/// Bounded exponential backoff for a single service call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX))
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The last error is returned on exhaustion.
pub fn retry_with_backoff<T>(
    policy: &RetryPolicy,
    op_name: &str,
    mut f: impl FnMut(u32) -> Result<T>,
) -> Result<T> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match f(attempt) {
            Ok(val) => return Ok(val),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    "{op_name}: transient error (attempt {attempt}/{attempts}), retrying in {delay:?}: {e}"
                );
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!("{op_name}: giving up after {attempts} attempts: {e}");
                }
                return Err(e);
            }
        }
    }
}
