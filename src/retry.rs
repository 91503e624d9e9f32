use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::warn;

/// Bounded exponential backoff for external commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts,
            ..Self::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based), doubled each
    /// time and capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up. The last
/// error is returned with the attempt count attached.
pub fn with_retry<T, F>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt < attempts {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        "{label} failed (attempt {attempt}/{attempts}), retrying in {:.1}s: {error:#}",
                        delay.as_secs_f64()
                    );
                    thread::sleep(delay);
                }
                last_error = Some(error);
            }
        }
    }

    let error = last_error.unwrap_or_else(|| anyhow!("{label} was never attempted"));
    Err(error.context(format!("{label} failed after {attempts} attempt(s)")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::bail;

    use super::{with_retry, RetryPolicy};

    fn instant(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn stops_after_configured_attempts() {
        let mut calls = 0;
        let result: anyhow::Result<()> = with_retry(&instant(3), "tts", |_| {
            calls += 1;
            bail!("engine offline")
        });
        assert_eq!(calls, 3);
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("tts failed after 3 attempt(s)"), "got: {message}");
        assert!(message.contains("engine offline"), "got: {message}");
    }

    #[test]
    fn returns_first_success() {
        let value = with_retry(&instant(5), "tts", |attempt| {
            if attempt < 2 {
                bail!("flaky");
            }
            Ok(attempt)
        })
        .expect("second attempt should succeed");
        assert_eq!(value, 2);
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let mut calls = 0;
        let _ = with_retry(&instant(0), "tts", |_| -> anyhow::Result<()> {
            calls += 1;
            bail!("nope")
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn delay_doubles_up_to_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(5));
    }
}
