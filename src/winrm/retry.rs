//! Fixed-delay retry for remote operations.
//!
//! Retries cover transport failures only: an operation that reaches the
//! remote shell and comes back with a nonzero exit code is a success at
//! this layer and must not be re-run, since the remote command may already
//! have had side effects.

use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::error::{Error, Result};

/// Bounded fixed-delay retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given attempt bound and inter-attempt
    /// delay. An attempt bound of zero is normalized to one: the loop
    /// always makes at least one attempt.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Maximum number of attempts, always at least one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Runs `operation` until it succeeds or the policy is exhausted.
///
/// No delay follows the final attempt. On exhaustion the returned
/// [`Error::RetryExhausted`] carries the attempt count and the last
/// underlying error.
pub fn run_with_retry<T, F>(policy: &RetryPolicy, operation: F, what: &str) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    run_with_sleep(policy, operation, thread::sleep, what)
}

fn run_with_sleep<T, F, S>(
    policy: &RetryPolicy,
    mut operation: F,
    mut sleep: S,
    what: &str,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
    S: FnMut(Duration),
{
    let mut attempt = 1;

    loop {
        debug!("{} attempt {}/{}", what, attempt, policy.max_attempts);

        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                warn!("{} attempt {} failed: {}", what, attempt, e);

                if attempt >= policy.max_attempts {
                    return Err(Error::RetryExhausted {
                        attempts: policy.max_attempts,
                        source: Box::new(e),
                    });
                }

                debug!("Retrying in {:?}", policy.delay);
                sleep(policy.delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_zero_attempts_normalized_to_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_success_on_first_attempt() {
        let mut calls = 0;
        let mut sleeps = 0;

        let result = run_with_sleep(
            &fast_policy(3),
            || {
                calls += 1;
                Ok(42)
            },
            |_| sleeps += 1,
            "test operation",
        );

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
        assert_eq!(sleeps, 0);
    }

    #[test]
    fn test_success_after_two_failures() {
        let mut calls = 0;
        let mut sleeps = 0;

        let result = run_with_sleep(
            &fast_policy(3),
            || {
                calls += 1;
                if calls < 3 {
                    Err(Error::Transport("connection reset".to_string()))
                } else {
                    Ok("done")
                }
            },
            |_| sleeps += 1,
            "test operation",
        );

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls, 3);
        // A delay between each pair of attempts, none after success.
        assert_eq!(sleeps, 2);
    }

    #[test]
    fn test_exhaustion_reports_attempts_and_last_error() {
        let mut calls = 0;
        let mut sleeps = 0;

        let result: Result<()> = run_with_sleep(
            &fast_policy(2),
            || {
                calls += 1;
                Err(Error::Transport(format!("failure {}", calls)))
            },
            |_| sleeps += 1,
            "test operation",
        );

        assert_eq!(calls, 2);
        // No delay after the final attempt.
        assert_eq!(sleeps, 1);

        match result.unwrap_err() {
            Error::RetryExhausted { attempts, source } => {
                assert_eq!(attempts, 2);
                assert!(source.to_string().contains("failure 2"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_sleep_uses_policy_delay() {
        let policy = RetryPolicy::new(2, Duration::from_millis(17));
        let mut observed = Vec::new();

        let _: Result<()> = run_with_sleep(
            &policy,
            || Err(Error::Transport("nope".to_string())),
            |d| observed.push(d),
            "test operation",
        );

        assert_eq!(observed, vec![Duration::from_millis(17)]);
    }

    #[test]
    fn test_public_wrapper_retries() {
        let mut calls = 0;
        let policy = RetryPolicy::new(2, Duration::from_millis(1));

        let result = run_with_retry(
            &policy,
            || {
                calls += 1;
                if calls == 1 {
                    Err(Error::Transport("flaky".to_string()))
                } else {
                    Ok(calls)
                }
            },
            "test operation",
        );

        assert_eq!(result.unwrap(), 2);
    }
}
