use std::thread::sleep;
use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

const DEFAULT_WAIT_ATTEMPTS: usize = 60;
const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(5);

/// How long to poll the cluster for a condition before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WaitPolicy {
    pub attempts: usize,
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_WAIT_ATTEMPTS,
            interval: DEFAULT_WAIT_INTERVAL,
        }
    }
}

impl WaitPolicy {
    pub fn new(attempts: usize, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

/// Retries the execution of `f` after the `interval` has elapsed, until `max_attempts` is reached.
/// Returns the result of the first successful execution of `f` or the latest error if all attempts fail.
/// `f` is always executed at least once.
pub fn retry<F, T, E>(max_attempts: usize, interval: Duration, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match f() {
            Ok(result) => return Ok(result),
            Err(err) if attempt >= attempts => return Err(err),
            Err(_) => {
                attempt += 1;
                sleep(interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_success() {
        let result: Result<&str, &str> = retry(3, Duration::from_millis(10), || Ok("success"));
        assert_eq!(result, Ok("success"));
    }

    #[test]
    fn test_retry_failure() {
        let mut calls = 0;
        let result: Result<&str, &str> = retry(3, Duration::from_millis(1), || {
            calls += 1;
            Err("failure")
        });
        assert_eq!(result, Err("failure"));
        assert_eq!(3, calls);
    }

    #[test]
    fn test_retry_with_multiple_attempts() {
        let mut attempts = 0;
        let result = retry(3, Duration::from_millis(10), || {
            attempts += 1;
            if attempts < 3 {
                Err("try again")
            } else {
                Ok("finally succeeded")
            }
        });
        assert_eq!(result, Ok("finally succeeded"));
    }

    #[test]
    fn test_retry_zero_attempts_runs_once() {
        let mut calls = 0;
        let result: Result<(), &str> = retry(0, Duration::from_millis(1), || {
            calls += 1;
            Err("nope")
        });
        assert_eq!(result, Err("nope"));
        assert_eq!(1, calls);
    }

    #[test]
    fn test_wait_policy_from_yaml() {
        let policy: WaitPolicy = serde_yaml::from_str("attempts: 3\ninterval: 2s").unwrap();
        assert_eq!(WaitPolicy::new(3, Duration::from_secs(2)), policy);

        let policy: WaitPolicy = serde_yaml::from_str("attempts: 7").unwrap();
        assert_eq!(WaitPolicy::new(7, DEFAULT_WAIT_INTERVAL), policy);
    }
}
