//! Retry with exponential backoff for transient task failures

use std::time::Duration;

use crate::error::TaskError;

/// Exponential backoff: 2^attempt seconds (2s, 4s, 8s, ...)
pub const fn backoff_duration(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt))
}

/// Retry a fallible task operation with exponential backoff.
///
/// Retryable errors are logged and retried up to `max_retries`; fatal
/// errors return immediately. Returns `Ok(T)` on first success, or the
/// final `Err` on exhaustion.
pub fn retry_with_backoff<T>(
    label: &str,
    max_retries: u32,
    mut attempt_fn: impl FnMut() -> Result<T, TaskError>,
) -> Result<T, TaskError> {
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_retries && e.is_retryable() => {
                attempt += 1;
                log::debug!("{label}: attempt {attempt}/{max_retries} failed: {e}, retrying...");
                std::thread::sleep(backoff_duration(attempt));
            }
            Err(e) => {
                log::error!("{label}: failed permanently: {e}");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_exponential() {
        assert_eq!(backoff_duration(1), Duration::from_secs(2));
        assert_eq!(backoff_duration(2), Duration::from_secs(4));
        assert_eq!(backoff_duration(3), Duration::from_secs(8));
    }

    #[test]
    fn fatal_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = retry_with_backoff("t", 3, || {
            calls += 1;
            Err(TaskError::Fatal("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn retryable_exhausts_budget() {
        let mut calls = 0;
        let result: Result<(), _> = retry_with_backoff("t", 1, || {
            calls += 1;
            Err(TaskError::Retryable("flaky".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn succeeds_without_retry() {
        let result = retry_with_backoff("t", 3, || Ok::<_, TaskError>(7));
        assert_eq!(result.unwrap(), 7);
    }
}
