//! Bounded retry for work that may need several attempts, such as building a
//! query until it returns rows.
//!
//! Attempts run synchronously on the calling thread; callers on an async
//! runtime run the executor inside `spawn_blocking`.

use std::time::Duration;
use tracing::{debug, warn};

use crate::observability::GenerationMetrics;

/// Retry policy trait
#[cfg_attr(test, mockall::automock)]
pub trait RetryPolicy: Send + Sync {
    /// `attempt` is zero-based and refers to the attempt that just failed.
    fn should_retry(&self, attempt: u32, error: &dyn std::error::Error) -> bool;
    fn delay(&self, attempt: u32) -> Duration;
    fn max_attempts(&self) -> u32;
}

/// Fixed number of attempts with a constant pause between them
#[derive(Debug, Clone)]
pub struct FixedInterval {
    interval: Duration,
    max_attempts: u32,
}

impl FixedInterval {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Back-to-back attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(Duration::ZERO, max_attempts)
    }
}

impl RetryPolicy for FixedInterval {
    fn should_retry(&self, attempt: u32, _error: &dyn std::error::Error) -> bool {
        attempt + 1 < self.max_attempts
    }

    fn delay(&self, _attempt: u32) -> Duration {
        self.interval
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// No retry policy
#[derive(Debug, Clone)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_retry(&self, _attempt: u32, _error: &dyn std::error::Error) -> bool {
        false
    }

    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }

    fn max_attempts(&self) -> u32 {
        1
    }
}

/// Retry executor
pub struct RetryExecutor<P: RetryPolicy> {
    policy: P,
}

impl<P: RetryPolicy> RetryExecutor<P> {
    pub fn new(policy: P) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Run `operation` until it succeeds or the policy gives up. The operation
    /// receives the zero-based attempt number.
    pub fn execute<F, T, E>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Result<T, E>,
        E: std::error::Error,
    {
        let mut attempt = 0;

        loop {
            match operation(attempt) {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(attempts = attempt + 1, "Operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !self.policy.should_retry(attempt, &error) {
                        if attempt > 0 {
                            warn!(attempts = attempt + 1, %error, "Giving up");
                        }
                        return Err(RetryError::Exhausted {
                            attempts: attempt + 1,
                            last: error,
                        });
                    }

                    let delay = self.policy.delay(attempt);
                    debug!(attempt = attempt + 1, ?delay, %error, "Retrying");
                    GenerationMetrics::retry_attempt();

                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Retry-specific errors
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("Operation failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    /// The error of the final attempt.
    pub fn into_last(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// Convenience function to create a fixed interval executor
pub fn fixed_interval(interval: Duration, max_attempts: u32) -> RetryExecutor<FixedInterval> {
    RetryExecutor::new(FixedInterval::new(interval, max_attempts))
}

/// Convenience function to create a no-retry executor
pub fn no_retry() -> RetryExecutor<NoRetry> {
    RetryExecutor::new(NoRetry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, thiserror::Error)]
    #[error("Test error")]
    struct TestError;

    #[test]
    fn test_fixed_interval_success_after_retries() {
        let executor = RetryExecutor::new(FixedInterval::immediate(3));
        let calls = Cell::new(0);

        let result = executor.execute(|attempt| {
            calls.set(calls.get() + 1);
            if attempt < 2 {
                Err(TestError)
            } else {
                Ok("success")
            }
        });

        assert_eq!(result.unwrap(), "success");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_fixed_interval_exhausts() {
        let executor = fixed_interval(Duration::from_millis(1), 2);
        let calls = Cell::new(0);

        let result: Result<(), _> = executor.execute(|_| {
            calls.set(calls.get() + 1);
            Err(TestError)
        });

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 2, .. })));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_no_retry() {
        let executor = no_retry();
        let calls = Cell::new(0);

        let result: Result<(), _> = executor.execute(|_| {
            calls.set(calls.get() + 1);
            Err(TestError)
        });

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
        assert_eq!(executor.policy().max_attempts(), 1);
    }

    #[test]
    fn test_policy_is_consulted_per_failure() {
        let mut policy = MockRetryPolicy::new();
        policy
            .expect_should_retry()
            .withf(|attempt, _| *attempt == 0)
            .times(1)
            .return_const(true);
        policy
            .expect_should_retry()
            .withf(|attempt, _| *attempt == 1)
            .times(1)
            .return_const(false);
        policy.expect_delay().times(1).return_const(Duration::ZERO);

        let executor = RetryExecutor::new(policy);
        let result: Result<(), _> = executor.execute(|_| Err(TestError));

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Operation failed after 2 attempts: Test error");
        assert!(matches!(err.into_last(), TestError));
    }
}
