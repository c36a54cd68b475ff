//! Retry utilities with exponential backoff, bounded by an invocation budget.
//!
//! Provider calls are retried in-invocation for transient failures only.
//! A backoff delay that would cross the invocation deadline abandons the
//! remaining attempts instead of blowing the budget, and an in-flight
//! attempt (a slow provider call or a long poll loop) is cut off at the
//! deadline itself; the claimed project is picked up again by a later
//! invocation.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Errors that are worth another in-invocation attempt.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for rpilot_genai::GenAiError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

impl Transient for rpilot_firestore::FirestoreError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_retries: std::env::var("RETRY_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            base_delay: Duration::from_millis(
                std::env::var("RETRY_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            max_delay: Duration::from_millis(
                std::env::var("RETRY_MAX_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8000),
            ),
        }
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay for exponential backoff.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Calculate delay for a given attempt number.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }
}

/// Wall-clock budget for one invocation.
#[derive(Debug, Clone)]
pub struct Budget {
    deadline: Instant,
}

impl Budget {
    /// Start a budget of the given length from now.
    pub fn new(limit: Duration) -> Self {
        Self {
            deadline: Instant::now() + limit,
        }
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Whether a delay of this length fits before the deadline.
    pub fn allows(&self, delay: Duration) -> bool {
        delay < self.remaining()
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed terminally, or exhausted its in-invocation attempts.
    Failed { error: E, attempts: u32 },
    /// The invocation budget ran out before the attempts did. The operation
    /// has not failed terminally; a later invocation picks it up again.
    OutOfBudget { attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    /// Returns true if the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }
}

/// Execute an async operation with budget-bounded retry.
///
/// Only transient errors are re-attempted; a non-transient error fails
/// immediately with the attempt count so far. Every attempt runs under a
/// timeout of the remaining budget, so no single call can overrun the
/// invocation deadline.
pub async fn run_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    budget: &Budget,
    operation_name: &str,
    operation: F,
) -> RetryResult<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + Transient,
{
    if budget.is_exhausted() {
        warn!("{}: invocation budget exhausted before first attempt", operation_name);
        return RetryResult::OutOfBudget { attempts: 0 };
    }

    let mut attempt = 0u32;

    loop {
        let result = match tokio::time::timeout(budget.remaining(), operation()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "{}: in-flight attempt hit the invocation deadline, abandoning",
                    operation_name
                );
                return RetryResult::OutOfBudget {
                    attempts: attempt + 1,
                };
            }
        };
        match result {
            Ok(value) => return RetryResult::Success(value),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                let delay = config.delay_for_attempt(attempt);
                if !budget.allows(delay) {
                    warn!(
                        "{} attempt {} failed and backoff exceeds the remaining budget, abandoning: {}",
                        operation_name, attempt, e
                    );
                    return RetryResult::OutOfBudget { attempts: attempt };
                }
                debug!(
                    "{} attempt {} failed, retrying in {:?}: {}",
                    operation_name, attempt, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return RetryResult::Failed {
                    error: e,
                    attempts: attempt + 1,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(3)
            .with_base_delay(Duration::from_millis(1))
    }

    fn wide_budget() -> Budget {
        Budget::new(Duration::from_secs(10))
    }

    #[test]
    fn test_delay_calculation_doubles_and_caps() {
        let config = RetryConfig::default().with_base_delay(Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
        assert!(config.delay_for_attempt(20) <= config.max_delay);
    }

    #[tokio::test]
    async fn test_eventual_success() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(&fast_config(), &wide_budget(), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_fails_without_retry() {
        let calls = AtomicU32::new(0);
        let result: RetryResult<(), _> = run_with_retry(&fast_config(), &wide_budget(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Permanent) }
        })
        .await;

        assert!(matches!(result, RetryResult::Failed { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_error_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: RetryResult<(), _> = run_with_retry(&fast_config(), &wide_budget(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Transient) }
        })
        .await;

        assert!(matches!(result, RetryResult::Failed { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_exhausted_budget_blocks_first_attempt() {
        let calls = AtomicU32::new(0);
        let budget = Budget::new(Duration::ZERO);
        let result: RetryResult<(), TestError> =
            run_with_retry(&fast_config(), &budget, "op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, RetryResult::OutOfBudget { attempts: 0 }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backoff_crossing_deadline_abandons() {
        let config = RetryConfig::default()
            .with_max_retries(5)
            .with_base_delay(Duration::from_secs(30));
        let budget = Budget::new(Duration::from_millis(50));
        let calls = AtomicU32::new(0);

        let result: RetryResult<(), _> = run_with_retry(&config, &budget, "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Transient) }
        })
        .await;

        // One attempt ran; the 60s backoff did not fit in the 50ms budget
        assert!(matches!(result, RetryResult::OutOfBudget { attempts: 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_in_flight_attempt_abandoned_at_deadline() {
        let budget = Budget::new(Duration::from_millis(20));
        let result: RetryResult<(), TestError> =
            run_with_retry(&fast_config(), &budget, "op", || async {
                // Outlives the budget by orders of magnitude
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, RetryResult::OutOfBudget { attempts: 1 }));
    }
}
