//! Retry logic with exponential backoff for handling transient failures.
//!
//! The store wraps every journal append in [`retry_with_backoff`]; callers that
//! talk to other flaky collaborators can use it directly.
//!
//! # Example
//!
//! ```rust
//! use supportdesk_runtime::retry::{RetryPolicy, retry_with_backoff};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::new()
//!     .with_max_attempts(3)
//!     .with_initial_delay(Duration::from_millis(10));
//!
//! let value = retry_with_backoff(&policy, "example", || async {
//!     Ok::<_, String>(42)
//! })
//! .await
//! .map_err(|exhausted| exhausted.error)?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::time::Duration;

/// Retry policy for handling transient failures
///
/// Implements exponential backoff with jitter.
///
/// Defaults:
/// - `max_attempts`: 5 (including the initial attempt)
/// - `initial_delay`: 100ms
/// - `max_delay`: 10 seconds
/// - `backoff_multiplier`: 2.0
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Create a new retry policy with default settings
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }

    /// Set maximum attempts (including the initial attempt, minimum 1)
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// Set initial delay before first retry
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay between retries
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier for exponential backoff
    #[must_use]
    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculate delay for a given attempt number (0-indexed)
    ///
    /// `delay = min(initial_delay * multiplier^attempt, max_delay) * random(0.5..=1.0)`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64());

        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_secs_f64(capped_secs * jitter)
    }

    /// Get maximum number of attempts
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Check if another attempt is allowed after `attempts` have been made
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// The last error of an operation that ran out of attempts.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Error returned by the final attempt
    pub error: E,
    /// How many attempts were made
    pub attempts: u32,
}

/// Retry an async operation with exponential backoff.
///
/// # Errors
///
/// Returns [`Exhausted`] with the last error once the policy allows no further
/// attempts.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempts > 0 {
                    metrics::counter!("store.retry.success", "operation" => operation_name.to_string())
                        .increment(1);
                    tracing::info!(
                        operation = operation_name,
                        attempts = attempts + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            },
            Err(error) => {
                attempts += 1;
                if !policy.should_retry(attempts) {
                    metrics::counter!("store.retry.exhausted", "operation" => operation_name.to_string())
                        .increment(1);
                    tracing::error!(
                        operation = operation_name,
                        attempts,
                        error = %error,
                        "Operation failed after exhausting retries"
                    );
                    return Err(Exhausted { error, attempts });
                }

                let delay = policy.delay_for_attempt(attempts - 1);
                metrics::counter!("store.retry.attempt", "operation" => operation_name.to_string())
                    .increment(1);
                tracing::warn!(
                    operation = operation_name,
                    attempts,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "Operation failed, retrying after delay"
                );
                tokio::time::sleep(delay).await;
            },
        }
    }
}
