//! Retry policy engine

use log::{debug, info, warn};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::backoff::BackoffCalculator;

/// Upper bound of the random delay added to every backoff
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification hooks an error type exposes to retry policies
pub trait Retryable {
    /// Whether this error represents a cancellation. Cancellations are never retried.
    fn is_cancellation(&self) -> bool {
        false
    }

    /// Whether this error is a transport-level failure (timeout, refused
    /// connection, unreachable host, DNS failure, backend not connected)
    /// rather than an application error reported by the other side.
    fn is_transport_failure(&self) -> bool {
        false
    }
}

/// Returns true when an error message says the daemon process went away or is coming back
pub fn indicates_daemon_restart(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("terminated") || message.contains("restarting")
}

type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Retry policy: bounded attempts, exponential backoff with jitter and an
/// error classification predicate.
pub struct RetryPolicy<E> {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries, before jitter
    pub max_delay: Duration,

    /// Upper bound of the uniform jitter added to each delay
    pub max_jitter: Duration,

    is_retryable: RetryPredicate<E>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            max_jitter: self.max_jitter,
            is_retryable: Arc::clone(&self.is_retryable),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("max_jitter", &self.max_jitter)
            .finish_non_exhaustive()
    }
}

impl<E> RetryPolicy<E> {
    /// Create a policy with a custom retryable predicate
    pub fn new<P>(max_attempts: u32, initial_delay: Duration, max_delay: Duration, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            max_jitter: DEFAULT_MAX_JITTER,
            is_retryable: Arc::new(predicate),
        }
    }

    /// Override the jitter bound
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Whether the policy's predicate classifies `error` as retryable
    pub fn is_retryable(&self, error: &E) -> bool {
        (self.is_retryable)(error)
    }

    /// Calculate the delay that follows the failed attempt with the given 0-based index
    pub fn delay_for_attempt(&self, attempt_index: u32) -> Duration {
        BackoffCalculator::new(self.initial_delay, self.max_delay, self.max_jitter)
            .calculate_delay(attempt_index)
    }
}

impl<E> RetryPolicy<E>
where
    E: Retryable + fmt::Display + 'static,
{
    /// Network-backed generation backends: retry transport failures only,
    /// never HTTP status errors.
    pub fn http_backend() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(10), |error: &E| {
            error.is_transport_failure()
        })
    }

    /// Daemon calls: retry only when the worker terminated or is restarting.
    pub fn daemon_call() -> Self {
        Self::new(2, Duration::from_secs(2), Duration::from_secs(5), |error: &E| {
            indicates_daemon_restart(&error.to_string())
        })
    }

    /// Health checks: retry everything.
    pub fn health_check() -> Self {
        Self::new(2, Duration::from_millis(500), Duration::from_secs(2), |_: &E| true)
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_context(|_attempt| f()).await
    }

    /// Execute an operation with retry logic, passing the 1-based attempt number
    pub async fn execute_with_context<F, Fut, T>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;

        loop {
            debug!("Executing attempt {} of {}", attempt, self.max_attempts);

            match f(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if error.is_cancellation() {
                        debug!("Operation cancelled on attempt {}", attempt);
                        return Err(error);
                    }

                    if !self.is_retryable(&error) {
                        warn!("Operation failed with non-retryable error: {}", error);
                        return Err(error);
                    }

                    if attempt >= self.max_attempts {
                        warn!("Operation failed after {} attempts: {}", attempt, error);
                        return Err(error);
                    }

                    let delay = self.delay_for_attempt(attempt - 1);
                    warn!(
                        "Attempt {} failed: {}. Retrying in {:?}",
                        attempt, error, delay
                    );
                    sleep(delay).await;

                    attempt += 1;
                }
            }
        }
    }
}
