//! Resilience patterns for Studio
//!
//! This crate provides the retry policy engine used to harden daemon calls,
//! health checks and network-backed generation backends.

pub mod backoff;
pub mod retry;

// Re-export commonly used types
pub use backoff::BackoffCalculator;
pub use retry::{indicates_daemon_restart, RetryPolicy, Retryable, DEFAULT_MAX_JITTER};
