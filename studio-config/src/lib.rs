//! Domain-driven configuration management for Studio
//!
//! Configuration is split by functional domain (daemon, queue, output,
//! logging), with defaults, YAML loading, environment variable overrides
//! and validation.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    daemon::DaemonConfig,
    logging::{LogLevel, LoggingConfig},
    output::OutputConfig,
    queue::QueueConfig,
    StudioConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
