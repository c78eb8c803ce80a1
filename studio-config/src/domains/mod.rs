//! Domain-specific configuration modules

pub mod daemon;
pub mod logging;
pub mod output;
pub mod queue;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Studio configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StudioConfig {
    /// Generation daemon process configuration
    #[serde(default)]
    pub daemon: daemon::DaemonConfig,

    /// Generation queue configuration
    #[serde(default)]
    pub queue: queue::QueueConfig,

    /// Generated media persistence configuration
    #[serde(default)]
    pub output: output::OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl StudioConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.daemon.validate()?;
        self.queue.validate()?;
        self.output.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        serde_yaml::to_string(&StudioConfig::default())
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
