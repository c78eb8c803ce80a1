//! Configuration loading and environment variable handling

use crate::domains::StudioConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "STUDIO".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<StudioConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: StudioConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<StudioConfig> {
        let mut config = StudioConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load from a file when one is given, otherwise from the environment
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<StudioConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut StudioConfig) -> ConfigResult<()> {
        self.apply_daemon_overrides(&mut config.daemon)?;
        self.apply_queue_overrides(&mut config.queue)?;
        self.apply_output_overrides(&mut config.output)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_daemon_overrides(
        &self,
        config: &mut crate::domains::daemon::DaemonConfig,
    ) -> ConfigResult<()> {
        if let Ok(executable) = self.get_env_var("DAEMON_EXECUTABLE") {
            config.executable = PathBuf::from(executable);
        }

        // The script replaces the whole argument list
        if let Ok(script) = self.get_env_var("DAEMON_SCRIPT") {
            config.args = vec![script];
        }

        if let Ok(auto_restart) = self.get_env_var("DAEMON_AUTO_RESTART") {
            config.auto_restart = auto_restart.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid DAEMON_AUTO_RESTART: {}", e))
            })?;
        }

        if let Ok(max_crashes) = self.get_env_var("DAEMON_MAX_CRASHES") {
            config.max_crashes_before_give_up = max_crashes.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid DAEMON_MAX_CRASHES: {}", e))
            })?;
        }

        Ok(())
    }

    fn apply_queue_overrides(
        &self,
        config: &mut crate::domains::queue::QueueConfig,
    ) -> ConfigResult<()> {
        if let Ok(size) = self.get_env_var("MAX_QUEUE_SIZE") {
            config.max_queue_size = size
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid MAX_QUEUE_SIZE: {}", e)))?;
        }

        if let Ok(auto_save) = self.get_env_var("AUTO_SAVE") {
            config.auto_save = auto_save
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid AUTO_SAVE: {}", e)))?;
        }

        Ok(())
    }

    fn apply_output_overrides(
        &self,
        config: &mut crate::domains::output::OutputConfig,
    ) -> ConfigResult<()> {
        if let Ok(dir) = self.get_env_var("OUTPUT_DIR") {
            config.root_dir = PathBuf::from(dir);
        }

        Ok(())
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            use std::str::FromStr;
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
