//! Generation daemon process configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_path, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How to launch and supervise the generation daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Interpreter or binary to execute
    pub executable: PathBuf,

    /// Script path followed by any extra arguments
    pub args: Vec<String>,

    /// Working directory for the daemon process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Restart the daemon automatically after an unexpected exit
    #[serde(default = "crate::domains::utils::default_true")]
    pub auto_restart: bool,

    /// Consecutive crashes tolerated before auto-restart gives up
    pub max_crashes_before_give_up: u32,

    /// Healthy uptime after which the crash counter starts over
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub crash_stability_window: Duration,

    /// Upper bound of the restart backoff
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub max_restart_delay: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("python3"),
            args: vec!["daemon/studio_daemon.py".to_string()],
            working_dir: None,
            auto_restart: true,
            max_crashes_before_give_up: 5,
            crash_stability_window: Duration::from_secs(300),
            max_restart_delay: Duration::from_secs(30),
        }
    }
}

impl Validatable for DaemonConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_path(&self.executable, "executable", self.domain_name())?;
        validate_positive(
            self.crash_stability_window.as_secs(),
            "crash_stability_window",
            self.domain_name(),
        )?;
        validate_positive(
            self.max_restart_delay.as_secs(),
            "max_restart_delay",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "daemon"
    }
}
