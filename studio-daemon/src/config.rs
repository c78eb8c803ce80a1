//! Supervisor configuration

use std::path::PathBuf;
use std::time::Duration;
use studio_config::DaemonConfig;

/// Runtime settings of a [`crate::DaemonSupervisor`]
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub auto_restart: bool,
    pub max_crashes_before_give_up: u32,
    pub crash_stability_window: Duration,
    /// Delay before the first restart; doubled for every further crash
    pub restart_base_delay: Duration,
    pub max_restart_delay: Duration,
    /// How long to wait for buffered output after the process exits
    pub output_drain_timeout: Duration,
}

impl SupervisorConfig {
    pub fn new(executable: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
            ..Self::default()
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from(&DaemonConfig::default())
    }
}

impl From<&DaemonConfig> for SupervisorConfig {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
            auto_restart: config.auto_restart,
            max_crashes_before_give_up: config.max_crashes_before_give_up,
            crash_stability_window: config.crash_stability_window,
            restart_base_delay: Duration::from_secs(1),
            max_restart_delay: config.max_restart_delay,
            output_drain_timeout: Duration::from_secs(2),
        }
    }
}
