//! Generated media persistence configuration

use crate::error::ConfigResult;
use crate::validation::{validate_required_path, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where and how generated media is written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory; outputs land in dated subdirectories
    pub root_dir: PathBuf,

    /// Write a JSON description next to every saved file
    #[serde(default = "crate::domains::utils::default_true")]
    pub write_sidecar: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("studio-output"),
            write_sidecar: true,
        }
    }
}

impl Validatable for OutputConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_path(&self.root_dir, "root_dir", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "output"
    }
}
