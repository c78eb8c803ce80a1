//! Generation queue configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};

/// Generation queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of items held by the queue, finished items included
    pub max_queue_size: usize,

    /// Persist outputs of completed items
    #[serde(default = "crate::domains::utils::default_true")]
    pub auto_save: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 50,
            auto_save: true,
        }
    }
}

impl Validatable for QueueConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.max_queue_size, "max_queue_size", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "queue"
    }
}
