//! Queue entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use studio_interfaces::{GenerationMetadata, GenerationParameters, GenerationRequest, GenerationType};

/// Lifecycle of a queued generation: `Pending -> Running -> terminal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl GenerationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationStatus::Completed | GenerationStatus::Failed | GenerationStatus::Cancelled
        )
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Running => "running",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
            GenerationStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", status)
    }
}

/// One job in the generation queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedGeneration {
    pub id: Uuid,
    pub prompt: String,
    pub negative_prompt: String,
    pub parameters: GenerationParameters,
    pub generation_type: GenerationType,
    pub status: GenerationStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure reason, only set for `Failed`
    pub error: Option<String>,
    /// Files written by auto-save
    pub output_paths: Vec<PathBuf>,
    /// What the backend reported for a completed job
    pub metadata: Option<GenerationMetadata>,
}

impl QueuedGeneration {
    pub fn new(
        prompt: impl Into<String>,
        negative_prompt: impl Into<String>,
        parameters: GenerationParameters,
        generation_type: GenerationType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            negative_prompt: negative_prompt.into(),
            parameters,
            generation_type,
            status: GenerationStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            output_paths: Vec::new(),
            metadata: None,
        }
    }

    pub fn request(&self) -> GenerationRequest {
        GenerationRequest {
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            parameters: self.parameters.clone(),
            generation_type: self.generation_type,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == GenerationStatus::Pending
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = GenerationStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Move a running item to a terminal status. Returns false if the item
    /// had already left `Running`.
    pub(crate) fn finish(&mut self, status: GenerationStatus, error: Option<String>) -> bool {
        if self.status != GenerationStatus::Running || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
        true
    }
}
