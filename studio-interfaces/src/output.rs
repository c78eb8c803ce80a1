//! Persistence collaborator interface

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::generation::{GenerationMetadata, GenerationType, MediaKind};

/// Semantic label used to name a persisted artifact
#[derive(Debug, Clone, PartialEq)]
pub struct MediaLabel {
    pub prompt: String,
    pub seed: i64,
    pub generation_type: GenerationType,
    pub kind: MediaKind,
}

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Filesystem error at {path}: {error}")]
    Filesystem { path: PathBuf, error: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Writes generated media and sidecar descriptions
#[async_trait]
pub trait OutputStore: Send + Sync {
    /// Write media bytes under a date-organized path and return that path
    async fn save_media(&self, data: &[u8], label: &MediaLabel) -> Result<PathBuf, OutputError>;

    /// Write a sidecar description next to `media_path` and return its path.
    /// Returns `None` when this store does not write sidecars.
    async fn save_metadata(
        &self,
        metadata: &GenerationMetadata,
        media_path: &Path,
    ) -> Result<Option<PathBuf>, OutputError>;
}
