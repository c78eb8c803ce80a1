//! # Studio Interfaces
//!
//! Core interfaces shared between the generation queue and the components it
//! drives. The queue only ever talks to these traits, so the active backend
//! (daemon-backed or HTTP-backed) and the persistence layer can be swapped
//! without touching scheduling code.
//!
//! ## Main Interfaces
//!
//! - [`GenerationBackend`] - generate media from a request, with advisory cancel
//! - [`OutputStore`] - persist generated media and its sidecar description

pub mod generation;
pub mod output;

// Re-export commonly used types
pub use generation::{
    BackendError, GeneratedMedia, GenerationBackend, GenerationMetadata, GenerationParameters,
    GenerationRequest, GenerationResult, GenerationType, MediaKind,
};
pub use output::{MediaLabel, OutputError, OutputStore};
