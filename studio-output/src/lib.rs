//! Filesystem persistence for generated media
//!
//! Media is written under `<root>/<YYYY-MM-DD>/`, named after the generation
//! type, time of day, seed and a slug of the prompt. A JSON sidecar with the
//! generation metadata can be written next to each file.

pub mod filesystem;
pub mod naming;

pub use filesystem::FilesystemOutputStore;
pub use naming::{media_file_stem, prompt_slug, MAX_SLUG_LEN};
