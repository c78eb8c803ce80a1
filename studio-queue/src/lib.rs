//! Generation queue
//!
//! A bounded FIFO of generation jobs executed one at a time against the
//! active [`studio_interfaces::GenerationBackend`]. Supports pause/resume,
//! cooperative cancellation of the running job and reordering of pending
//! jobs. Outputs of completed jobs are handed to an optional
//! [`studio_interfaces::OutputStore`].

pub mod error;
pub mod item;
pub mod queue;

pub use error::QueueError;
pub use item::{GenerationStatus, QueuedGeneration};
pub use queue::GenerationQueue;
