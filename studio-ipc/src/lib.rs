//! Inter-process communication for Studio
//!
//! This crate provides the line-delimited JSON protocol spoken with the
//! generation daemon, newline framing over partial reads, and the correlated
//! channel that matches responses back to concurrent callers by `request_id`.

pub mod channel;
pub mod error;
pub mod framing;
pub mod protocol;

// Re-export commonly used types
pub use channel::IpcChannel;
pub use error::IpcError;
pub use framing::{LineFramer, LineReader};
pub use protocol::{DaemonCommand, DaemonRequest, DaemonResponse, ResponsePayload};
