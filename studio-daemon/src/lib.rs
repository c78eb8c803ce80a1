//! # Studio Daemon
//!
//! Owns the lifecycle of the long-lived generation daemon: spawns it, wires
//! its pipes to a correlated [`studio_ipc::IpcChannel`], detects exits and
//! restarts it with exponential backoff until a crash limit is reached.
//!
//! [`DaemonBackend`] exposes the daemon as a
//! [`studio_interfaces::GenerationBackend`] for the generation queue.

pub mod backend;
pub mod config;
pub mod crash;
pub mod supervisor;

pub use backend::{DaemonBackend, ImageModel};
pub use config::SupervisorConfig;
pub use crash::{restart_delay, CrashState};
pub use supervisor::{DaemonStatus, DaemonSupervisor};
