//! Logging setup for Studio binaries
//!
//! Installs a `tracing` subscriber. Crates that log through the `log`
//! facade are bridged into the same subscriber.

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
