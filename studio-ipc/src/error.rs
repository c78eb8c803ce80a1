//! IPC error types

use studio_resilience::Retryable;
use thiserror::Error;

/// IPC error types
///
/// Errors are `Clone` so one process failure can be delivered to every
/// pending call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IpcError {
    /// The daemon executable could not be launched
    #[error("Failed to spawn daemon process: {0}")]
    Spawn(String),

    /// Malformed or unmatched output line
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The daemon answered with an `error` field
    #[error("Daemon error: {0}")]
    Remote(String),

    /// The daemon exited while the call was pending
    #[error("Daemon process terminated: {0}")]
    ProcessTerminated(String),

    /// Auto-restart gave up; an operator has to reset the crash count
    #[error("Daemon crashed {crashes} times in a row; manual restart required")]
    CrashLimitExceeded { crashes: u32 },

    /// The call was cancelled before a response arrived
    #[error("Request cancelled")]
    Cancelled,

    /// IO error on the daemon pipes
    #[error("IO error: {0}")]
    Io(String),

    /// Request could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No daemon input stream is attached
    #[error("Daemon not connected")]
    NotConnected,
}

impl Retryable for IpcError {
    fn is_cancellation(&self) -> bool {
        matches!(self, IpcError::Cancelled)
    }

    fn is_transport_failure(&self) -> bool {
        matches!(self, IpcError::Io(_) | IpcError::NotConnected)
    }
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        IpcError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            IpcError::Io(err.to_string())
        } else if err.is_data() || err.is_syntax() || err.is_eof() {
            IpcError::Protocol(err.to_string())
        } else {
            IpcError::Serialization(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_resilience::indicates_daemon_restart;

    #[test]
    fn test_error_classification() {
        assert!(IpcError::Cancelled.is_cancellation());
        assert!(IpcError::NotConnected.is_transport_failure());
        assert!(IpcError::Io("broken pipe".to_string()).is_transport_failure());
        assert!(!IpcError::Remote("out of memory".to_string()).is_transport_failure());
    }

    #[test]
    fn test_termination_is_recognised_as_restart() {
        let error = IpcError::ProcessTerminated("exit status: 1".to_string());
        assert!(indicates_daemon_restart(&error.to_string()));
        assert!(!indicates_daemon_restart(
            &IpcError::Remote("bad prompt".to_string()).to_string()
        ));
    }

    #[test]
    fn test_json_errors_map_to_protocol() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(IpcError::from(err), IpcError::Protocol(_)));
    }
}
