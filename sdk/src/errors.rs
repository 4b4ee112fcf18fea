//! Error types and handling
//!
//! This module provides the error types used throughout the Beacon engine.
//! All errors implement the `EngineErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! A watcher that died between two notifications is not an error: the
//! observable purges it silently during fan-out, so no variant exists for it.

use std::time::Duration;

use thiserror::Error;

/// Trait for engine error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait EngineErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is a static string and never echoes observable values.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors indicate a programming mistake or a dead component.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Observable**: rejected updates, unreachable owners, snapshot type mismatches
/// - **Observer**: readiness waits that exceeded their deadline
/// - **Actor**: closed mailboxes and failed tasks
/// - **Configuration**: invalid or missing configuration
/// - **Launcher**: external backends that failed to materialize a service
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, EngineErrorExt};
/// use std::time::Duration;
///
/// let error = EngineError::ObserveTimeout {
///     timeout: Duration::from_secs(5),
///     pending: vec!["overlay".to_string()],
/// };
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::InvalidValue("node".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Observable errors
    #[error("Invalid value for observable {0}: update with absent value")]
    InvalidValue(String),

    #[error("Observable unavailable: {0}")]
    ObservableUnavailable(String),

    #[error("Observable {observable} does not hold a value of type {expected}")]
    SnapshotType {
        observable: String,
        expected: &'static str,
    },

    // Observer errors
    #[error("Observe timed out after {timeout:?} waiting for: {}", .pending.join(", "))]
    ObserveTimeout {
        timeout: Duration,
        pending: Vec<String>,
    },

    // Actor errors
    #[error("Mailbox closed: {0}")]
    MailboxClosed(String),

    #[error("Actor failed: {0}")]
    ActorFailed(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Launcher errors
    #[error("Launcher error: {0}")]
    Launcher(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Observable errors
            Self::InvalidValue(_) => "Observables only accept present values; use reset to clear",
            Self::ObservableUnavailable(_) => "The component owning this value has stopped",
            Self::SnapshotType { .. } => "Observed value has an unexpected type",

            // Observer errors
            Self::ObserveTimeout { .. } => {
                "A dependency did not become ready in time. Check the dependent components"
            }

            // Actor errors
            Self::MailboxClosed(_) => "The target component is no longer accepting messages",
            Self::ActorFailed(_) => "A component stopped unexpectedly. Check the logs",

            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",

            // Launcher errors
            Self::Launcher(_) => "Service launch failed. It will be retried on the next change",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::InvalidValue(_) | Self::SnapshotType { .. } | Self::ActorFailed(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_lists_pending_slots() {
        let err = EngineError::ObserveTimeout {
            timeout: Duration::from_millis(250),
            pending: vec!["node".to_string(), "overlay".to_string()],
        };

        let msg = err.to_string();
        assert!(msg.contains("250ms"));
        assert!(msg.contains("node, overlay"));
    }

    #[test]
    fn test_recoverability() {
        assert!(EngineError::ObservableUnavailable("a".into()).is_recoverable());
        assert!(EngineError::MailboxClosed("a".into()).is_recoverable());
        assert!(!EngineError::InvalidValue("a".into()).is_recoverable());
        assert!(!EngineError::SnapshotType {
            observable: "a".into(),
            expected: "u32"
        }
        .is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
