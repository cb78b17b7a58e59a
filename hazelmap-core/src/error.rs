//! Error types for distributed map operations.

use std::io;
use thiserror::Error;

/// The main error type for map operations.
///
/// An absent value is never an error: lookups that find nothing return
/// `Ok(None)`. Delivery failures to client endpoints never surface here either;
/// the event dispatcher swallows them at its boundary.
#[derive(Debug, Error)]
pub enum HazelmapError {
    /// A timed operation (lock wait, `try_remove`, waiting on a locked key) expired.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// The call violates the current state, e.g. unlocking a key the caller does not hold.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The requested operation is deliberately not implemented.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The caller lacks the permission required for the action on the named resource.
    #[error("permission denied: {action} on {resource}")]
    PermissionDenied {
        /// Action that was requested.
        action: String,
        /// Resource (map name) the action targeted.
        resource: String,
    },

    /// Protocol-related errors (malformed frames, unknown message types).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A client endpoint could not accept a pushed message.
    #[error("endpoint error: {0}")]
    Endpoint(String),

    /// The operation was cancelled before it completed.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HazelmapError {
    /// Returns `true` if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, HazelmapError::Timeout(_))
    }

    /// Returns `true` if this error is an illegal-state rejection.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, HazelmapError::IllegalState(_))
    }
}

/// A specialized `Result` type for map operations.
pub type Result<T> = std::result::Result<T, HazelmapError>;
