//! Error types for the transport layer.

use thiserror::Error;

/// Errors returned by the [`Comms`](crate::Comms) capabilities.
#[derive(Debug, Error)]
pub enum CommsError {
    /// The instance has not been opened, or was closed.
    #[error("transport not open")]
    NotOpen,

    /// `open` called twice without an intervening `close`.
    #[error("transport already open")]
    AlreadyOpen,

    /// A read or lock did not complete before its timeout.
    #[error("timeout")]
    Timeout,

    /// A write did not complete before its timeout.
    #[error("write timed out after {written} of {requested} bytes")]
    WriteTimeout {
        /// Bytes the backend accepted before the timeout.
        written: usize,
        /// Bytes the caller asked to write.
        requested: usize,
    },

    /// The requested lock is held by another caller, or already by this one.
    #[error("lock held")]
    LockConflict,

    /// `unlock` of a lock the caller does not hold.
    #[error("lock not held by caller")]
    LockNotHeld,

    /// The far side of the transport went away.
    #[error("transport disconnected")]
    Disconnected,

    /// I/O error from the underlying device or socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommsError {
    /// Numeric return code reported through status queries.
    pub fn code(&self) -> i32 {
        match self {
            CommsError::NotOpen => 7,
            CommsError::AlreadyOpen => 14,
            CommsError::Timeout => 20,
            CommsError::WriteTimeout { .. } => 24,
            CommsError::LockConflict => 8,
            CommsError::LockNotHeld => 30,
            CommsError::Disconnected => 18,
            CommsError::Io(_) => 100,
        }
    }

    /// True for the bounded-wait expiries a caller may simply retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommsError::Timeout | CommsError::WriteTimeout { .. })
    }
}

/// Result type alias for transport operations.
pub type CommsResult<T> = Result<T, CommsError>;
