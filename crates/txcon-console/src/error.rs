//! Error types for the console crate.

use thiserror::Error;
use txcon_arena::ArenaError;

/// Errors raised while bringing up or running a console.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// The arena could not supply the control block or the worker stack.
    #[error("allocation failure: {0}")]
    Allocation(#[from] ArenaError),

    /// The operating system refused to start the worker thread.
    #[error("failed to spawn worker: {0}")]
    WorkerSpawn(String),

    /// A registry referenced a menu it does not own, or has no menus.
    #[error("invalid registry: {0}")]
    InvalidRegistry(String),

    /// `define` skipped the worker because an earlier step failed.
    #[error("worker not created")]
    WorkerNotCreated,

    /// The worker loop has exited.
    #[error("worker stopped")]
    WorkerStopped,
}

impl ConsoleError {
    /// Numeric return code reported through status queries.
    pub fn code(&self) -> i32 {
        match self {
            ConsoleError::Allocation(e) => e.code(),
            ConsoleError::InvalidRegistry(_) => 22,
            ConsoleError::WorkerSpawn(_) => 14,
            ConsoleError::WorkerNotCreated => 13,
            ConsoleError::WorkerStopped => 19,
        }
    }
}

/// Result type alias for console operations.
pub type ConsoleResult<T> = Result<T, ConsoleError>;
