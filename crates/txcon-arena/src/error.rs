//! Error types for the arena crate.

use thiserror::Error;

/// Errors that can occur when carving memory from an [`Arena`](crate::Arena).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// The arena has fewer free bytes than requested.
    #[error("allocation failure: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Bytes requested, including alignment padding.
        requested: usize,
        /// Bytes left in the arena.
        available: usize,
    },

    /// Zero-sized arena or zero-sized allocation.
    #[error("invalid size: {0}")]
    InvalidSize(usize),

    /// Alignment is not a power of two.
    #[error("invalid alignment: {0} is not a power of two")]
    InvalidAlignment(usize),

    /// The block was carved from a different arena.
    #[error("block belongs to arena #{block_arena}, not #{arena}")]
    ForeignBlock {
        /// Identity of the arena the block came from.
        block_arena: u64,
        /// Identity of the arena it was presented to.
        arena: u64,
    },
}

impl ArenaError {
    /// Numeric return code reported through status queries.
    pub fn code(&self) -> i32 {
        match self {
            ArenaError::OutOfMemory { .. } => 9,
            ArenaError::InvalidSize(_) => 23,
            ArenaError::InvalidAlignment(_) => 1003,
            ArenaError::ForeignBlock { .. } => 22,
        }
    }
}

/// Result type alias for arena operations.
pub type ArenaResult<T> = Result<T, ArenaError>;
