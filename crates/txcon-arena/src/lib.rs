//! # txcon-arena
//!
//! A fixed-size byte region carved once at start-up. Every long-lived object of
//! the console (its control block, its worker stack) is taken from an [`Arena`]
//! and never given back, so the lifetime of a carved block is the lifetime of
//! the arena itself.
//!
//! Allocation is a bump pointer: blocks never move, the region is never
//! compacted and there is no `free`. Running out of room is reported to the
//! caller as [`ArenaError::OutOfMemory`]; the arena itself stays usable and a
//! later, smaller request can still succeed.
//!
//! ```
//! use txcon_arena::{Arena, ArenaError};
//!
//! let arena = Arena::new("byte pool", 256)?;
//! let block = arena.allocate(100)?;
//! assert_eq!(block.len(), 100);
//! assert!(matches!(arena.allocate(512), Err(ArenaError::OutOfMemory { .. })));
//! assert!(arena.allocate(64).is_ok());
//! # Ok::<(), ArenaError>(())
//! ```

mod error;

pub use error::{ArenaError, ArenaResult};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use txcon_metrics::{metric_defs, metrics};

/// Default alignment of every block, in bytes.
pub const ARENA_ALIGN: usize = 8;

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// A region carved from an [`Arena`].
///
/// The handle is neither `Clone` nor `Copy`: whoever holds it owns
/// the bytes it describes.
#[derive(Debug, PartialEq, Eq)]
pub struct ArenaBlock {
    arena_id: u64,
    offset: usize,
    len: usize,
}

impl ArenaBlock {
    /// Offset of the block from the start of the region.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the block in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; zero-length blocks are refused at allocation time.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Snapshot of an arena's usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Total region size.
    pub size: usize,
    /// Bytes carved so far, including alignment padding.
    pub used: usize,
    /// Bytes still free.
    pub available: usize,
    /// Successful allocations.
    pub allocations: usize,
    /// Refused allocations.
    pub failures: usize,
}

struct ArenaState {
    region: Box<[u8]>,
    top: usize,
    allocations: usize,
    failures: usize,
}

/// Fixed-size bump arena.
pub struct Arena {
    id: u64,
    name: String,
    state: Mutex<ArenaState>,
}

impl Arena {
    /// Carve a zeroed region of `size` bytes.
    pub fn new(name: impl Into<String>, size: usize) -> ArenaResult<Self> {
        if size == 0 {
            return Err(ArenaError::InvalidSize(size));
        }
        let name = name.into();
        debug!("Arena '{}' created with {} bytes", name, size);
        Ok(Arena {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            name,
            state: Mutex::new(ArenaState {
                region: vec![0u8; size].into_boxed_slice(),
                top: 0,
                allocations: 0,
                failures: 0,
            }),
        })
    }

    /// Arena name, used in logs and metric labels.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total region size.
    pub fn size(&self) -> usize {
        self.state.lock().region.len()
    }

    /// Carve `len` bytes at the default alignment.
    pub fn allocate(&self, len: usize) -> ArenaResult<ArenaBlock> {
        self.allocate_aligned(len, ARENA_ALIGN)
    }

    /// Carve room for one `T`.
    ///
    /// Only the room is reserved; the value itself is not placed in the block.
    pub fn allocate_for<T>(&self) -> ArenaResult<ArenaBlock> {
        let align = std::mem::align_of::<T>().max(ARENA_ALIGN);
        self.allocate_aligned(std::mem::size_of::<T>().max(1), align)
    }

    /// Carve `len` bytes whose offset is a multiple of `align`.
    pub fn allocate_aligned(&self, len: usize, align: usize) -> ArenaResult<ArenaBlock> {
        if len == 0 {
            return Err(ArenaError::InvalidSize(len));
        }
        if !align.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment(align));
        }

        let mut state = self.state.lock();
        let size = state.region.len();
        let offset = state.top.checked_next_multiple_of(align);
        let end = offset
            .and_then(|offset| offset.checked_add(len))
            .filter(|end| *end <= size);

        let (Some(offset), Some(end)) = (offset, end) else {
            state.failures += 1;
            let available = size - state.top;
            let padding = offset.map_or(align, |offset| offset - state.top);
            let requested = len.saturating_add(padding);
            drop(state);

            warn!(
                "Arena '{}': allocation failure, requested {} bytes, {} available",
                self.name, requested, available
            );
            metrics::counter!(metric_defs::ARENA_ALLOC_FAILURES.name, "arena" => self.name.clone())
                .increment(1);
            return Err(ArenaError::OutOfMemory { requested, available });
        };

        state.top = end;
        state.allocations += 1;
        let used = state.top;
        drop(state);

        debug!(
            "Arena '{}': carved {} bytes at offset {} ({} used)",
            self.name, len, offset, used
        );
        metrics::gauge!(metric_defs::ARENA_BYTES_USED.name, "arena" => self.name.clone())
            .set(used as f64);

        Ok(ArenaBlock {
            arena_id: self.id,
            offset,
            len,
        })
    }

    /// Run `f` over the bytes of `block`.
    ///
    /// The arena lock is held for the duration of `f`.
    pub fn with_block<R>(&self, block: &ArenaBlock, f: impl FnOnce(&mut [u8]) -> R) -> ArenaResult<R> {
        if block.arena_id != self.id {
            return Err(ArenaError::ForeignBlock {
                block_arena: block.arena_id,
                arena: self.id,
            });
        }
        let mut state = self.state.lock();
        let bytes = &mut state.region[block.offset..block.offset + block.len];
        Ok(f(bytes))
    }

    /// Current usage.
    pub fn stats(&self) -> ArenaStats {
        let state = self.state.lock();
        ArenaStats {
            size: state.region.len(),
            used: state.top,
            available: state.region.len() - state.top,
            allocations: state.allocations,
            failures: state.failures,
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &stats.size)
            .field("used", &stats.used)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sized_arena_rejected() {
        assert_eq!(Arena::new("empty", 0).unwrap_err(), ArenaError::InvalidSize(0));
    }

    #[test]
    fn test_allocations_are_sequential_and_aligned() {
        let arena = Arena::new("pool", 64).unwrap();

        let a = arena.allocate(3).unwrap();
        let b = arena.allocate(5).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 8);
        assert_eq!(arena.stats().used, 13);

        let c = arena.allocate_aligned(4, 32).unwrap();
        assert_eq!(c.offset(), 32);
    }

    #[test]
    fn test_out_of_memory_leaves_arena_usable() {
        let arena = Arena::new("pool", 100).unwrap();
        arena.allocate(40).unwrap();

        let err = arena.allocate(80).unwrap_err();
        assert_eq!(err, ArenaError::OutOfMemory { requested: 80, available: 60 });

        let stats = arena.stats();
        assert_eq!(stats.used, 40);
        assert_eq!(stats.failures, 1);

        // A smaller unrelated request still fits.
        let block = arena.allocate(56).unwrap();
        assert_eq!(block.offset(), 40);
        assert_eq!(arena.stats().available, 4);
    }

    #[test]
    fn test_oversized_request_after_padding() {
        let arena = Arena::new("pool", 64).unwrap();
        arena.allocate(3).unwrap();

        let err = arena.allocate(usize::MAX).unwrap_err();
        assert_eq!(
            err,
            ArenaError::OutOfMemory {
                requested: usize::MAX,
                available: 61
            }
        );
        assert_eq!(arena.stats().failures, 1);

        let block = arena.allocate(8).unwrap();
        assert_eq!(block.offset(), 8);
    }

    #[test]
    fn test_total_never_exceeds_region() {
        let arena = Arena::new("pool", 50).unwrap();
        let mut carved = 0;
        while let Ok(block) = arena.allocate(7) {
            carved += block.len();
        }
        assert!(arena.stats().used <= 50);
        assert!(carved <= 50);
    }

    #[test]
    fn test_invalid_requests() {
        let arena = Arena::new("pool", 16).unwrap();
        assert_eq!(arena.allocate(0).unwrap_err(), ArenaError::InvalidSize(0));
        assert_eq!(arena.allocate_aligned(4, 3).unwrap_err(), ArenaError::InvalidAlignment(3));
        assert_eq!(arena.stats().allocations, 0);
    }

    #[test]
    fn test_allocate_for_reserves_type_size() {
        #[allow(dead_code)]
        struct Control {
            a: u64,
            b: [u8; 20],
        }

        let arena = Arena::new("pool", 128).unwrap();
        let block = arena.allocate_for::<Control>().unwrap();
        assert_eq!(block.len(), std::mem::size_of::<Control>());
    }

    #[test]
    fn test_with_block_is_zeroed_and_writable() {
        let arena = Arena::new("pool", 32).unwrap();
        let block = arena.allocate(4).unwrap();

        arena
            .with_block(&block, |bytes| {
                assert_eq!(bytes, &[0, 0, 0, 0]);
                bytes.copy_from_slice(b"txcn");
            })
            .unwrap();

        let copy = arena.with_block(&block, |bytes| bytes.to_vec()).unwrap();
        assert_eq!(copy, b"txcn");
    }

    #[test]
    fn test_foreign_block_rejected() {
        let a = Arena::new("a", 16).unwrap();
        let b = Arena::new("b", 16).unwrap();
        let block = a.allocate(4).unwrap();

        assert!(matches!(
            b.with_block(&block, |_| ()),
            Err(ArenaError::ForeignBlock { .. })
        ));
    }

    #[test]
    fn test_error_codes() {
        let oom = ArenaError::OutOfMemory { requested: 1, available: 0 };
        assert_eq!(oom.code(), 9);
        assert!(oom.to_string().starts_with("allocation failure"));
    }
}
