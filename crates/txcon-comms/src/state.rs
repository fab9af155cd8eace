//! Open/close sequencing shared by every backend.

use crate::{CommsError, CommsResult};
use std::sync::atomic::{AtomicBool, Ordering};

/// Tracks whether a backend instance is open.
#[derive(Debug, Default)]
pub struct OpenState {
    open: AtomicBool,
}

impl OpenState {
    /// A closed instance.
    pub const fn new() -> Self {
        OpenState {
            open: AtomicBool::new(false),
        }
    }

    /// Move to open; fails with [`CommsError::AlreadyOpen`] if already open.
    pub fn begin_open(&self) -> CommsResult<()> {
        self.open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| CommsError::AlreadyOpen)
    }

    /// Roll back a [`begin_open`](Self::begin_open) whose backend setup failed.
    pub fn abort_open(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Move to closed; fails with [`CommsError::NotOpen`] if not open.
    pub fn begin_close(&self) -> CommsResult<()> {
        self.open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| CommsError::NotOpen)
    }

    /// Fail with [`CommsError::NotOpen`] unless open.
    pub fn ensure_open(&self) -> CommsResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CommsError::NotOpen)
        }
    }

    /// Whether the instance is open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
