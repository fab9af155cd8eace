//! Advisory Tx/Rx lock shared by every backend.
//!
//! A caller is a thread. `Tx` and `Rx` are independent slots; `All` claims both
//! and therefore excludes, and is excluded by, a holder of either. Re-entrant
//! acquisition is refused with [`CommsError::LockConflict`] rather than left to
//! deadlock, and callers are expected to release through
//! [`CommsGuard`](crate::CommsGuard) so every exit path unlocks.

use crate::{CommsError, CommsResult, LockKind, Timeout};
use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct Holders {
    tx: Option<ThreadId>,
    rx: Option<ThreadId>,
}

impl Holders {
    fn held_by(&self, kind: LockKind, me: ThreadId) -> bool {
        (kind.covers_tx() && self.tx == Some(me)) || (kind.covers_rx() && self.rx == Some(me))
    }

    fn available(&self, kind: LockKind) -> bool {
        (!kind.covers_tx() || self.tx.is_none()) && (!kind.covers_rx() || self.rx.is_none())
    }

    fn claim(&mut self, kind: LockKind, me: ThreadId) {
        if kind.covers_tx() {
            self.tx = Some(me);
        }
        if kind.covers_rx() {
            self.rx = Some(me);
        }
    }
}

/// Lock table for one transport instance.
#[derive(Debug, Default)]
pub struct LockTable {
    holders: Mutex<Holders>,
    released: Condvar,
}

impl LockTable {
    /// An unlocked table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `kind` for the calling thread.
    ///
    /// [`Timeout::NoWait`] on a held slot fails with [`CommsError::LockConflict`];
    /// a bounded wait that expires fails with [`CommsError::Timeout`].
    pub fn acquire(&self, kind: LockKind, timeout: Timeout) -> CommsResult<()> {
        let me = thread::current().id();
        let deadline = timeout.deadline();
        let mut holders = self.holders.lock();

        if holders.held_by(kind, me) {
            return Err(CommsError::LockConflict);
        }

        loop {
            if holders.available(kind) {
                holders.claim(kind, me);
                return Ok(());
            }
            match (timeout, deadline) {
                (Timeout::NoWait, _) => return Err(CommsError::LockConflict),
                (_, None) => self.released.wait(&mut holders),
                (_, Some(deadline)) => {
                    if self.released.wait_until(&mut holders, deadline).timed_out()
                        && !holders.available(kind)
                    {
                        return Err(CommsError::Timeout);
                    }
                }
            }
        }
    }

    /// Release `kind`; every slot it covers must be held by the calling thread.
    pub fn release(&self, kind: LockKind) -> CommsResult<()> {
        let me = thread::current().id();
        let mut holders = self.holders.lock();

        let owns_tx = !kind.covers_tx() || holders.tx == Some(me);
        let owns_rx = !kind.covers_rx() || holders.rx == Some(me);
        if !(owns_tx && owns_rx) {
            return Err(CommsError::LockNotHeld);
        }

        if kind.covers_tx() {
            holders.tx = None;
        }
        if kind.covers_rx() {
            holders.rx = None;
        }
        drop(holders);
        self.released.notify_all();
        Ok(())
    }

    /// Whether any thread currently holds a slot covered by `kind`.
    pub fn is_locked(&self, kind: LockKind) -> bool {
        !self.holders.lock().available(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn test_acquire_release() {
        let table = LockTable::new();
        table.acquire(LockKind::Tx, Timeout::NoWait).unwrap();
        assert!(table.is_locked(LockKind::Tx));
        assert!(!table.is_locked(LockKind::Rx));

        // Rx is an independent slot.
        table.acquire(LockKind::Rx, Timeout::NoWait).unwrap();
        table.release(LockKind::All).unwrap();
        assert!(!table.is_locked(LockKind::All));
    }

    #[test]
    fn test_reentrant_acquire_refused() {
        let table = LockTable::new();
        table.acquire(LockKind::Tx, Timeout::Forever).unwrap();

        assert!(matches!(table.acquire(LockKind::Tx, Timeout::Forever), Err(CommsError::LockConflict)));
        assert!(matches!(table.acquire(LockKind::All, Timeout::Forever), Err(CommsError::LockConflict)));
    }

    #[test]
    fn test_release_without_holding() {
        let table = LockTable::new();
        assert!(matches!(table.release(LockKind::Rx), Err(CommsError::LockNotHeld)));

        table.acquire(LockKind::Tx, Timeout::NoWait).unwrap();
        assert!(matches!(table.release(LockKind::All), Err(CommsError::LockNotHeld)));
        assert!(table.is_locked(LockKind::Tx));
    }

    #[test]
    fn test_all_excluded_by_other_thread_tx() {
        let table = Arc::new(LockTable::new());
        table.acquire(LockKind::Tx, Timeout::NoWait).unwrap();

        let other = Arc::clone(&table);
        let result = thread::spawn(move || {
            let no_wait = other.acquire(LockKind::All, Timeout::NoWait);
            let start = Instant::now();
            let bounded = other.acquire(LockKind::All, Timeout::from_millis(50));
            (no_wait, bounded, start.elapsed())
        })
        .join()
        .unwrap();

        assert!(matches!(result.0, Err(CommsError::LockConflict)));
        assert!(matches!(result.1, Err(CommsError::Timeout)));
        assert!(result.2 >= Duration::from_millis(50));
    }

    #[test]
    fn test_waiter_wakes_on_release() {
        let table = Arc::new(LockTable::new());
        table.acquire(LockKind::Tx, Timeout::NoWait).unwrap();

        let other = Arc::clone(&table);
        let waiter = thread::spawn(move || {
            other.acquire(LockKind::All, Timeout::from_millis(5_000))?;
            other.release(LockKind::All)
        });

        thread::sleep(Duration::from_millis(20));
        table.release(LockKind::Tx).unwrap();

        waiter.join().unwrap().unwrap();
    }
}
