//! In-process loopback transport.
//!
//! [`MemoryComms`] is the console's end, [`MemoryHost`] the operator's. Bytes
//! the host sends become readable by the console, and everything the console
//! writes collects on the host side until taken.

use crate::{Comms, CommsConfig, CommsError, CommsResult, LockKind, LockTable, OpenState, Timeout};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct LinkState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    host_gone: bool,
}

#[derive(Debug)]
struct MemoryLink {
    state: Mutex<LinkState>,
    changed: Condvar,
    tx_capacity: Option<usize>,
}

impl MemoryLink {
    /// Wait for a change; false once `deadline` has passed.
    fn wait(&self, state: &mut MutexGuard<'_, LinkState>, deadline: Option<Instant>) -> bool {
        match deadline {
            None => {
                self.changed.wait(state);
                true
            }
            Some(deadline) if Instant::now() >= deadline => false,
            Some(deadline) => {
                self.changed.wait_until(state, deadline);
                true
            }
        }
    }
}

/// Console side of an in-process loopback.
#[derive(Debug)]
pub struct MemoryComms {
    link: Arc<MemoryLink>,
    state: OpenState,
    locks: LockTable,
}

impl MemoryComms {
    /// A connected console/host pair with unbounded output.
    pub fn pair() -> (MemoryComms, MemoryHost) {
        Self::build(None)
    }

    /// A pair whose output holds at most `capacity` bytes the host has not
    /// yet taken. Writes beyond that block until the host drains them.
    pub fn with_capacity(capacity: usize) -> (MemoryComms, MemoryHost) {
        Self::build(Some(capacity))
    }

    fn build(tx_capacity: Option<usize>) -> (MemoryComms, MemoryHost) {
        let link = Arc::new(MemoryLink {
            state: Mutex::new(LinkState::default()),
            changed: Condvar::new(),
            tx_capacity,
        });
        let comms = MemoryComms {
            link: Arc::clone(&link),
            state: OpenState::new(),
            locks: LockTable::new(),
        };
        (comms, MemoryHost { link })
    }
}

impl Comms for MemoryComms {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn open(&self, _cfg: &CommsConfig) -> CommsResult<()> {
        self.state.begin_open()
    }

    fn close(&self) -> CommsResult<()> {
        self.state.begin_close()?;
        // Notify under the link lock: a reader or writer checks the open state
        // while holding it, so the wakeup cannot land between check and wait.
        let _link = self.link.state.lock();
        self.link.changed.notify_all();
        Ok(())
    }

    fn read(&self, buf: &mut [u8], timeout: Timeout) -> CommsResult<()> {
        self.state.ensure_open()?;
        let deadline = timeout.deadline();
        let mut link = self.link.state.lock();

        loop {
            let count = buf.len();
            if link.rx.len() >= count {
                for (slot, byte) in buf.iter_mut().zip(link.rx.drain(..count)) {
                    *slot = byte;
                }
                return Ok(());
            }
            if link.host_gone {
                return Err(CommsError::Disconnected);
            }
            self.state.ensure_open()?;
            if !self.link.wait(&mut link, deadline) {
                return Err(CommsError::Timeout);
            }
            self.state.ensure_open()?;
        }
    }

    fn write(&self, data: &[u8], timeout: Timeout) -> CommsResult<()> {
        self.state.ensure_open()?;
        let deadline = timeout.deadline();
        let mut link = self.link.state.lock();
        let mut written = 0;

        while written < data.len() {
            if link.host_gone {
                return Err(CommsError::Disconnected);
            }
            let room = match self.link.tx_capacity {
                Some(cap) => cap.saturating_sub(link.tx.len()),
                None => data.len() - written,
            };
            if room > 0 {
                let end = written + room.min(data.len() - written);
                link.tx.extend_from_slice(&data[written..end]);
                written = end;
                self.link.changed.notify_all();
                continue;
            }
            self.state.ensure_open()?;
            if !self.link.wait(&mut link, deadline) {
                return Err(CommsError::WriteTimeout {
                    written,
                    requested: data.len(),
                });
            }
            self.state.ensure_open()?;
        }
        Ok(())
    }

    fn lock(&self, kind: LockKind, timeout: Timeout) -> CommsResult<()> {
        self.locks.acquire(kind, timeout)
    }

    fn unlock(&self, kind: LockKind) -> CommsResult<()> {
        self.locks.release(kind)
    }
}

/// Operator side of an in-process loopback.
#[derive(Debug)]
pub struct MemoryHost {
    link: Arc<MemoryLink>,
}

impl MemoryHost {
    /// Make `bytes` readable by the console.
    pub fn send(&self, bytes: &[u8]) {
        self.link.state.lock().rx.extend(bytes.iter().copied());
        self.link.changed.notify_all();
    }

    pub fn send_str(&self, text: &str) {
        self.send(text.as_bytes());
    }

    /// Take everything the console has written so far.
    pub fn take_output(&self) -> Vec<u8> {
        let out = std::mem::take(&mut self.link.state.lock().tx);
        self.link.changed.notify_all();
        out
    }

    /// [`take_output`](Self::take_output) as text.
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.take_output()).into_owned()
    }

    /// Wait until the pending output contains `pattern`, then take all of it.
    ///
    /// Returns `None` if `timeout` elapses first; the output is left in place.
    pub fn wait_for_output(&self, pattern: &str, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        let mut link = self.link.state.lock();
        loop {
            if contains(&link.tx, pattern.as_bytes()) {
                let out = std::mem::take(&mut link.tx);
                drop(link);
                self.link.changed.notify_all();
                return Some(String::from_utf8_lossy(&out).into_owned());
            }
            if !self.link.wait(&mut link, Some(deadline)) {
                return None;
            }
        }
    }

    /// Bytes sent but not yet read by the console.
    pub fn unread_input(&self) -> usize {
        self.link.state.lock().rx.len()
    }
}

impl Drop for MemoryHost {
    fn drop(&mut self) {
        self.link.state.lock().host_gone = true;
        self.link.changed.notify_all();
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}
