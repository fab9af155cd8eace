//! Wait bounds and lock kinds shared by every capability.

use std::fmt;
use std::time::{Duration, Instant};

/// How long a capability may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Do not wait: fail at once unless the request can be satisfied now.
    NoWait,
    /// Wait at most this long.
    After(Duration),
    /// Wait indefinitely.
    Forever,
}

impl Timeout {
    /// Bounded wait in milliseconds. `0` is [`Timeout::NoWait`].
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Timeout::NoWait
        } else {
            Timeout::After(Duration::from_millis(ms))
        }
    }

    /// Absolute deadline for a wait starting now, `None` for [`Timeout::Forever`].
    ///
    /// [`Timeout::NoWait`] yields a deadline that has already passed.
    pub fn deadline(&self) -> Option<Instant> {
        let now = Instant::now();
        match self {
            Timeout::NoWait => Some(now),
            Timeout::After(d) => Some(now + *d),
            Timeout::Forever => None,
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::NoWait => f.write_str("no-wait"),
            Timeout::After(d) => write!(f, "{}ms", d.as_millis()),
            Timeout::Forever => f.write_str("forever"),
        }
    }
}

/// Which direction of a transport a lock covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    /// Transmit side.
    Tx,
    /// Receive side.
    Rx,
    /// Both sides.
    All,
}

impl LockKind {
    pub(crate) fn covers_tx(self) -> bool {
        matches!(self, LockKind::Tx | LockKind::All)
    }

    pub(crate) fn covers_rx(self) -> bool {
        matches!(self, LockKind::Rx | LockKind::All)
    }
}
