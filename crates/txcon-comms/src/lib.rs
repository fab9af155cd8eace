//! # txcon-comms
//!
//! The byte-stream transport a console talks through.
//!
//! A transport is anything implementing [`Comms`]: a fixed set of open, close,
//! read, write, lock and unlock capabilities. The console never sees which
//! backend sits behind the trait; it holds a [`CommsInstance`], which pairs the
//! backend with its shared [`CommsConfig`].
//!
//! ## Backends
//!
//! - [`MemoryComms`]: in-process loopback driven by a [`MemoryHost`]
//! - [`StdioComms`]: the process's stdin and stdout
//! - [`TcpComms`]: a single operator connected over TCP
//!
//! ## Semantics shared by every backend
//!
//! - `read` returns exactly `buf.len()` bytes or fails without consuming any.
//! - `write` either writes everything or reports how much it wrote in
//!   [`CommsError::WriteTimeout`].
//! - Every wait honours its [`Timeout`].

mod config;
mod error;
mod instance;
mod lock;
mod memory;
mod queue;
mod state;
mod stdio;
mod tcp;
mod timeout;

pub use config::CommsConfig;
pub use error::{CommsError, CommsResult};
pub use instance::{CommsGuard, CommsInstance, CommsWriter};
pub use lock::LockTable;
pub use memory::{MemoryComms, MemoryHost};
pub use queue::RxQueue;
pub use state::OpenState;
pub use stdio::StdioComms;
pub use tcp::{TcpComms, TcpSettings};
pub use timeout::{LockKind, Timeout};

/// Transport capability set.
///
/// All capabilities take `&self` so one instance can be shared between the
/// console worker and any other thread that wants to write to the operator.
pub trait Comms: Send + Sync {
    /// Short backend name used in logs and metric labels.
    fn backend(&self) -> &'static str;

    /// Start the transport using `cfg`.
    fn open(&self, cfg: &CommsConfig) -> CommsResult<()>;

    /// Stop the transport.
    fn close(&self) -> CommsResult<()>;

    /// Read exactly `buf.len()` bytes.
    fn read(&self, buf: &mut [u8], timeout: Timeout) -> CommsResult<()>;

    /// Write all of `data`.
    fn write(&self, data: &[u8], timeout: Timeout) -> CommsResult<()>;

    /// Acquire the advisory lock for the calling thread.
    fn lock(&self, kind: LockKind, timeout: Timeout) -> CommsResult<()>;

    /// Release a lock taken with [`lock`](Self::lock).
    fn unlock(&self, kind: LockKind) -> CommsResult<()>;
}
