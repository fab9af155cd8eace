//! Operator terminal on the process's stdin and stdout.

use crate::{Comms, CommsConfig, CommsError, CommsResult, LockKind, LockTable, OpenState, RxQueue, Timeout};
use crossbeam_channel::{bounded, unbounded, SendTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::thread;
use tracing::{debug, trace, warn};

const READ_CHUNK: usize = 256;
const TX_DEPTH: usize = 64;

struct Pipes {
    rx: RxQueue,
    tx: Sender<Vec<u8>>,
}

/// Terminal transport.
///
/// Two helper threads are started by the first `open` and live for the rest
/// of the process: one blocks on stdin and feeds an [`RxQueue`], the other
/// drains a bounded channel into stdout. A write times out when that channel
/// stays full, and a timed-out write has written nothing.
pub struct StdioComms {
    state: OpenState,
    locks: LockTable,
    rx: Mutex<Option<RxQueue>>,
    tx: Mutex<Option<Sender<Vec<u8>>>>,
}

impl StdioComms {
    pub fn new() -> Self {
        StdioComms {
            state: OpenState::new(),
            locks: LockTable::new(),
            rx: Mutex::new(None),
            tx: Mutex::new(None),
        }
    }

    fn start_pipes() -> io::Result<Pipes> {
        let (rx_sender, rx_receiver) = unbounded::<Vec<u8>>();
        thread::Builder::new()
            .name("txcon-stdin".into())
            .spawn(move || {
                let mut stdin = io::stdin();
                let mut buf = [0u8; READ_CHUNK];
                loop {
                    match stdin.read(&mut buf) {
                        Ok(0) => {
                            debug!("stdin closed");
                            return;
                        }
                        Ok(n) => {
                            trace!(bytes = n, "stdin read");
                            if rx_sender.send(buf[..n].to_vec()).is_err() {
                                return;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            warn!(error = %e, "stdin read failed");
                            return;
                        }
                    }
                }
            })?;

        let (tx_sender, tx_receiver) = bounded::<Vec<u8>>(TX_DEPTH);
        thread::Builder::new()
            .name("txcon-stdout".into())
            .spawn(move || {
                for data in tx_receiver {
                    let mut stdout = io::stdout().lock();
                    if let Err(e) = stdout.write_all(&data).and_then(|_| stdout.flush()) {
                        warn!(error = %e, "stdout write failed");
                        return;
                    }
                }
            })?;

        Ok(Pipes {
            rx: RxQueue::new(rx_receiver),
            tx: tx_sender,
        })
    }
}

impl Default for StdioComms {
    fn default() -> Self {
        Self::new()
    }
}

impl Comms for StdioComms {
    fn backend(&self) -> &'static str {
        "stdio"
    }

    fn open(&self, _cfg: &CommsConfig) -> CommsResult<()> {
        self.state.begin_open()?;
        let mut tx = self.tx.lock();
        if tx.is_none() {
            match Self::start_pipes() {
                Ok(started) => {
                    *self.rx.lock() = Some(started.rx);
                    *tx = Some(started.tx);
                }
                Err(e) => {
                    self.state.abort_open();
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn close(&self) -> CommsResult<()> {
        self.state.begin_close()
    }

    fn read(&self, buf: &mut [u8], timeout: Timeout) -> CommsResult<()> {
        self.state.ensure_open()?;
        let mut rx = self.rx.lock();
        rx.as_mut().ok_or(CommsError::NotOpen)?.read_exact(buf, timeout)
    }

    fn write(&self, data: &[u8], timeout: Timeout) -> CommsResult<()> {
        self.state.ensure_open()?;
        let tx = self.tx.lock().clone().ok_or(CommsError::NotOpen)?;
        let timed_out = || CommsError::WriteTimeout {
            written: 0,
            requested: data.len(),
        };

        match timeout {
            Timeout::NoWait => tx.try_send(data.to_vec()).map_err(|e| match e {
                TrySendError::Full(_) => timed_out(),
                TrySendError::Disconnected(_) => CommsError::Disconnected,
            }),
            Timeout::After(d) => tx.send_timeout(data.to_vec(), d).map_err(|e| match e {
                SendTimeoutError::Timeout(_) => timed_out(),
                SendTimeoutError::Disconnected(_) => CommsError::Disconnected,
            }),
            Timeout::Forever => tx.send(data.to_vec()).map_err(|_| CommsError::Disconnected),
        }
    }

    fn lock(&self, kind: LockKind, timeout: Timeout) -> CommsResult<()> {
        self.locks.acquire(kind, timeout)
    }

    fn unlock(&self, kind: LockKind) -> CommsResult<()> {
        self.locks.release(kind)
    }
}
