//! Operator connection over TCP.
//!
//! The instance owns a small tokio runtime running one listener task. The task
//! serves a single client at a time: bytes read from the socket are forwarded
//! over a crossbeam channel into an [`RxQueue`], and bytes written through the
//! capability set arrive over an mpsc channel and are written and flushed to
//! the socket. When a client disconnects the listener waits for the next one;
//! output still queued for the old client and input it left unread are
//! discarded, so the next operator starts clean.

use crate::{Comms, CommsConfig, CommsError, CommsResult, LockKind, LockTable, OpenState, RxQueue, Timeout};
use parking_lot::{Condvar, Mutex};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const TX_DEPTH: usize = 256;

/// Bind address override, attached to a [`CommsConfig`] as its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSettings {
    pub bind: SocketAddr,
}

// ============================================================================
// Client tracking
// ============================================================================

#[derive(Debug, Default)]
struct ClientState {
    connected: Mutex<bool>,
    changed: Condvar,
}

impl ClientState {
    fn set(&self, connected: bool) {
        *self.connected.lock() = connected;
        self.changed.notify_all();
    }

    /// Wait until a client is connected or `deadline` passes.
    fn wait_connected(&self, deadline: Option<Instant>) -> bool {
        let mut connected = self.connected.lock();
        while !*connected {
            match deadline {
                None => self.changed.wait(&mut connected),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return false;
                    }
                    self.changed.wait_until(&mut connected, deadline);
                }
            }
        }
        true
    }
}

struct TcpLink {
    runtime: Runtime,
    tx: mpsc::Sender<Vec<u8>>,
    local_addr: SocketAddr,
    client: Arc<ClientState>,
}

// ============================================================================
// Backend
// ============================================================================

/// TCP transport serving one operator at a time.
pub struct TcpComms {
    bind: SocketAddr,
    state: OpenState,
    locks: LockTable,
    rx: Mutex<Option<RxQueue>>,
    link: Mutex<Option<TcpLink>>,
}

impl TcpComms {
    /// A closed transport that will listen on `bind` unless the open-time
    /// config carries a [`TcpSettings`] extension.
    pub fn new(bind: SocketAddr) -> Self {
        TcpComms {
            bind,
            state: OpenState::new(),
            locks: LockTable::new(),
            rx: Mutex::new(None),
            link: Mutex::new(None),
        }
    }

    /// The address actually bound, once open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.link.lock().as_ref().map(|link| link.local_addr)
    }

    /// Whether a client is connected right now.
    pub fn is_client_connected(&self) -> bool {
        self.link
            .lock()
            .as_ref()
            .map(|link| *link.client.connected.lock())
            .unwrap_or(false)
    }

    fn start(&self, bind: SocketAddr) -> io::Result<(TcpLink, RxQueue)> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("txcon-tcp")
            .enable_all()
            .build()?;
        let listener = runtime.block_on(TcpListener::bind(bind))?;
        let local_addr = listener.local_addr()?;

        let (tx_sender, tx_receiver) = mpsc::channel::<Vec<u8>>(TX_DEPTH);
        let (rx_sender, rx_receiver) = crossbeam_channel::unbounded::<Vec<u8>>();
        let client = Arc::new(ClientState::default());

        let task_client = Arc::clone(&client);
        runtime.spawn(async move {
            if let Err(e) = run_listener(listener, tx_receiver, rx_sender, task_client).await {
                warn!(addr = %local_addr, error = %e, "listener stopped");
            }
        });
        info!(addr = %local_addr, "listening for console connections");

        let link = TcpLink {
            runtime,
            tx: tx_sender,
            local_addr,
            client,
        };
        Ok((link, RxQueue::new(rx_receiver)))
    }

    fn sender(&self) -> CommsResult<(mpsc::Sender<Vec<u8>>, Handle, Arc<ClientState>)> {
        let link = self.link.lock();
        let link = link.as_ref().ok_or(CommsError::NotOpen)?;
        Ok((link.tx.clone(), link.runtime.handle().clone(), Arc::clone(&link.client)))
    }
}

impl Comms for TcpComms {
    fn backend(&self) -> &'static str {
        "tcp"
    }

    fn open(&self, cfg: &CommsConfig) -> CommsResult<()> {
        self.state.begin_open()?;
        let bind = cfg.extension::<TcpSettings>().map(|s| s.bind).unwrap_or(self.bind);
        match self.start(bind) {
            Ok((link, rx)) => {
                *self.rx.lock() = Some(rx);
                *self.link.lock() = Some(link);
                Ok(())
            }
            Err(e) => {
                self.state.abort_open();
                Err(e.into())
            }
        }
    }

    fn close(&self) -> CommsResult<()> {
        self.state.begin_close()?;
        if let Some(link) = self.link.lock().take() {
            link.client.set(false);
            link.runtime.shutdown_background();
            debug!(addr = %link.local_addr, "listener shut down");
        }
        self.rx.lock().take();
        Ok(())
    }

    fn read(&self, buf: &mut [u8], timeout: Timeout) -> CommsResult<()> {
        self.state.ensure_open()?;
        let mut rx = self.rx.lock();
        rx.as_mut().ok_or(CommsError::NotOpen)?.read_exact(buf, timeout)
    }

    fn write(&self, data: &[u8], timeout: Timeout) -> CommsResult<()> {
        self.state.ensure_open()?;
        let (tx, handle, client) = self.sender()?;
        let timed_out = || CommsError::WriteTimeout {
            written: 0,
            requested: data.len(),
        };

        let deadline = timeout.deadline();
        if !client.wait_connected(deadline) {
            return Err(timed_out());
        }

        match (timeout, deadline) {
            (Timeout::NoWait, _) => tx.try_send(data.to_vec()).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => timed_out(),
                mpsc::error::TrySendError::Closed(_) => CommsError::Disconnected,
            }),
            (_, None) => handle
                .block_on(tx.send(data.to_vec()))
                .map_err(|_| CommsError::Disconnected),
            (_, Some(deadline)) => {
                // The timer must be created inside the runtime.
                let bytes = data.to_vec();
                let sent = handle.block_on(async move {
                    tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), tx.send(bytes)).await
                });
                match sent {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(CommsError::Disconnected),
                    Err(_) => Err(timed_out()),
                }
            }
        }
    }

    fn lock(&self, kind: LockKind, timeout: Timeout) -> CommsResult<()> {
        self.locks.acquire(kind, timeout)
    }

    fn unlock(&self, kind: LockKind) -> CommsResult<()> {
        self.locks.release(kind)
    }
}

impl Drop for TcpComms {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.runtime.shutdown_background();
        }
    }
}

// ============================================================================
// Listener task
// ============================================================================

async fn run_listener(
    listener: TcpListener,
    mut tx_receiver: mpsc::Receiver<Vec<u8>>,
    rx_sender: crossbeam_channel::Sender<Vec<u8>>,
    client: Arc<ClientState>,
) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "console client connected");
        let stale = discard_output(&mut tx_receiver);
        if stale > 0 {
            debug!(%peer, chunks = stale, "dropped output queued before connect");
        }
        client.set(true);

        let result = handle_connection(stream, &mut tx_receiver, &rx_sender).await;

        client.set(false);
        discard_output(&mut tx_receiver);
        if rx_sender.send(RxQueue::RESET).is_err() {
            return Ok(());
        }
        match result {
            Ok(()) => info!(%peer, "console client disconnected"),
            Err(e) => warn!(%peer, error = %e, "console connection error"),
        }
    }
}

/// Drop every chunk waiting for a client; returns how many there were.
fn discard_output(tx_receiver: &mut mpsc::Receiver<Vec<u8>>) -> usize {
    let mut dropped = 0;
    while tx_receiver.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

async fn handle_connection(
    mut stream: TcpStream,
    tx_receiver: &mut mpsc::Receiver<Vec<u8>>,
    rx_sender: &crossbeam_channel::Sender<Vec<u8>>,
) -> io::Result<()> {
    let (mut reader, mut writer) = stream.split();
    let mut read_buf = [0u8; 1024];

    loop {
        tokio::select! {
            result = reader.read(&mut read_buf) => {
                match result? {
                    0 => return Ok(()),
                    n => {
                        if rx_sender.send(read_buf[..n].to_vec()).is_err() {
                            return Ok(());
                        }
                    }
                }
            }

            Some(data) = tx_receiver.recv() => {
                writer.write_all(&data).await?;
                writer.flush().await?;
            }
        }
    }
}
