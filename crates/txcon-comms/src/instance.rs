//! A backend bound to its configuration.

use crate::{Comms, CommsConfig, CommsError, CommsResult, LockKind, Timeout};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use txcon_metrics::{metric_defs, metrics};

/// A transport backend together with the configuration it is opened with.
pub struct CommsInstance {
    api: Box<dyn Comms>,
    cfg: Arc<CommsConfig>,
}

impl CommsInstance {
    /// Bind `api` to `cfg`, opening it right away when `cfg.autostart` is set.
    pub fn new(api: Box<dyn Comms>, cfg: Arc<CommsConfig>) -> Self {
        let instance = CommsInstance { api, cfg };
        if instance.cfg.autostart {
            if let Err(e) = instance.open() {
                warn!(backend = instance.backend(), error = %e, "autostart open failed");
            }
        }
        instance
    }

    pub fn backend(&self) -> &'static str {
        self.api.backend()
    }

    pub fn config(&self) -> &Arc<CommsConfig> {
        &self.cfg
    }

    /// Open the backend with this instance's configuration.
    pub fn open(&self) -> CommsResult<()> {
        self.api.open(&self.cfg)?;
        debug!(backend = self.backend(), "transport opened");
        Ok(())
    }

    pub fn close(&self) -> CommsResult<()> {
        self.api.close()?;
        debug!(backend = self.backend(), "transport closed");
        Ok(())
    }

    pub fn read(&self, buf: &mut [u8], timeout: Timeout) -> CommsResult<()> {
        self.api.read(buf, timeout)?;
        metrics::counter!(metric_defs::COMMS_RX_BYTES.name, "backend" => self.backend())
            .increment(buf.len() as u64);
        Ok(())
    }

    pub fn write(&self, data: &[u8], timeout: Timeout) -> CommsResult<()> {
        let result = self.api.write(data, timeout);
        let written = match &result {
            Ok(()) => data.len(),
            Err(CommsError::WriteTimeout { written, .. }) => *written,
            Err(_) => 0,
        };
        if written > 0 {
            metrics::counter!(metric_defs::COMMS_TX_BYTES.name, "backend" => self.backend())
                .increment(written as u64);
        }
        result
    }

    pub fn write_str(&self, text: &str, timeout: Timeout) -> CommsResult<()> {
        self.write(text.as_bytes(), timeout)
    }

    pub fn lock(&self, kind: LockKind, timeout: Timeout) -> CommsResult<()> {
        self.api.lock(kind, timeout)
    }

    pub fn unlock(&self, kind: LockKind) -> CommsResult<()> {
        self.api.unlock(kind)
    }

    /// Acquire `kind` and release it when the guard drops.
    pub fn lock_scoped(&self, kind: LockKind, timeout: Timeout) -> CommsResult<CommsGuard<'_>> {
        self.lock(kind, timeout)?;
        Ok(CommsGuard { comms: self, kind })
    }

    /// A [`fmt::Write`] sink that writes through this instance, translating
    /// `\n` into `\r\n`.
    pub fn writer(&self, timeout: Timeout) -> CommsWriter<'_> {
        CommsWriter {
            comms: self,
            timeout,
            error: None,
        }
    }
}

impl fmt::Debug for CommsInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommsInstance")
            .field("backend", &self.backend())
            .field("cfg", &self.cfg)
            .finish()
    }
}

/// Holds a transport lock until dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct CommsGuard<'a> {
    comms: &'a CommsInstance,
    kind: LockKind,
}

impl CommsGuard<'_> {
    pub fn kind(&self) -> LockKind {
        self.kind
    }
}

impl Drop for CommsGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.comms.unlock(self.kind) {
            warn!(backend = self.comms.backend(), kind = ?self.kind, error = %e, "unlock failed");
        }
    }
}

/// Formatting sink over a [`CommsInstance`].
///
/// `fmt::Error` carries no detail, so the first transport error is kept and
/// can be taken with [`finish`](Self::finish). Once a write has failed every
/// later write is skipped.
pub struct CommsWriter<'a> {
    comms: &'a CommsInstance,
    timeout: Timeout,
    error: Option<CommsError>,
}

impl CommsWriter<'_> {
    /// The first transport error hit while writing, if any.
    pub fn finish(self) -> CommsResult<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn emit(&mut self, bytes: &[u8]) -> fmt::Result {
        if bytes.is_empty() {
            return Ok(());
        }
        self.comms.write(bytes, self.timeout).map_err(|e| {
            self.error = Some(e);
            fmt::Error
        })
    }
}

impl fmt::Write for CommsWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.error.is_some() {
            return Err(fmt::Error);
        }
        let mut parts = s.split('\n');
        if let Some(first) = parts.next() {
            self.emit(first.as_bytes())?;
        }
        for part in parts {
            self.emit(b"\r\n")?;
            self.emit(part.as_bytes())?;
        }
        Ok(())
    }
}
