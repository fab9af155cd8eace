//! Parameters handed to a backend at open time.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Immutable transport configuration.
///
/// Owned by whoever assembles the console and shared with the instance by
/// `Arc`; the instance never copies it.
#[derive(Clone)]
pub struct CommsConfig {
    /// Echo accepted input bytes back to the operator.
    pub echo: bool,
    /// Open the instance as soon as it is constructed.
    pub autostart: bool,
    extension: Option<Arc<dyn Any + Send + Sync>>,
}

impl CommsConfig {
    /// Config with echo on and autostart off.
    pub fn new() -> Self {
        CommsConfig {
            echo: true,
            autostart: false,
            extension: None,
        }
    }

    /// Set the echo flag.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Set the autostart flag.
    pub fn with_autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    /// Attach a backend-specific extension.
    pub fn with_extension<T: Any + Send + Sync>(mut self, extension: T) -> Self {
        self.extension = Some(Arc::new(extension));
        self
    }

    /// The backend-specific extension, if one of type `T` is attached.
    pub fn extension<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.extension.as_deref().and_then(|ext| ext.downcast_ref::<T>())
    }
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommsConfig")
            .field("echo", &self.echo)
            .field("autostart", &self.autostart)
            .field("extension", &self.extension.is_some())
            .finish()
    }
}
