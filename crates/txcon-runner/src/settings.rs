//! Application settings, loaded from YAML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```yaml
//! arena:
//!   name: byte pool
//!   size: 1048576
//! console:
//!   name: Console Thread
//!   echo: true
//!   prompt_timeout_ms: 1000
//! transport:
//!   kind: tcp
//!   bind: 127.0.0.1:4321
//! ```

use crate::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use txcon_comms::{Comms, CommsConfig, StdioComms, TcpComms, TcpSettings};
use txcon_console::ConsoleSettings;

/// Default byte pool size.
pub const DEFAULT_ARENA_SIZE: usize = 1024 * 1024;

/// Default TCP port for the console.
pub const DEFAULT_TCP_PORT: u16 = 4321;

/// Top-level settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub arena: ArenaSettings,
    pub console: ConsoleSettings,
    pub transport: TransportSettings,
}

impl AppSettings {
    /// Read settings from a YAML file.
    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| AppError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> AppResult<Self> {
        // An empty document deserializes as null.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}

/// The byte pool every feature allocates from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaSettings {
    pub name: String,
    pub size: usize,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        ArenaSettings {
            name: "byte pool".to_string(),
            size: DEFAULT_ARENA_SIZE,
        }
    }
}

/// Which backend the console talks through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// The process's stdin and stdout.
    #[default]
    Stdio,
    /// One operator over TCP.
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub kind: TransportKind,
    /// Listen address for [`TransportKind::Tcp`].
    pub bind: SocketAddr,
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings {
            kind: TransportKind::Stdio,
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_TCP_PORT)),
        }
    }
}

impl TransportSettings {
    /// A closed backend of the configured kind.
    pub fn build(&self) -> Box<dyn Comms> {
        match self.kind {
            TransportKind::Stdio => Box::new(StdioComms::new()),
            TransportKind::Tcp => Box::new(TcpComms::new(self.bind)),
        }
    }

    /// Transport configuration for `console`, with the bind address attached
    /// for TCP.
    pub fn comms_config(&self, console: &ConsoleSettings) -> CommsConfig {
        let cfg = console.comms_config();
        match self.kind {
            TransportKind::Stdio => cfg,
            TransportKind::Tcp => cfg.with_extension(TcpSettings { bind: self.bind }),
        }
    }
}
