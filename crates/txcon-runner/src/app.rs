//! Start-up: the byte pool, the feature table and the console feature.

use crate::callbacks;
use crate::settings::{AppSettings, TransportSettings};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{error, info, warn};
use txcon_arena::{Arena, ArenaError};
use txcon_comms::{Comms, CommsInstance};
use txcon_console::{Console, ConsoleError, ConsoleSettings, Feature, FeatureStatus, RegistryBuilder};

/// Errors that stop the application from starting.
#[derive(Debug, Error)]
pub enum AppError {
    /// The settings file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid YAML for [`AppSettings`].
    #[error("invalid settings: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The byte pool could not be created.
    #[error("failed to create byte pool: {0}")]
    Arena(#[from] ArenaError),
}

/// Result type alias for application start-up.
pub type AppResult<T> = Result<T, AppError>;

/// Features in definition order, shared with the `feature status` command.
#[derive(Default)]
pub struct FeatureTable {
    features: RwLock<Vec<Arc<dyn Feature>>>,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, feature: Arc<dyn Feature>) {
        self.features.write().push(feature);
    }

    /// The features, in table order.
    pub fn snapshot(&self) -> Vec<Arc<dyn Feature>> {
        self.features.read().clone()
    }

    pub fn len(&self) -> usize {
        self.features.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.read().is_empty()
    }
}

// ============================================================================
// Console feature
// ============================================================================

/// The console as an application feature.
pub struct ConsoleFeature {
    settings: ConsoleSettings,
    transport: TransportSettings,
    backend: Mutex<Option<Box<dyn Comms>>>,
    table: Arc<FeatureTable>,
    console: OnceLock<Console>,
}

impl ConsoleFeature {
    pub fn new(
        settings: ConsoleSettings,
        transport: TransportSettings,
        backend: Box<dyn Comms>,
        table: Arc<FeatureTable>,
    ) -> Self {
        ConsoleFeature {
            settings,
            transport,
            backend: Mutex::new(Some(backend)),
            table,
            console: OnceLock::new(),
        }
    }

    /// Run `f` on the console, if `define` has created it.
    pub fn with_console<R>(&self, f: impl FnOnce(&Console) -> R) -> Option<R> {
        self.console.get().map(f)
    }

    /// Stop the console worker.
    pub fn shutdown(&self) {
        if let Some(Err(e)) = self.with_console(|console| console.shutdown()) {
            error!("Console shutdown failed: {}", e);
        }
    }
}

impl Feature for ConsoleFeature {
    fn name(&self) -> &str {
        "console"
    }

    fn define(&self, arena: &Arc<Arena>) {
        let Some(backend) = self.backend.lock().take() else {
            warn!("Console already defined");
            return;
        };

        let mut builder = RegistryBuilder::new();
        callbacks::register(&mut builder, &self.table);
        let registry = match builder.build() {
            Ok(registry) => Arc::new(registry),
            Err(e) => {
                error!("Console registry invalid: {}", e);
                return;
            }
        };

        let cfg = Arc::new(self.transport.comms_config(&self.settings));
        let comms = Arc::new(CommsInstance::new(backend, cfg));
        let console = Console::define(Arc::clone(arena), comms, registry, self.settings.clone());
        if self.console.set(console).is_err() {
            warn!("Console already defined");
        }
    }

    fn get_status(&self) -> FeatureStatus {
        self.with_console(|console| console.get_status())
            .unwrap_or(FeatureStatus::new(ConsoleError::WorkerNotCreated.code()))
    }
}

// ============================================================================
// Application
// ============================================================================

/// The byte pool and the features allocated from it.
pub struct Application {
    settings: AppSettings,
    arena: Arc<Arena>,
    table: Arc<FeatureTable>,
    console: Arc<ConsoleFeature>,
}

impl Application {
    /// Create the byte pool and the feature table, with the console talking
    /// through the configured transport.
    pub fn new(settings: AppSettings) -> AppResult<Self> {
        let backend = settings.transport.build();
        Self::with_backend(settings, backend)
    }

    /// Like [`new`](Self::new), with the console talking through `backend`.
    pub fn with_backend(settings: AppSettings, backend: Box<dyn Comms>) -> AppResult<Self> {
        let arena = match Arena::new(settings.arena.name.clone(), settings.arena.size) {
            Ok(arena) => Arc::new(arena),
            Err(e) => {
                error!("Failed to create byte pool '{}': {}", settings.arena.name, e);
                return Err(e.into());
            }
        };
        info!(
            "Created byte pool '{}' ({} bytes), transport {}",
            settings.arena.name,
            settings.arena.size,
            backend.backend()
        );

        let table = Arc::new(FeatureTable::new());
        let console = Arc::new(ConsoleFeature::new(
            settings.console.clone(),
            settings.transport.clone(),
            backend,
            Arc::clone(&table),
        ));
        table.push(console.clone());

        Ok(Application {
            settings,
            arena,
            table,
            console,
        })
    }

    /// Define every feature, in table order.
    pub fn define(&self) {
        for feature in self.table.snapshot() {
            info!("Defining feature '{}'", feature.name());
            feature.define(&self.arena);
            let status = feature.get_status();
            if !status.is_ok() {
                warn!("Feature '{}' status {}", feature.name(), status.return_code);
            }
        }
    }

    /// Stop every feature that runs a thread.
    pub fn shutdown(&self) {
        self.console.shutdown();
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }

    pub fn features(&self) -> &Arc<FeatureTable> {
        &self.table
    }

    pub fn console(&self) -> &Arc<ConsoleFeature> {
        &self.console
    }
}
