//! The console as the application sees it.

use crate::error::{ConsoleError, ConsoleResult};
use crate::feature::FeatureStatus;
use crate::registry::CommandRegistry;
use crate::worker::{self, ConsoleControl, LoopSettings, WorkerConfig, WorkerLoop, WorkerState};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};
use txcon_arena::{Arena, ArenaBlock};
use txcon_comms::{CommsConfig, CommsInstance, Timeout};

/// Default thread name of the worker.
pub const DEFAULT_CONSOLE_NAME: &str = "Console Thread";

/// Default worker stack, in bytes.
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// Console settings, usually read from the application's YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    /// Worker thread name, also used in logs and metric labels.
    pub name: String,
    /// Written once after the transport opens. `\n` is sent as `\r\n`.
    pub banner: String,
    /// Worker stack, carved from the arena.
    pub stack_size: usize,
    pub priority: u32,
    pub preempt_threshold: u32,
    /// Echo typed bytes back to the operator.
    pub echo: bool,
    /// Open the transport when it is constructed instead of when the worker starts.
    pub autostart: bool,
    /// How long one prompt iteration waits for a byte. Bounds shutdown latency.
    pub prompt_timeout_ms: u64,
    /// Bound on every console write. `0` means do not wait.
    pub write_timeout_ms: u64,
    /// Pause after a transport error before the next iteration.
    pub error_backoff_ms: u64,
    /// Warn when one handler runs longer than this.
    pub watchdog_timeout_ms: Option<u64>,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        ConsoleSettings {
            name: DEFAULT_CONSOLE_NAME.to_string(),
            banner: "\nWelcome to txconsole\nEnter '?' for a list of commands...\n".to_string(),
            stack_size: DEFAULT_STACK_SIZE,
            priority: 10,
            preempt_threshold: 10,
            echo: true,
            autostart: false,
            prompt_timeout_ms: 1000,
            write_timeout_ms: 1000,
            error_backoff_ms: 100,
            watchdog_timeout_ms: None,
        }
    }
}

impl ConsoleSettings {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            name: self.name.clone(),
            stack_size: self.stack_size,
            priority: self.priority,
            preempt_threshold: self.preempt_threshold,
        }
        .validated()
    }

    /// Transport configuration carrying this console's echo and autostart flags.
    pub fn comms_config(&self) -> CommsConfig {
        CommsConfig::new()
            .with_echo(self.echo)
            .with_autostart(self.autostart)
    }

    fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            banner: self.banner.clone(),
            // A zero prompt timeout would spin.
            prompt_timeout: Timeout::from_millis(self.prompt_timeout_ms.max(1)),
            write_timeout: Timeout::from_millis(self.write_timeout_ms),
            error_backoff: Duration::from_millis(self.error_backoff_ms),
            watchdog_timeout: self.watchdog_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Counters and state of a running console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleStats {
    pub state: WorkerState,
    /// Name of the active menu.
    pub menu: String,
    pub lines: u64,
    pub dispatched: u64,
    pub not_found: u64,
    pub transport_errors: u64,
}

/// Arena, transport, registry and worker assembled into one console.
pub struct Console {
    settings: ConsoleSettings,
    worker_config: WorkerConfig,
    arena: Arc<Arena>,
    comms: Arc<CommsInstance>,
    registry: Arc<CommandRegistry>,
    control: Arc<ConsoleControl>,
    control_block: Option<ArenaBlock>,
    stack: Option<ArenaBlock>,
    failure: Option<ConsoleError>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Console {
    /// Bring up a console.
    ///
    /// Allocates the control block, then the worker stack, then starts the
    /// worker, which begins running at once. Every step is best effort: a
    /// failure is logged and recorded, later steps that depend on it are
    /// skipped, and the console is returned either way. Check
    /// [`get_status`](Self::get_status) to learn whether the worker runs.
    pub fn define(
        arena: Arc<Arena>,
        comms: Arc<CommsInstance>,
        registry: Arc<CommandRegistry>,
        settings: ConsoleSettings,
    ) -> Console {
        info!("Initializing console '{}'", settings.name);
        let worker_config = settings.worker_config();
        let control = Arc::new(ConsoleControl::new(registry.root()));
        let mut failure = None;

        let control_block = match arena.allocate_for::<ConsoleControl>() {
            Ok(block) => Some(block),
            Err(e) => {
                error!("Console '{}': control block allocation failed: {}", settings.name, e);
                failure.get_or_insert(ConsoleError::Allocation(e));
                None
            }
        };

        let stack = match arena.allocate(worker_config.stack_size) {
            Ok(block) => Some(block),
            Err(e) => {
                error!("Console '{}': stack allocation failed: {}", settings.name, e);
                failure.get_or_insert(ConsoleError::Allocation(e));
                None
            }
        };

        let mut worker = None;
        match (&control_block, &stack) {
            (Some(_), Some(stack)) => {
                let worker_loop = WorkerLoop::new(
                    settings.name.clone(),
                    Arc::clone(&control),
                    Arc::clone(&comms),
                    Arc::clone(&registry),
                    settings.loop_settings(),
                );
                match worker::spawn(&worker_config, stack.len(), worker_loop) {
                    Ok(handle) => worker = Some(handle),
                    Err(e) => {
                        error!("Console '{}': worker thread creation failed: {}", settings.name, e);
                        failure.get_or_insert(ConsoleError::WorkerSpawn(e.to_string()));
                    }
                }
            }
            _ => {
                warn!("Console '{}': worker not created", settings.name);
                failure.get_or_insert(ConsoleError::WorkerNotCreated);
            }
        }

        Console {
            settings,
            worker_config,
            arena,
            comms,
            registry,
            control,
            control_block,
            stack,
            failure,
            worker: Mutex::new(worker),
        }
    }

    /// `0` while the worker runs; otherwise the code of what went wrong.
    pub fn get_status(&self) -> FeatureStatus {
        if let Some(failure) = &self.failure {
            return FeatureStatus::new(failure.code());
        }
        let running = self
            .worker
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false);
        if running && self.control.state() != WorkerState::Stopped {
            FeatureStatus::OK
        } else {
            FeatureStatus::new(ConsoleError::WorkerStopped.code())
        }
    }

    pub fn stats(&self) -> ConsoleStats {
        let menu = self.control.active_menu();
        ConsoleStats {
            state: self.control.state(),
            menu: self
                .registry
                .menu(menu)
                .map(|m| m.name().to_string())
                .unwrap_or_default(),
            lines: self.control.lines.load(Ordering::Relaxed),
            dispatched: self.control.dispatched.load(Ordering::Relaxed),
            not_found: self.control.not_found.load(Ordering::Relaxed),
            transport_errors: self.control.transport_errors.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// The worker notices within one prompt timeout, unless a handler is
    /// running, in which case it stops once the handler returns.
    pub fn shutdown(&self) -> ConsoleResult<()> {
        self.control.request_stop();
        let Some(handle) = self.worker.lock().take() else {
            return Ok(());
        };
        if handle.join().is_err() {
            error!("Console '{}': worker panicked", self.settings.name);
            return Err(ConsoleError::WorkerStopped);
        }
        info!("Console '{}' shut down", self.settings.name);
        Ok(())
    }

    /// Whether `define` started a worker that has not been shut down.
    pub fn has_worker(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }

    pub fn worker_config(&self) -> &WorkerConfig {
        &self.worker_config
    }

    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }

    pub fn comms(&self) -> &Arc<CommsInstance> {
        &self.comms
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Arena block accounting for the control block, if it was allocated.
    pub fn control_block(&self) -> Option<&ArenaBlock> {
        self.control_block.as_ref()
    }

    /// Arena block backing the worker stack, if it was allocated.
    pub fn stack(&self) -> Option<&ArenaBlock> {
        self.stack.as_ref()
    }

    /// First failure recorded by `define`.
    pub fn failure(&self) -> Option<&ConsoleError> {
        self.failure.as_ref()
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("name", &self.settings.name)
            .field("comms", &self.comms)
            .field("state", &self.control.state())
            .field("failure", &self.failure)
            .finish()
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        // The worker exits on its own; it holds its own references.
        self.control.request_stop();
    }
}
