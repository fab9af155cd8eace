//! The console worker: one thread running the read-match-dispatch loop.
//!
//! The worker owns nothing but its line buffer. Transport, registry and the
//! control block are shared with the [`Console`](crate::Console) that spawned
//! it, and a handler always runs on the worker thread itself, so no second
//! command can start before the first returns.

use crate::dispatch::{help_text, resolve, Dispatch, NOT_FOUND};
use crate::line::{LineCodec, LineEvent};
use crate::registry::{CallbackArgs, CommandAction, CommandRegistry, MenuId};
use crate::watchdog::HandlerWatchdog;
use bytes::BytesMut;
use parking_lot::Mutex;
use std::fmt::{self, Write as _};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use txcon_comms::{CommsError, CommsInstance, LockKind, Timeout};
use txcon_metrics::{metric_defs, metrics, MetricLabels};

// ============================================================================
// Configuration
// ============================================================================

/// Thread parameters of a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Thread name.
    pub name: String,
    /// Stack bytes carved from the arena.
    pub stack_size: usize,
    /// Scheduling priority, lower is more urgent. Carried and reported only.
    pub priority: u32,
    /// Preemption threshold, never above `priority`. Carried and reported only.
    pub preempt_threshold: u32,
}

impl WorkerConfig {
    /// Clamp `preempt_threshold` to `priority`.
    pub fn validated(mut self) -> Self {
        if self.preempt_threshold > self.priority {
            warn!(
                worker = %self.name,
                preempt_threshold = self.preempt_threshold,
                priority = self.priority,
                "preempt threshold above priority, clamping"
            );
            self.preempt_threshold = self.priority;
        }
        self
    }
}

/// Where the worker is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    /// Not yet prompting, or between lines.
    Idle = 0,
    /// Prompt written, collecting a line.
    AwaitingInput = 1,
    /// Resolving a completed line.
    Matching = 2,
    /// A handler is running.
    Dispatching = 3,
    /// The loop has exited.
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => WorkerState::AwaitingInput,
            2 => WorkerState::Matching,
            3 => WorkerState::Dispatching,
            4 => WorkerState::Stopped,
            _ => WorkerState::Idle,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Idle => "idle",
            WorkerState::AwaitingInput => "awaiting input",
            WorkerState::Matching => "matching",
            WorkerState::Dispatching => "dispatching",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Control block
// ============================================================================

/// State shared between a console and its worker.
#[derive(Debug)]
pub(crate) struct ConsoleControl {
    state: AtomicU8,
    active_menu: Mutex<MenuId>,
    stop: AtomicBool,
    pub(crate) lines: AtomicU64,
    pub(crate) dispatched: AtomicU64,
    pub(crate) not_found: AtomicU64,
    pub(crate) transport_errors: AtomicU64,
}

impl ConsoleControl {
    pub(crate) fn new(root: MenuId) -> Self {
        ConsoleControl {
            state: AtomicU8::new(WorkerState::Idle as u8),
            active_menu: Mutex::new(root),
            stop: AtomicBool::new(false),
            lines: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn active_menu(&self) -> MenuId {
        *self.active_menu.lock()
    }

    fn set_active_menu(&self, menu: MenuId) {
        *self.active_menu.lock() = menu;
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

// ============================================================================
// Loop
// ============================================================================

/// Timing and text of the loop.
#[derive(Debug, Clone)]
pub(crate) struct LoopSettings {
    pub banner: String,
    pub prompt_timeout: Timeout,
    pub write_timeout: Timeout,
    pub error_backoff: Duration,
    pub watchdog_timeout: Option<Duration>,
}

pub(crate) struct WorkerLoop {
    name: String,
    control: Arc<ConsoleControl>,
    comms: Arc<CommsInstance>,
    registry: Arc<CommandRegistry>,
    settings: LoopSettings,
    labels: MetricLabels,
    codec: LineCodec,
    echo: BytesMut,
    at_line_start: bool,
    watchdog: Option<HandlerWatchdog>,
}

impl WorkerLoop {
    pub(crate) fn new(
        name: String,
        control: Arc<ConsoleControl>,
        comms: Arc<CommsInstance>,
        registry: Arc<CommandRegistry>,
        settings: LoopSettings,
    ) -> Self {
        let labels = MetricLabels::new(name.clone(), comms.backend());
        WorkerLoop {
            name,
            control,
            comms,
            registry,
            settings,
            labels,
            codec: LineCodec::new(),
            echo: BytesMut::new(),
            at_line_start: true,
            watchdog: None,
        }
    }

    /// Run until the control block asks the worker to stop.
    pub(crate) fn run(mut self) {
        info!("Started console '{}'", self.name);
        self.control.set_state(WorkerState::Idle);

        if let Some(timeout) = self.settings.watchdog_timeout {
            match HandlerWatchdog::new(&self.name, timeout) {
                Ok(watchdog) => self.watchdog = Some(watchdog),
                Err(e) => warn!(console = %self.name, error = %e, "failed to start handler watchdog"),
            }
        }

        if let Err(e) = self.comms.open() {
            warn!(console = %self.name, error = %e, "transport open failed");
        }

        if !self.settings.banner.is_empty() {
            let mut out = self.comms.writer(self.settings.write_timeout);
            let _ = out.write_str(&self.settings.banner);
            if let Err(e) = out.finish() {
                warn!(console = %self.name, error = %e, "banner write failed");
            }
        }

        while !self.control.stop_requested() {
            self.prompt();
        }

        self.control.set_state(WorkerState::Stopped);
        if let Err(e) = self.comms.close() {
            warn!(console = %self.name, error = %e, "transport close failed");
        }
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.stop();
        }
        info!("Stopped console '{}'", self.name);
    }

    /// One iteration: prompt if a new line starts, then take at most one byte.
    fn prompt(&mut self) {
        if self.at_line_start {
            let menu = self.control.active_menu();
            let name = self.registry.menu(menu).map(|m| m.name()).unwrap_or("?");
            let prompt = format!("{}> ", name);
            if let Err(e) = self.comms.write_str(&prompt, self.settings.write_timeout) {
                self.transport_error("write", e);
                return;
            }
            self.at_line_start = false;
            self.control.set_state(WorkerState::AwaitingInput);
        }

        let mut byte = [0u8; 1];
        match self.comms.read(&mut byte, self.settings.prompt_timeout) {
            Ok(()) => {}
            // No byte this turn.
            Err(e) if e.is_timeout() => return,
            Err(e) => {
                self.transport_error("read", e);
                return;
            }
        }

        self.echo.clear();
        let event = self.codec.push(byte[0], &mut self.echo);
        if self.comms.config().echo && !self.echo.is_empty() {
            if let Err(e) = self.comms.write(&self.echo, self.settings.write_timeout) {
                self.transport_error("echo", e);
            }
        }

        match event {
            LineEvent::Pending => {}
            LineEvent::Cancelled => self.at_line_start = true,
            LineEvent::Line(line) => {
                self.handle_line(&line);
                self.at_line_start = true;
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        self.control.lines.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(metric_defs::CONSOLE_LINES.name, &self.labels.to_labels()).increment(1);
        self.control.set_state(WorkerState::Matching);

        let registry = Arc::clone(&self.registry);
        let menu = self.control.active_menu();

        match resolve(&registry, menu, line) {
            Dispatch::Help => self.write_help(&registry, menu),
            Dispatch::Invoke(found) => {
                let CommandAction::Callback(callback) = found.descriptor.action() else {
                    self.control.set_state(WorkerState::Idle);
                    return;
                };
                let command = found.descriptor.command();
                debug!(console = %self.name, command, remainder = found.remainder, "dispatching");
                self.control.set_state(WorkerState::Dispatching);
                self.control.dispatched.fetch_add(1, Ordering::Relaxed);
                let labels = self.labels.with(&[("command", command.to_string())]);
                metrics::counter!(metric_defs::CONSOLE_DISPATCHED.name, &labels).increment(1);

                if let Some(watchdog) = &self.watchdog {
                    watchdog.begin(command, found.remainder);
                }
                let started = Instant::now();
                let args = CallbackArgs::new(
                    found.descriptor,
                    found.remainder,
                    &self.comms,
                    self.settings.write_timeout,
                );
                callback(&args);
                let elapsed = started.elapsed();
                if let Some(watchdog) = &self.watchdog {
                    watchdog.end();
                }

                metrics::histogram!(metric_defs::CONSOLE_HANDLER_TIME.name, &labels)
                    .record(elapsed.as_micros() as f64);
                debug!(console = %self.name, command, elapsed_us = elapsed.as_micros() as u64, "handler returned");
            }
            Dispatch::Enter(target) | Dispatch::Parent(target) => {
                self.control.set_active_menu(target);
                debug!(
                    console = %self.name,
                    menu = registry.menu(target).map(|m| m.name()).unwrap_or("?"),
                    "active menu changed"
                );
            }
            Dispatch::NotFound => {
                self.control.not_found.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(metric_defs::CONSOLE_NOT_FOUND.name, &self.labels.to_labels()).increment(1);
                debug!(console = %self.name, line, "command not found");
                let response = format!("{}\r\n", NOT_FOUND);
                if let Err(e) = self.comms.write_str(&response, self.settings.write_timeout) {
                    self.transport_error("write", e);
                }
            }
        }

        self.control.set_state(WorkerState::Idle);
    }

    fn write_help(&mut self, registry: &CommandRegistry, menu: MenuId) {
        let text = help_text(registry, menu);
        let result = self
            .comms
            .lock_scoped(LockKind::Tx, self.settings.write_timeout)
            .and_then(|_guard| {
                let mut out = self.comms.writer(self.settings.write_timeout);
                let _ = out.write_str(&text);
                out.finish()
            });
        if let Err(e) = result {
            self.transport_error("help", e);
        }
    }

    fn transport_error(&self, op: &'static str, e: CommsError) {
        error!(console = %self.name, op, error = %e, "transport error");
        self.control.transport_errors.fetch_add(1, Ordering::Relaxed);
        let labels = self.labels.with(&[("op", op.to_string())]);
        metrics::counter!(metric_defs::CONSOLE_TRANSPORT_ERRORS.name, &labels).increment(1);
        thread::sleep(self.settings.error_backoff);
    }
}

/// Start `worker` on its own thread with a stack of `stack_size` bytes.
pub(crate) fn spawn(config: &WorkerConfig, stack_size: usize, worker: WorkerLoop) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(config.name.clone())
        .stack_size(stack_size)
        .spawn(move || worker.run())
}
