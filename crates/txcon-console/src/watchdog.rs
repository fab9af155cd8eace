//! Watchdog thread for handlers that take too long.
//!
//! Handlers run on the worker thread and may block it indefinitely. The
//! watchdog runs beside the worker and, if one handler runs longer than the
//! configured timeout, logs which command is stuck. It only observes: the
//! handler is never interrupted.

use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::warn;
use txcon_metrics::{metric_defs, metrics};

const MAX_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// The handler currently running.
#[derive(Debug, Clone)]
pub struct HandlerInfo {
    /// Sequential dispatch number.
    pub number: u64,
    pub command: String,
    pub remainder: String,
    pub started_at: Instant,
}

#[derive(Debug, Default)]
struct WatchdogState {
    current: Mutex<Option<HandlerInfo>>,
    stop_flag: AtomicBool,
    dispatches: AtomicU64,
    alert_count: AtomicU64,
}

/// Watchdog thread handle.
#[derive(Debug)]
pub struct HandlerWatchdog {
    state: Arc<WatchdogState>,
    thread_handle: Option<JoinHandle<()>>,
    timeout: Duration,
}

impl HandlerWatchdog {
    /// Start a watchdog for the console called `console`.
    pub fn new(console: &str, timeout: Duration) -> io::Result<Self> {
        let state = Arc::new(WatchdogState::default());
        let watchdog_state = Arc::clone(&state);
        let check_interval = (timeout / 4).clamp(Duration::from_millis(1), MAX_CHECK_INTERVAL);
        let console_name = console.to_string();

        let thread_handle = thread::Builder::new()
            .name(format!("{} watchdog", console))
            .spawn(move || {
                let mut last_alerted: Option<u64> = None;

                while !watchdog_state.stop_flag.load(Ordering::Relaxed) {
                    thread::sleep(check_interval);

                    let Some(info) = watchdog_state.current.lock().clone() else {
                        continue;
                    };
                    let elapsed = info.started_at.elapsed();

                    // Once per dispatch.
                    if elapsed >= timeout && last_alerted != Some(info.number) {
                        last_alerted = Some(info.number);
                        let alert = watchdog_state.alert_count.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(
                            console = %console_name,
                            alert,
                            command = %info.command,
                            remainder = %info.remainder,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "handler running longer than {:?}",
                            timeout
                        );
                        metrics::counter!(
                            metric_defs::CONSOLE_WATCHDOG_ALERTS.name,
                            "console" => console_name.clone()
                        )
                        .increment(1);
                    }
                }
            })?;

        Ok(HandlerWatchdog {
            state,
            thread_handle: Some(thread_handle),
            timeout,
        })
    }

    /// Record that a handler for `command` is starting.
    pub fn begin(&self, command: &str, remainder: &str) {
        let number = self.state.dispatches.fetch_add(1, Ordering::Relaxed) + 1;
        *self.state.current.lock() = Some(HandlerInfo {
            number,
            command: command.to_string(),
            remainder: remainder.to_string(),
            started_at: Instant::now(),
        });
    }

    /// Record that the handler returned.
    pub fn end(&self) {
        *self.state.current.lock() = None;
    }

    /// The handler currently running, if any.
    pub fn current(&self) -> Option<HandlerInfo> {
        self.state.current.lock().clone()
    }

    pub fn alert_count(&self) -> u64 {
        self.state.alert_count.load(Ordering::Relaxed)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Stop the watchdog thread and wait for it to finish.
    pub fn stop(mut self) {
        self.state.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HandlerWatchdog {
    fn drop(&mut self) {
        self.state.stop_flag.store(true, Ordering::Relaxed);
    }
}
