//! Metrics infrastructure for the txconsole crates.
//!
//! Every metric the arena, transport and console crates record is declared here
//! once in [`metric_defs`], so names cannot drift between the code that records
//! them and the code that describes them. The `metrics` crate is re-exported
//! for convenience.
//!
//! No recorder is installed by this crate. Without one, recording is a no-op.
//!
//! # Example
//!
//! ```rust,ignore
//! use txcon_metrics::{metric_defs, describe_metrics, MetricLabels};
//!
//! describe_metrics();
//!
//! let labels = MetricLabels::new("Console Thread", "memory");
//! metrics::counter!(metric_defs::CONSOLE_DISPATCHED.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// How a metric is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// A declared metric: name, kind, unit, description and label keys.
#[derive(Debug, Clone, Copy)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub unit: Unit,
    pub description: &'static str,
    /// Label keys the recording sites attach, in order.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Register the description and unit with the installed recorder.
    pub fn describe(&self) {
        let (name, unit, description) = (self.name, self.unit, self.description);
        match self.kind {
            MetricKind::Counter => describe_counter!(name, unit, description),
            MetricKind::Gauge => describe_gauge!(name, unit, description),
            MetricKind::Histogram => describe_histogram!(name, unit, description),
        }
    }

    /// Whether `key` is one of this metric's label keys.
    pub fn has_label(&self, key: &str) -> bool {
        self.labels.contains(&key)
    }
}

/// Declares each metric as a `Metric` constant and collects them all in `ALL`.
macro_rules! declare_metrics {
    (
        $(
            $(#[$doc:meta])*
            $ident:ident: $kind:ident($name:literal, $unit:ident, [$($label:literal),*]) => $desc:literal;
        )*
    ) => {
        $(
            $(#[$doc])*
            pub const $ident: Metric = Metric {
                name: $name,
                kind: MetricKind::$kind,
                unit: Unit::$unit,
                description: $desc,
                labels: &[$($label),*],
            };
        )*

        /// Every declared metric.
        pub const ALL: &[&Metric] = &[$(&$ident),*];
    };
}

/// All metric definitions.
pub mod metric_defs {
    use super::{Metric, MetricKind, Unit};

    declare_metrics! {
        // ====================================================================
        // Arena
        // ====================================================================

        /// Bytes carved from an arena so far.
        ARENA_BYTES_USED: Gauge("txcon.arena.bytes_used", Bytes, ["arena"])
            => "Bytes carved from the arena";

        /// Allocation requests the arena could not satisfy.
        ARENA_ALLOC_FAILURES: Counter("txcon.arena.alloc_failures", Count, ["arena"])
            => "Allocation requests refused by the arena";

        // ====================================================================
        // Transport
        // ====================================================================

        /// Bytes delivered by successful transport reads.
        COMMS_RX_BYTES: Counter("txcon.comms.rx_bytes", Bytes, ["backend"])
            => "Bytes read from the transport";

        /// Bytes accepted by transport writes, including partial writes.
        COMMS_TX_BYTES: Counter("txcon.comms.tx_bytes", Bytes, ["backend"])
            => "Bytes written to the transport";

        // ====================================================================
        // Console
        // ====================================================================

        /// Complete input lines received by the worker.
        CONSOLE_LINES: Counter("txcon.console.lines", Count, ["console", "backend"])
            => "Input lines received by the console worker";

        /// Commands dispatched to a handler.
        CONSOLE_DISPATCHED: Counter("txcon.console.dispatched", Count, ["console", "backend", "command"])
            => "Commands dispatched to a handler";

        /// Lines that matched no command in the active menu.
        CONSOLE_NOT_FOUND: Counter("txcon.console.not_found", Count, ["console", "backend"])
            => "Lines that matched no command";

        /// Transport errors observed by the worker loop.
        CONSOLE_TRANSPORT_ERRORS: Counter("txcon.console.transport_errors", Count, ["console", "backend", "op"])
            => "Transport errors logged by the console worker";

        /// Wall-clock time spent inside command handlers.
        CONSOLE_HANDLER_TIME: Histogram("txcon.console.handler_time_us", Microseconds, ["console", "backend", "command"])
            => "Time spent inside a command handler in microseconds";

        /// Handlers that outlived the watchdog timeout.
        CONSOLE_WATCHDOG_ALERTS: Counter("txcon.console.watchdog_alerts", Count, ["console"])
            => "Command handlers that exceeded the watchdog timeout";
    }
}

/// Labels identifying which console and transport backend a metric belongs to.
///
/// ```rust
/// use txcon_metrics::MetricLabels;
///
/// let labels = MetricLabels::new("Console Thread", "tcp");
/// let extended = labels.with(&[("command", "custom".to_string())]);
/// assert_eq!(extended.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabels {
    pub console: String,
    pub backend: String,
}

impl MetricLabels {
    pub fn new(console: impl Into<String>, backend: impl Into<String>) -> Self {
        MetricLabels {
            console: console.into(),
            backend: backend.into(),
        }
    }

    /// `console` and `backend` as `metrics` label pairs.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("console", self.console.clone()), ("backend", self.backend.clone())]
    }

    /// [`to_labels`](Self::to_labels) followed by `extra`.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend(extra.iter().cloned());
        labels
    }
}

/// Describe every metric in [`metric_defs::ALL`].
///
/// Call once at start-up, after installing a recorder.
pub fn describe_metrics() {
    metric_defs::ALL.iter().for_each(|metric| metric.describe());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_labels() {
        let labels = MetricLabels::new("Console Thread", "memory");
        assert_eq!(
            labels.to_labels(),
            vec![
                ("console", "Console Thread".to_string()),
                ("backend", "memory".to_string())
            ]
        );

        let extended = labels.with(&[("command", "feature status".to_string())]);
        assert_eq!(extended.len(), 3);
        assert_eq!(extended[2], ("command", "feature status".to_string()));
    }

    #[test]
    fn test_declared_metrics() {
        assert_eq!(metric_defs::ALL.len(), 10);
        assert_eq!(metric_defs::ARENA_BYTES_USED.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::ARENA_BYTES_USED.unit, Unit::Bytes);
        assert_eq!(metric_defs::CONSOLE_HANDLER_TIME.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::CONSOLE_HANDLER_TIME.unit, Unit::Microseconds);
        assert!(metric_defs::CONSOLE_TRANSPORT_ERRORS.has_label("op"));
        assert!(!metric_defs::CONSOLE_LINES.has_label("command"));
    }

    #[test]
    fn test_names_unique_and_prefixed() {
        let mut names: Vec<&str> = metric_defs::ALL.iter().map(|m| m.name).collect();
        assert!(names.iter().all(|name| name.starts_with("txcon.")));
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_recording_sites_use_console_label_keys() {
        // Metrics recorded with `MetricLabels` must declare its keys first.
        for metric in [
            &metric_defs::CONSOLE_LINES,
            &metric_defs::CONSOLE_DISPATCHED,
            &metric_defs::CONSOLE_NOT_FOUND,
            &metric_defs::CONSOLE_TRANSPORT_ERRORS,
            &metric_defs::CONSOLE_HANDLER_TIME,
        ] {
            assert_eq!(&metric.labels[..2], &["console", "backend"], "{}", metric.name);
        }
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }
}
