//! Handlers of the demo command set.
//!
//! Every handler writes its output through the console transport and ends
//! with `done`.

use crate::field::field_table;
use crate::FeatureTable;
use std::fmt::Write as _;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;
use txcon_comms::LockKind;
use txcon_console::{CallbackArgs, RegistryBuilder};

/// Scheduler tick.
pub const TICK: Duration = Duration::from_millis(10);

/// How long `feature start` and `feature stop` pretend to work, in ticks.
pub const DEMO_DELAY_TICKS: u32 = 100;

/// Add the root menu `#` to `builder` with the demo commands in it.
pub fn register(builder: &mut RegistryBuilder, features: &Arc<FeatureTable>) {
    let root = builder.menu("#");
    builder
        .command(
            root,
            "feature start",
            "Starts a feature. USAGE: feature start <feature_name>",
            feature_start,
        )
        .command(
            root,
            "feature stop",
            "Stops a feature. USAGE: feature stop <feature_name>",
            feature_stop,
        )
        .command_with_context(
            root,
            "feature status",
            "Lists every feature with its status.",
            feature_status,
            Arc::clone(features),
        )
        .command(root, "custom", "Tabulates the magnetic field around a wire.", custom);
}

fn feature_start(args: &CallbackArgs<'_>) {
    pretend_work(args, "Starting");
}

fn feature_stop(args: &CallbackArgs<'_>) {
    pretend_work(args, "Stopping");
}

fn pretend_work(args: &CallbackArgs<'_>, verb: &str) {
    let mut out = args.out();
    let _ = match args.remainder() {
        "" => write!(out, "{} feature...", verb),
        name => write!(out, "{} feature {}...", verb, name),
    };
    thread::sleep(TICK * DEMO_DELAY_TICKS);
    let _ = writeln!(out, "done");
    if let Err(e) = out.finish() {
        warn!(command = args.command(), error = %e, "output failed");
    }
}

fn feature_status(args: &CallbackArgs<'_>) {
    // Keep the table in one piece when another thread writes to the operator.
    let _guard = match args.comms().lock_scoped(LockKind::Tx, args.write_timeout()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            warn!(error = %e, "writing status table unlocked");
            None
        }
    };

    let mut out = args.out();
    let _ = writeln!(out, "Getting feature status...");
    let _ = writeln!(out, "| {:>32} | {:^10} |", "Feature", "Status");
    let _ = writeln!(out, "|{}|{}|", "-".repeat(34), "-".repeat(12));
    match args.context::<FeatureTable>() {
        Some(table) => {
            for feature in table.snapshot() {
                let status = feature.get_status();
                let _ = writeln!(out, "| {:>32} | {:>10} |", feature.name(), status.return_code);
            }
        }
        None => warn!("feature status called without a feature table"),
    }
    let _ = writeln!(out, "done");
    if let Err(e) = out.finish() {
        warn!(command = args.command(), error = %e, "output failed");
    }
}

fn custom(args: &CallbackArgs<'_>) {
    let mut out = args.out();
    let _ = writeln!(out, "Starting custom code...");
    let _ = writeln!(out, "|   B(uT)   | Dist(mm) | Current(A) |");
    let _ = writeln!(out, "|-----------|----------|------------|");
    for sample in field_table() {
        let _ = writeln!(
            out,
            "| {:9.3} | {:8.1} | {:10.1} |",
            sample.field_ut, sample.distance_mm, sample.current_a
        );
    }
    let _ = writeln!(out, "done");
    if let Err(e) = out.finish() {
        warn!(command = args.command(), error = %e, "output failed");
    }
}
