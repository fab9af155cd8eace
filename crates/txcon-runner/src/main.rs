//! `txcon`: runs the demo console until Ctrl-C.
//!
//! Usage:
//!   txcon                                   # console on stdin/stdout
//!   txcon --transport tcp --bind 0.0.0.0:4321
//!   txcon --config txcon.yaml
//!
//! Logs go to stderr; set `RUST_LOG` to change the level.

use clap::Parser;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use txcon_console::Feature;
use txcon_runner::{AppSettings, Application, TransportKind};

#[derive(Parser, Debug)]
#[command(name = "txcon", about = "Interactive command console over stdio or TCP")]
struct Cli {
    /// YAML settings file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transport the console talks through.
    #[arg(short, long, value_enum)]
    transport: Option<TransportKind>,

    /// Listen address for the TCP transport.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Byte pool size in bytes.
    #[arg(long)]
    arena_size: Option<usize>,

    /// Do not echo operator input.
    #[arg(long)]
    no_echo: bool,
}

impl Cli {
    fn settings(&self) -> Result<AppSettings, Box<dyn Error>> {
        let mut settings = match &self.config {
            Some(path) => AppSettings::load(path)?,
            None => AppSettings::default(),
        };
        if let Some(kind) = self.transport {
            settings.transport.kind = kind;
        }
        if let Some(bind) = self.bind {
            settings.transport.bind = bind;
        }
        if let Some(size) = self.arena_size {
            settings.arena.size = size;
        }
        if self.no_echo {
            settings.console.echo = false;
        }
        Ok(settings)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = cli.settings()?;
    txcon_metrics::describe_metrics();

    let app = Application::new(settings)?;
    app.define();

    let status = app.console().get_status();
    if !status.is_ok() {
        error!("Console failed to start (status {})", status.return_code);
        return Err(format!("console status {}", status.return_code).into());
    }
    if app.settings().transport.kind == TransportKind::Tcp {
        info!("Console listening on {}", app.settings().transport.bind);
    }

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;

    let _ = stop_rx.recv();
    info!("Shutting down");
    app.shutdown();
    Ok(())
}
