//! Demo application for the txcon console.
//!
//! Creates one byte pool, defines the console feature on it and registers
//! the demo command set: `feature start`, `feature stop`, `feature status`
//! and `custom`.

mod app;
pub mod callbacks;
pub mod field;
pub mod settings;

pub use app::{AppError, AppResult, Application, ConsoleFeature, FeatureTable};
pub use settings::{AppSettings, ArenaSettings, TransportKind, TransportSettings};
