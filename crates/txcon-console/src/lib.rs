//! # txcon-console
//!
//! An interactive line console: one worker thread reads operator input from a
//! transport, matches each line against the active menu and runs the matching
//! handler.
//!
//! ## Pieces
//!
//! - [`RegistryBuilder`] / [`CommandRegistry`]: the immutable menu tree
//! - [`resolve`] / [`match_command`]: longest-prefix command matching
//! - [`LineCodec`]: line assembly with echo, backspace and Ctrl-C
//! - [`Console`]: carves the control block and worker stack from an
//!   [`Arena`](txcon_arena::Arena) and starts the worker
//! - [`HandlerWatchdog`]: reports handlers that block the worker too long
//! - [`Feature`]: the contract between the console and the application
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use txcon_arena::Arena;
//! use txcon_comms::{CommsInstance, StdioComms};
//! use txcon_console::{CallbackArgs, Console, ConsoleSettings, RegistryBuilder};
//!
//! fn hello(args: &CallbackArgs<'_>) {
//!     use std::fmt::Write;
//!     let mut out = args.out();
//!     let _ = writeln!(out, "hello {}", args.remainder());
//!     let _ = writeln!(out, "done");
//! }
//!
//! let arena = Arc::new(Arena::new("byte pool", 1 << 20).unwrap());
//! let settings = ConsoleSettings::default();
//! let comms = Arc::new(CommsInstance::new(
//!     Box::new(StdioComms::new()),
//!     Arc::new(settings.comms_config()),
//! ));
//!
//! let mut builder = RegistryBuilder::new();
//! let root = builder.menu("#");
//! builder.command(root, "hello", "Greets the operator", hello);
//! let registry = Arc::new(builder.build().unwrap());
//!
//! let console = Console::define(arena, comms, registry, settings);
//! assert!(console.get_status().is_ok());
//! ```

mod dispatch;
mod error;
mod facade;
mod feature;
mod line;
mod registry;
mod watchdog;
mod worker;

pub use dispatch::{help_text, match_command, resolve, CommandMatch, Dispatch, HELP_COMMAND, NOT_FOUND, PARENT_COMMAND};
pub use error::{ConsoleError, ConsoleResult};
pub use facade::{Console, ConsoleSettings, ConsoleStats, DEFAULT_CONSOLE_NAME, DEFAULT_STACK_SIZE};
pub use feature::{Feature, FeatureStatus};
pub use line::{LineCodec, LineEvent, MAX_LINE_LENGTH};
pub use registry::{
    Callback, CallbackArgs, CommandAction, CommandDescriptor, CommandRegistry, Menu, MenuId,
    RegistryBuilder,
};
pub use watchdog::{HandlerInfo, HandlerWatchdog};
pub use worker::{WorkerConfig, WorkerState};
