//! Integration tests driving a running console through the memory transport.

use parking_lot::Mutex;
use std::fmt::Write as _;
use std::io::{Read, Write as _};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};
use txcon_arena::{Arena, ArenaError};
use txcon_comms::{CommsConfig, CommsError, CommsInstance, MemoryComms, MemoryHost, TcpComms, Timeout};
use txcon_console::{
    CallbackArgs, CommandRegistry, Console, ConsoleError, ConsoleSettings, RegistryBuilder, WorkerState,
    NOT_FOUND,
};

const WAIT: Duration = Duration::from_secs(5);

/// Calls seen by the test handlers, as (handler, remainder).
#[derive(Default)]
struct Calls(Mutex<Vec<(&'static str, String)>>);

impl Calls {
    fn take(&self) -> Vec<(&'static str, String)> {
        std::mem::take(&mut *self.0.lock())
    }
}

fn record(args: &CallbackArgs<'_>, handler: &'static str) {
    if let Some(calls) = args.context::<Calls>() {
        calls.0.lock().push((handler, args.remainder().to_string()));
    }
    let mut out = args.out();
    let _ = writeln!(out, "done");
}

fn status_handler(args: &CallbackArgs<'_>) {
    record(args, "status");
}

fn start_handler(args: &CallbackArgs<'_>) {
    record(args, "start");
}

fn ping_handler(args: &CallbackArgs<'_>) {
    record(args, "ping");
}

fn registry(calls: &Arc<Calls>) -> Arc<CommandRegistry> {
    let mut builder = RegistryBuilder::new();
    let root = builder.menu("#");
    let diag = builder.submenu(root, "diag");
    builder
        .command_with_context(root, "feature status", "Shows feature status.", status_handler, Arc::clone(calls))
        .command_with_context(root, "feature start", "Starts a feature.", start_handler, Arc::clone(calls))
        .enter(root, "diag", "Diagnostics menu.", diag)
        .command_with_context(diag, "ping", "Answers with done.", ping_handler, Arc::clone(calls));
    Arc::new(builder.build().unwrap())
}

fn settings() -> ConsoleSettings {
    ConsoleSettings {
        banner: "Welcome\n".into(),
        stack_size: 256 * 1024,
        prompt_timeout_ms: 20,
        write_timeout_ms: 1000,
        error_backoff_ms: 10,
        ..Default::default()
    }
}

fn start_with(settings: ConsoleSettings, arena_size: usize) -> (Console, MemoryHost, Arc<Calls>) {
    let calls = Arc::new(Calls::default());
    let arena = Arc::new(Arena::new("test pool", arena_size).unwrap());
    let (comms, host) = MemoryComms::pair();
    let comms = Arc::new(CommsInstance::new(Box::new(comms), Arc::new(settings.comms_config())));
    let console = Console::define(arena, comms, registry(&calls), settings);
    (console, host, calls)
}

fn start() -> (Console, MemoryHost, Arc<Calls>) {
    let (console, host, calls) = start_with(settings(), 1 << 20);
    let greeting = host.wait_for_output("#> ", WAIT).expect("no prompt");
    assert_eq!(greeting, "Welcome\r\n#> ");
    (console, host, calls)
}

fn command(host: &MemoryHost, line: &str, prompt: &str) -> String {
    host.send_str(line);
    host.wait_for_output(prompt, WAIT).unwrap_or_else(|| panic!("no {:?} after {:?}", prompt, line))
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn test_longest_prefix_dispatch() {
    let (console, host, calls) = start();

    let out = command(&host, "feature status\r\n", "#> ");
    assert_eq!(out, "feature status\r\ndone\r\n#> ");
    assert_eq!(calls.take(), vec![("status", String::new())]);

    command(&host, "feature start extra\r", "#> ");
    assert_eq!(calls.take(), vec![("start", "extra".to_string())]);

    let stats = console.stats();
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.lines, 2);
    console.shutdown().unwrap();
}

#[test]
fn test_not_found_keeps_console_responsive() {
    let (console, host, calls) = start();

    let out = command(&host, "feature stat\r", "#> ");
    assert_eq!(out.matches(NOT_FOUND).count(), 1);
    assert!(calls.take().is_empty());

    command(&host, "feature status\r", "#> ");
    assert_eq!(calls.take().len(), 1);

    assert_eq!(console.stats().not_found, 1);
    console.shutdown().unwrap();
}

#[test]
fn test_help_lists_commands_in_order() {
    let (console, host, _calls) = start();

    let out = command(&host, "?\r", "#> ");
    let helps = ["Shows feature status.", "Starts a feature.", "Diagnostics menu."];
    let positions: Vec<usize> = helps
        .iter()
        .map(|help| {
            assert_eq!(out.matches(help).count(), 1, "{:?} in {:?}", help, out);
            out.find(help).unwrap()
        })
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    // Empty input lists too.
    let out = command(&host, "\r", "#> ");
    assert!(out.contains("Starts a feature."));
    console.shutdown().unwrap();
}

#[test]
fn test_submenu_navigation() {
    let (console, host, calls) = start();

    command(&host, "diag\r", "diag> ");
    assert_eq!(console.stats().menu, "diag");

    // Root commands are not reachable from the sub-menu.
    let out = command(&host, "feature status\r", "diag> ");
    assert!(out.contains(NOT_FOUND));

    command(&host, "ping\r", "diag> ");
    assert_eq!(calls.take(), vec![("ping", String::new())]);

    let out = command(&host, "?\r", "diag> ");
    assert!(out.contains("Return to #"));

    command(&host, "^\r", "#> ");
    assert_eq!(console.stats().menu, "#");
    console.shutdown().unwrap();
}

#[test]
fn test_line_editing() {
    let (console, host, calls) = start();

    command(&host, "feature stax\x08rt now\r", "#> ");
    assert_eq!(calls.take(), vec![("start", "now".to_string())]);

    let out = command(&host, "garbage\x03", "#> ");
    assert!(out.contains("^C"));
    assert!(!out.contains(NOT_FOUND));
    assert_eq!(console.stats().lines, 1);
    console.shutdown().unwrap();
}

#[test]
fn test_echo_off() {
    let settings = ConsoleSettings {
        echo: false,
        ..settings()
    };
    let (console, host, _calls) = start_with(settings, 1 << 20);
    host.wait_for_output("#> ", WAIT).unwrap();

    let out = command(&host, "feature status\r", "#> ");
    assert_eq!(out, "done\r\n#> ");
    console.shutdown().unwrap();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_arena_smaller_than_stack() {
    let settings = ConsoleSettings {
        stack_size: 64 * 1024,
        ..settings()
    };
    let (console, host, _calls) = start_with(settings, 4096);

    assert!(!console.has_worker());
    assert!(console.control_block().is_some());
    assert!(console.stack().is_none());
    assert!(matches!(
        console.failure(),
        Some(ConsoleError::Allocation(ArenaError::OutOfMemory { .. }))
    ));
    assert_eq!(console.get_status().return_code, 9);
    assert_eq!(console.stats().state, WorkerState::Idle);

    // The arena is still usable for unrelated allocations.
    let block = console.arena().allocate(1024).unwrap();
    assert_eq!(block.len(), 1024);

    // Nobody opened the transport or wrote a banner.
    assert!(host.wait_for_output("Welcome", Duration::from_millis(50)).is_none());
    console.shutdown().unwrap();
}

#[test]
fn test_shutdown_closes_transport() {
    let (console, _host, _calls) = start();
    assert!(console.get_status().is_ok());

    console.shutdown().unwrap();
    assert_eq!(console.stats().state, WorkerState::Stopped);
    assert!(!console.get_status().is_ok());
    assert!(matches!(
        console.comms().write_str("late", Timeout::NoWait),
        Err(CommsError::NotOpen)
    ));
    // A second shutdown is a no-op.
    console.shutdown().unwrap();
}

#[test]
fn test_transport_errors_do_not_stop_worker() {
    let (console, host, _calls) = start();
    drop(host);

    std::thread::sleep(Duration::from_millis(100));
    let stats = console.stats();
    assert!(stats.transport_errors > 0);
    assert!(console.get_status().is_ok());
    console.shutdown().unwrap();
}

#[test]
fn test_autostart_open_reported_and_ignored() {
    let settings = ConsoleSettings {
        autostart: true,
        ..settings()
    };
    let calls = Arc::new(Calls::default());
    let arena = Arc::new(Arena::new("test pool", 1 << 20).unwrap());
    let (comms, host) = MemoryComms::pair();
    let cfg = Arc::new(CommsConfig::new().with_autostart(true));
    let comms = Arc::new(CommsInstance::new(Box::new(comms), cfg));
    let console = Console::define(arena, comms, registry(&calls), settings);

    // The worker's own open fails with AlreadyOpen; the banner still goes out.
    assert!(host.wait_for_output("Welcome\r\n#> ", WAIT).is_some());
    console.shutdown().unwrap();
}

// ============================================================================
// TCP operator
// ============================================================================

fn free_loopback_addr() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap()
}

fn connect(addr: SocketAddr) -> TcpStream {
    let deadline = Instant::now() + WAIT;
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return stream,
            Err(_) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(10)),
            Err(e) => panic!("console never listened on {}: {}", addr, e),
        }
    }
}

fn read_until(stream: &mut TcpStream, pattern: &str) -> String {
    let deadline = Instant::now() + WAIT;
    let mut seen = Vec::new();
    let mut buf = [0u8; 256];
    while !String::from_utf8_lossy(&seen).contains(pattern) {
        assert!(Instant::now() < deadline, "no {:?} in {:?}", pattern, String::from_utf8_lossy(&seen));
        match stream.read(&mut buf) {
            Ok(0) => panic!("console closed the connection"),
            Ok(n) => seen.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => panic!("read failed: {}", e),
        }
    }
    String::from_utf8_lossy(&seen).into_owned()
}

#[test]
fn test_console_over_tcp() {
    let calls = Arc::new(Calls::default());
    let settings = settings();
    let addr = free_loopback_addr();
    let arena = Arc::new(Arena::new("test pool", 1 << 20).unwrap());
    let comms = Arc::new(CommsInstance::new(
        Box::new(TcpComms::new(addr)),
        Arc::new(settings.comms_config()),
    ));
    let console = Console::define(arena, comms, registry(&calls), settings);

    let mut operator = connect(addr);
    operator.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
    read_until(&mut operator, "#> ");

    operator.write_all(b"feature start now\r").unwrap();
    let out = read_until(&mut operator, "done\r\n#> ");
    assert!(out.starts_with("feature start now\r\n"), "{:?}", out);
    assert_eq!(calls.take(), vec![("start", "now".to_string())]);

    // Bounded writes kept working, so the worker is still alive.
    assert!(console.get_status().is_ok());
    console.shutdown().unwrap();
}
