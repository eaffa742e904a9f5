//! termwrap - run a command on a PTY and show or dump its screen
//!
//! ```text
//! termwrap                      # Run the configured command interactively
//! termwrap htop                 # Run htop through the virtual screen
//! termwrap --dump ls -la        # Print the final screen as JSON
//! ```

use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use crossterm::event::{self, Event};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use termwrap::config::{self, Config};
use termwrap::ui::{HostTerminal, KeyMapper, SnapshotRenderer};
use termwrap::{Session, SessionRegistry};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Host event poll interval, also the redraw cadence
const FRAME: Duration = Duration::from_millis(16);

/// Command line options
struct Args {
    dump: bool,
    timeout: Duration,
    command: Vec<String>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            dump: false,
            timeout: Duration::from_secs(5),
            command: Vec::new(),
        }
    }
}

fn print_version() {
    eprintln!("termwrap {}", VERSION);
}

fn print_help() {
    eprintln!("termwrap {} - run a command on a PTY with a virtual screen", VERSION);
    eprintln!();
    eprintln!("Usage: termwrap [OPTIONS] [COMMAND [ARGS...]]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --dump                Run to completion and print the screen as JSON");
    eprintln!("  --timeout-ms <N>      Max wait for --dump (default: 5000)");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Without COMMAND the `command` entry of the config file is used.");
    eprintln!();
    eprintln!("Configuration: ~/.termwrap/config.toml");
    eprintln!("Log file:      ~/.termwrap/termwrap.log (level via TERMWRAP_LOG)");
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "--dump" => {
                parsed.dump = true;
            }
            "--timeout-ms" => {
                i += 1;
                let value = args.get(i).ok_or("Missing --timeout-ms argument")?;
                let ms: u64 = value
                    .parse()
                    .map_err(|_| format!("Invalid --timeout-ms value: {}", value))?;
                parsed.timeout = Duration::from_millis(ms);
            }
            "--" => {
                parsed.command = args[i + 1..].to_vec();
                break;
            }
            arg if arg.starts_with('-') && parsed.command.is_empty() => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
            _ => {
                // Everything from the first positional on belongs to the command
                parsed.command = args[i..].to_vec();
                break;
            }
        }
        i += 1;
    }

    Ok(parsed)
}

fn init_logging() {
    let log_path = config::data_dir()
        .map(|dir| dir.join("termwrap.log"))
        .unwrap_or_else(|| PathBuf::from("termwrap.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env("TERMWRAP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("termwrap {} starting", VERSION);

    let config = Config::load();
    let command = if args.command.is_empty() {
        config.command.clone()
    } else {
        args.command.clone()
    };
    if command.is_empty() {
        bail!("No command given and none configured");
    }

    let registry = SessionRegistry::new(config.registry_config());
    let result = if args.dump {
        run_dump(&registry, &config, command, args.timeout)
    } else {
        run_interactive(&registry, &config, command)
    };

    registry.shutdown();
    info!("termwrap exiting");
    result
}

/// Run to completion (or timeout) and print the final screen
fn run_dump(
    registry: &SessionRegistry,
    config: &Config,
    command: Vec<String>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let (session_id, session) = open_session(registry, command, config.rows, config.cols)?;

    match session.pty().wait_exit(timeout) {
        Ok(state) => info!(session = %session_id, "Command finished: {}", state),
        Err(_) => warn!(session = %session_id, "Command still running after {:?}", timeout),
    }
    // Let the reader pick up output still queued in the PTY
    let _ = termwrap::wait_until(Duration::from_millis(500), Duration::from_millis(10), || {
        session.has_ended().then_some(())
    });

    let snapshot = registry.screen(&session_id)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    registry.delete(&session_id);
    Ok(())
}

/// Mirror the session on the host terminal until the command exits
fn run_interactive(
    registry: &SessionRegistry,
    config: &Config,
    command: Vec<String>,
) -> anyhow::Result<()> {
    let (rows, cols) = HostTerminal::size().unwrap_or((config.rows, config.cols));
    let (session_id, session) = open_session(registry, command, rows, cols)?;

    let mut host = HostTerminal::enter().context("Failed to set up host terminal")?;
    let mut renderer = SnapshotRenderer::new(rows, cols);
    let mut last = None;

    while !session.has_ended() {
        if event::poll(FRAME)? {
            match event::read()? {
                Event::Key(key) => {
                    if let Some(bytes) = KeyMapper::map(&key) {
                        registry.write_input(&session_id, &bytes);
                    }
                }
                Event::Resize(cols, rows) => {
                    if let Err(e) = registry.resize(&session_id, rows, cols) {
                        warn!("Resize to {}x{} failed: {}", rows, cols, e);
                    }
                    renderer.resize(rows, cols);
                    last = None;
                }
                _ => {}
            }
        }

        // The screen is the source of truth here; keep the raw buffer empty
        session.drain(true);

        let snapshot = session.snapshot();
        if last.as_ref() != Some(&snapshot) {
            renderer.render(&mut io::stdout().lock(), &snapshot)?;
            last = Some(snapshot);
        }
    }

    host.leave()?;
    eprintln!("[{}]", session.exit_state());
    registry.delete(&session_id);
    Ok(())
}

fn open_session(
    registry: &SessionRegistry,
    command: Vec<String>,
    rows: u16,
    cols: u16,
) -> anyhow::Result<(String, Arc<Session>)> {
    let display = command.join(" ");
    let session_id = registry
        .create(command, rows, cols, None)
        .with_context(|| format!("Failed to start `{}`", display))?;
    registry.start(&session_id)?;
    let session = registry
        .get(&session_id)
        .context("Session vanished right after creation")?;
    Ok((session_id, session))
}
