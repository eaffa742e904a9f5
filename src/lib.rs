//! termwrap - drive interactive terminal programs through a PTY
//!
//! termwrap runs commands on Unix pseudo-terminals and keeps two views of
//! their output: the raw byte stream and an emulated screen that answers
//! "what would a user see right now". A registry manages many such sessions
//! for transports (HTTP polling, WebSocket relays, test harnesses).
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use termwrap::SessionRegistry;
//!
//! let registry = SessionRegistry::default();
//! let id = registry.create(vec!["cat".into()], 24, 80, None)?;
//! registry.start(&id)?;
//! registry.write_input(&id, b"hello\n");
//!
//! if let Some(session) = registry.get(&id) {
//!     session.wait_for_screen("hello", Duration::from_secs(1))?;
//! }
//! println!("{}", registry.screen(&id)?.lines[0]);
//! registry.delete(&id);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#[cfg(not(unix))]
compile_error!("termwrap requires a Unix platform");

pub mod config;
pub mod core;
pub mod relay;
pub mod ui;
pub mod utils;

pub use crate::config::Config;
pub use crate::core::pty::{ExitState, PtyError, PtySession, SpawnError, SpawnOptions, StartupError};
pub use crate::core::registry::{RegistryConfig, RegistryError, SessionRegistry};
pub use crate::core::session::{Session, SessionInfo};
pub use crate::core::sink::OutputSink;
pub use crate::core::term::{CursorPos, ScreenBuffer, ScreenSnapshot};
pub use crate::relay::{EscapeFilter, Relay, RelayEnd};
pub use crate::utils::{extract_visible_text, strip_ansi, wait_until, TimeoutError};
