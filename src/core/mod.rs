//! Core session engine.
//!
//! - **pty**: Unix pseudo-terminal child processes
//! - **term**: ANSI/VT screen emulation
//! - **sink**: output observer interface for the PTY read loop
//! - **session**: PTY + screen + raw buffer for one command
//! - **registry**: id to session catalog shared by transports
//!
//! # Architecture
//!
//! ```text
//! SessionRegistry
//! └── Session
//!     ├── PtySession (child process, master fd, reader thread)
//!     └── SessionOutput (OutputSink)
//!         ├── raw byte buffer
//!         └── ScreenBuffer (grid + cursor + parser)
//! ```

pub mod pty;
pub mod registry;
pub mod session;
pub mod sink;
pub mod term;
