//! Session management
//!
//! A [`Session`] ties one PTY child to the two views of its output: the raw
//! byte accumulator drained by transports and the emulated screen.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::pty::{ExitState, PtyError, PtySession, Result, SpawnOptions};
use super::sink::OutputSink;
use super::term::{ScreenBuffer, ScreenSnapshot};
use crate::utils::{wait_until, TimeoutError};

/// Default cap on undrained raw output
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// How often the `wait_for_*` helpers re-check
const WAIT_INTERVAL: Duration = Duration::from_millis(10);

/// Summary handed to transports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub alive: bool,
    pub rows: u16,
    pub cols: u16,
    pub command: Vec<String>,
}

/// Raw output not yet drained, bounded by dropping the oldest bytes
struct RawBuffer {
    bytes: Vec<u8>,
    limit: usize,
}

impl RawBuffer {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit: limit.max(1),
        }
    }

    fn append(&mut self, chunk: &[u8]) {
        let total = self.bytes.len() + chunk.len();
        if total > self.limit {
            let overflow = total - self.limit;
            warn!(dropped = overflow, limit = self.limit, "Output buffer full, dropping oldest bytes");
            if chunk.len() >= self.limit {
                self.bytes.clear();
                self.bytes.extend_from_slice(&chunk[chunk.len() - self.limit..]);
                return;
            }
            self.bytes.drain(..overflow);
        }
        self.bytes.extend_from_slice(chunk);
    }

    fn drain(&mut self, clear: bool) -> Vec<u8> {
        if clear {
            std::mem::take(&mut self.bytes)
        } else {
            self.bytes.clone()
        }
    }
}

/// Sink shared with the reader thread
struct SessionOutput {
    screen: Mutex<ScreenBuffer>,
    raw: Mutex<RawBuffer>,
    finished: AtomicBool,
}

impl OutputSink for SessionOutput {
    fn accept(&self, bytes: &[u8]) {
        self.raw.lock().append(bytes);
        self.screen.lock().process_output(bytes);
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

/// A running (or finished) command with its buffers
pub struct Session {
    id: String,
    argv: Vec<String>,
    pty: PtySession,
    output: Arc<SessionOutput>,
}

impl Session {
    /// Spawn `argv` and set up empty buffers. Reading starts with
    /// [`Session::start_reading`].
    pub fn spawn(
        id: impl Into<String>,
        argv: Vec<String>,
        options: &SpawnOptions,
        max_buffer_bytes: usize,
    ) -> Result<Self> {
        let pty = PtySession::spawn(argv.as_slice(), options)?;
        let output = SessionOutput {
            screen: Mutex::new(ScreenBuffer::new(options.rows, options.cols)),
            raw: Mutex::new(RawBuffer::new(max_buffer_bytes)),
            finished: AtomicBool::new(false),
        };

        Ok(Self {
            id: id.into(),
            argv,
            pty,
            output: Arc::new(output),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Command line as given by the caller
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn pty(&self) -> &PtySession {
        &self.pty
    }

    pub fn start_reading(&self) -> Result<()> {
        self.pty.start_reading(self.output.clone())
    }

    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.pty.write(data)
    }

    /// Replace the screen with a blank one of the new size and resize the
    /// PTY. Once the PTY has closed only the screen changes.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        if rows == 0 || cols == 0 {
            return Err(PtyError::InvalidSize { rows, cols });
        }

        *self.output.screen.lock() = ScreenBuffer::new(rows, cols);
        match self.pty.resize(rows, cols) {
            Ok(()) => {}
            Err(PtyError::NotRunning) => {
                debug!(session = %self.id, "PTY already closed, resizing the screen only");
            }
            Err(e) => return Err(e),
        }
        debug!(session = %self.id, rows, cols, "Screen replaced after resize");
        Ok(())
    }

    /// Raw output since the last clearing drain
    pub fn drain(&self, clear: bool) -> Vec<u8> {
        self.output.raw.lock().drain(clear)
    }

    pub fn snapshot(&self) -> ScreenSnapshot {
        self.output.screen.lock().snapshot()
    }

    pub fn screen_text(&self) -> String {
        self.output.screen.lock().get_text()
    }

    pub fn is_alive(&self) -> bool {
        self.pty.is_alive()
    }

    pub fn exit_state(&self) -> ExitState {
        self.pty.exit_state()
    }

    /// True once no more output can arrive
    pub fn has_ended(&self) -> bool {
        if self.output.finished.load(Ordering::SeqCst) {
            return true;
        }
        !self.pty.is_reading() && !self.pty.is_alive()
    }

    pub fn info(&self) -> SessionInfo {
        let (rows, cols) = {
            let screen = self.output.screen.lock();
            (screen.rows(), screen.cols())
        };
        SessionInfo {
            session_id: self.id.clone(),
            alive: self.is_alive(),
            rows,
            cols,
            command: self.argv.clone(),
        }
    }

    pub fn kill(&self) {
        self.pty.kill();
    }

    /// Wait until the undrained raw output contains `needle`
    pub fn wait_for_output(&self, needle: &str, timeout: Duration) -> std::result::Result<(), TimeoutError> {
        let needle = needle.as_bytes();
        wait_until(timeout, WAIT_INTERVAL, || {
            let raw = self.output.raw.lock();
            contains(&raw.bytes, needle).then_some(())
        })
    }

    /// Wait until the rendered screen contains `needle`
    pub fn wait_for_screen(&self, needle: &str, timeout: Duration) -> std::result::Result<(), TimeoutError> {
        wait_until(timeout, WAIT_INTERVAL, || {
            self.screen_text().contains(needle).then_some(())
        })
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}
