//! Unix pseudo-terminal sessions
//!
//! [`PtySession`] owns the master side of a PTY pair and the child process
//! attached to its slave side. Output is pulled by a background reader thread
//! and pushed into an [`OutputSink`].

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::pty::{openpty, Winsize};
use nix::sys::signal::{self, Signal};
use nix::sys::termios::{self, SetArg};
use nix::unistd::{setsid, Pid};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::sink::OutputSink;
use crate::utils::{wait_until, TimeoutError};

/// Terminal type exported to children unless the caller overrides it
pub const DEFAULT_TERM: &str = "xterm-256color";

/// Bytes requested per read from the master
const READ_CHUNK: usize = 4096;
/// Reader wake-up interval while waiting for output
const POLL_INTERVAL_MS: u16 = 100;
/// Upper bound for a single blocked write
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Failed to allocate PTY: {0}")]
    Openpty(#[source] Errno),

    #[error("Failed to configure PTY: {0}")]
    Configure(#[source] Errno),

    #[error("Failed to spawn {program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Command not found or not executable: {program} (exit code {code})")]
    CommandNotFound { program: String, code: i32 },

    #[error("{program} exited during startup: {state}")]
    ExitedEarly { program: String, state: ExitState },
}

#[derive(Error, Debug)]
pub enum PtyError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error("Invalid terminal size: {rows}x{cols}")]
    InvalidSize { rows: u16, cols: u16 },

    #[error("Process is not running")]
    NotRunning,

    #[error("PTY I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// Lifecycle of the child as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum ExitState {
    Running,
    Exited(i32),
    Signaled(i32),
    /// Reaped by someone else; the status is gone
    Unknown,
}

impl ExitState {
    pub fn is_running(&self) -> bool {
        matches!(self, ExitState::Running)
    }
}

impl From<ExitStatus> for ExitState {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => ExitState::Exited(code),
            (None, Some(sig)) => ExitState::Signaled(sig),
            (None, None) => ExitState::Unknown,
        }
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitState::Running => write!(f, "running"),
            ExitState::Exited(code) => write!(f, "exit code {}", code),
            ExitState::Signaled(sig) => write!(f, "killed by signal {}", sig),
            ExitState::Unknown => write!(f, "exit status unknown"),
        }
    }
}

/// Options for [`PtySession::spawn`]
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub rows: u16,
    pub cols: u16,
    /// Extra environment, applied after `TERM`
    pub env: HashMap<String, String>,
    /// Put the slave line discipline into raw mode
    pub raw_mode: bool,
    /// Interpreter for plain script files without a shebang
    pub shell: String,
    /// How long to watch for an immediate exit
    pub startup_check: Duration,
    /// Time between SIGTERM and SIGKILL
    pub kill_grace: Duration,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 80,
            env: HashMap::new(),
            raw_mode: true,
            shell: "/bin/sh".to_string(),
            startup_check: Duration::from_millis(50),
            kill_grace: Duration::from_secs(2),
        }
    }
}

impl SpawnOptions {
    pub fn with_size(mut self, rows: u16, cols: u16) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_raw_mode(mut self, raw_mode: bool) -> Self {
        self.raw_mode = raw_mode;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_startup_check(mut self, window: Duration) -> Self {
        self.startup_check = window;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }
}

/// State shared between the session handle and its reader thread
struct PtyInner {
    pid: Pid,
    program: String,
    size: Mutex<(u16, u16)>,
    master: Mutex<Option<Arc<File>>>,
    child: Mutex<Child>,
    exit: Mutex<Option<ExitState>>,
    running: AtomicBool,
    shutdown: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
    kill_grace: Duration,
}

impl PtyInner {
    /// Non-blocking reap. Returns the exit state once the child is gone.
    fn try_reap(&self) -> Option<ExitState> {
        if let Some(state) = *self.exit.lock() {
            return Some(state);
        }

        let state = match self.child.lock().try_wait() {
            Ok(Some(status)) => ExitState::from(status),
            Ok(None) => return None,
            Err(e) => {
                warn!(pid = self.pid.as_raw(), "waitpid failed: {}", e);
                ExitState::Unknown
            }
        };
        self.record_exit(state);
        Some(state)
    }

    fn record_exit(&self, state: ExitState) {
        let mut exit = self.exit.lock();
        if exit.is_none() {
            info!(pid = self.pid.as_raw(), program = %self.program, "Process ended: {}", state);
            *exit = Some(state);
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Drop our reference to the master. Returns true if it was still open.
    fn close_master(&self) -> bool {
        self.master.lock().take().is_some()
    }

    /// SIGTERM, wait out the grace period, then SIGKILL
    fn terminate(&self) {
        debug!(pid = self.pid.as_raw(), "Sending SIGTERM");
        if let Err(e) = signal::kill(self.pid, Signal::SIGTERM) {
            if e != Errno::ESRCH {
                warn!(pid = self.pid.as_raw(), "SIGTERM failed: {}", e);
            }
        }

        let deadline = Instant::now() + self.kill_grace;
        while Instant::now() < deadline {
            if self.try_reap().is_some() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }

        warn!(pid = self.pid.as_raw(), "Process ignored SIGTERM, sending SIGKILL");
        let status = {
            let mut child = self.child.lock();
            let _ = child.kill();
            child.wait()
        };
        match status {
            Ok(status) => self.record_exit(ExitState::from(status)),
            Err(e) => {
                warn!(pid = self.pid.as_raw(), "waitpid after SIGKILL failed: {}", e);
                self.record_exit(ExitState::Unknown);
            }
        }
    }
}

/// A child process running on the slave side of a PTY
pub struct PtySession {
    inner: Arc<PtyInner>,
}

impl PtySession {
    /// Spawn `argv` on a fresh PTY
    ///
    /// The child becomes a session leader with the slave as its controlling
    /// terminal. Exits observed within `startup_check` are reported as
    /// [`StartupError`], except a clean exit code 0.
    pub fn spawn<S: AsRef<str>>(argv: &[S], options: &SpawnOptions) -> Result<Self> {
        if argv.is_empty() {
            return Err(SpawnError::EmptyCommand.into());
        }
        if options.rows == 0 || options.cols == 0 {
            return Err(PtyError::InvalidSize {
                rows: options.rows,
                cols: options.cols,
            });
        }

        let argv: Vec<String> = argv.iter().map(|s| s.as_ref().to_string()).collect();
        let argv = wrap_plain_script(argv, &options.shell);
        let program = argv[0].clone();

        let winsize = winsize(options.rows, options.cols);
        let pty = openpty(Some(&winsize), None).map_err(SpawnError::Openpty)?;
        set_cloexec(&pty.master)?;
        set_cloexec(&pty.slave)?;
        if options.raw_mode {
            set_raw_mode(&pty.slave)?;
        }
        set_nonblocking(&pty.master)?;

        // The command (and its slave handles) must be dropped before we start
        // reading, otherwise the slave never closes and EOF never arrives.
        let mut child = {
            let mut cmd = Command::new(&program);
            cmd.args(&argv[1..])
                .env("TERM", DEFAULT_TERM)
                .envs(&options.env)
                .stdin(Stdio::from(pty.slave.try_clone()?))
                .stdout(Stdio::from(pty.slave.try_clone()?))
                .stderr(Stdio::from(pty.slave));

            unsafe {
                cmd.pre_exec(|| {
                    setsid().map_err(io::Error::from)?;
                    // stdin is the slave at this point
                    if libc::ioctl(0, libc::TIOCSCTTY as _, 0) == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    Ok(())
                });
            }

            cmd.spawn().map_err(|source| SpawnError::Exec {
                program: program.clone(),
                source,
            })?
        };

        let pid = Pid::from_raw(child.id() as i32);
        info!(pid = pid.as_raw(), program = %program, rows = options.rows, cols = options.cols, "Spawned PTY child");

        let early = startup_check(&mut child, options.startup_check)?;
        if let Some(status) = early {
            let state = ExitState::from(status);
            match state {
                ExitState::Exited(0) => {
                    debug!(pid = pid.as_raw(), "Child exited cleanly during startup");
                }
                ExitState::Exited(code @ (126 | 127)) => {
                    return Err(StartupError::CommandNotFound { program, code }.into());
                }
                _ => {
                    return Err(StartupError::ExitedEarly { program, state }.into());
                }
            }
        }

        let exit = early.map(ExitState::from);
        let inner = PtyInner {
            pid,
            program,
            size: Mutex::new((options.rows, options.cols)),
            master: Mutex::new(Some(Arc::new(File::from(pty.master)))),
            child: Mutex::new(child),
            running: AtomicBool::new(exit.is_none()),
            exit: Mutex::new(exit),
            shutdown: AtomicBool::new(false),
            reader: Mutex::new(None),
            kill_grace: options.kill_grace,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn pid(&self) -> u32 {
        self.inner.pid.as_raw() as u32
    }

    /// Program actually executed (the shell when a script was wrapped)
    pub fn program(&self) -> &str {
        &self.inner.program
    }

    /// Current size as `(rows, cols)`
    pub fn size(&self) -> (u16, u16) {
        *self.inner.size.lock()
    }

    /// Whether the child process is still alive
    pub fn is_alive(&self) -> bool {
        self.inner.try_reap().is_none()
    }

    /// True while the master is open and the child has not been reaped
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst) && self.inner.master.lock().is_some()
    }

    /// Whether a reader thread has been started and not yet torn down
    pub fn is_reading(&self) -> bool {
        self.inner.reader.lock().is_some()
    }

    pub fn exit_state(&self) -> ExitState {
        self.inner.try_reap().unwrap_or(ExitState::Running)
    }

    /// Block until the child exits or `timeout` passes
    pub fn wait_exit(&self, timeout: Duration) -> Result<ExitState> {
        wait_until(timeout, Duration::from_millis(10), || self.inner.try_reap())
            .map_err(PtyError::from)
    }

    /// Write bytes to the child's input
    pub fn write(&self, data: &[u8]) -> Result<()> {
        if !self.is_alive() {
            return Err(PtyError::NotRunning);
        }
        let master = self.inner.master.lock().clone().ok_or(PtyError::NotRunning)?;
        write_all(&master, data)
    }

    /// Change the window size and notify the child
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        if rows == 0 || cols == 0 {
            return Err(PtyError::InvalidSize { rows, cols });
        }

        let master = self.inner.master.lock().clone().ok_or(PtyError::NotRunning)?;
        let ws = winsize(rows, cols);
        if unsafe { libc::ioctl(master.as_raw_fd(), libc::TIOCSWINSZ as _, &ws as *const Winsize) } == -1 {
            return Err(io::Error::last_os_error().into());
        }
        *self.inner.size.lock() = (rows, cols);

        // The kernel already raises SIGWINCH for the foreground group; this
        // covers children that are not in it yet.
        if self.inner.exit.lock().is_none() {
            if let Err(e) = signal::kill(self.inner.pid, Signal::SIGWINCH) {
                trace!(pid = self.inner.pid.as_raw(), "SIGWINCH not delivered: {}", e);
            }
        }
        debug!(pid = self.inner.pid.as_raw(), rows, cols, "Resized PTY");
        Ok(())
    }

    /// Start the background reader. Calling it again is a no-op.
    pub fn start_reading(&self, sink: Arc<dyn OutputSink>) -> Result<()> {
        let mut reader = self.inner.reader.lock();
        if reader.is_some() {
            debug!(pid = self.inner.pid.as_raw(), "Reader already started");
            return Ok(());
        }

        let master = self.inner.master.lock().clone().ok_or(PtyError::NotRunning)?;
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name(format!("pty-reader-{}", self.inner.pid))
            .spawn(move || read_loop(inner, master, sink))?;
        *reader = Some(handle);
        Ok(())
    }

    /// Terminate the child, stop the reader and release the master.
    /// Safe to call any number of times.
    pub fn kill(&self) {
        let inner = &self.inner;
        if inner.try_reap().is_none() {
            inner.terminate();
        }

        inner.shutdown.store(true, Ordering::SeqCst);
        let handle = inner.reader.lock().take();
        if let Some(handle) = handle {
            // The reader may end up here itself through a sink callback
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }

        if inner.close_master() {
            debug!(pid = inner.pid.as_raw(), "Closed PTY master");
        }
        inner.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.kill();
    }
}

fn read_loop(inner: Arc<PtyInner>, master: Arc<File>, sink: Arc<dyn OutputSink>) {
    let pid = inner.pid.as_raw();
    debug!(pid, "Reader started");
    let mut buf = [0u8; READ_CHUNK];

    loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            debug!(pid, "Reader cancelled");
            break;
        }

        match wait_readable(&master, POLL_INTERVAL_MS) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!(pid, "poll on PTY master failed: {}", e);
                break;
            }
        }

        match (&*master).read(&mut buf) {
            Ok(0) => {
                debug!(pid, "PTY EOF");
                break;
            }
            Ok(n) => sink.accept(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // Linux reports a closed slave as EIO
            Err(e) if e.raw_os_error() == Some(libc::EIO) => {
                debug!(pid, "PTY EOF (EIO)");
                break;
            }
            Err(e) => {
                warn!(pid, "PTY read failed: {}", e);
                break;
            }
        }
    }

    if !inner.shutdown.load(Ordering::SeqCst) {
        inner.running.store(false, Ordering::SeqCst);
        inner.try_reap();
        inner.close_master();
    }
    drop(master);
    sink.finish();
    debug!(pid, "Reader stopped");
}

fn wait_readable(master: &File, timeout_ms: u16) -> nix::Result<bool> {
    let mut fds = [PollFd::new(master.as_fd(), PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::from(timeout_ms)) {
        Ok(0) => Ok(false),
        Ok(_) => {
            let ready = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL;
            Ok(fds[0].revents().map_or(false, |r| r.intersects(ready)))
        }
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(e),
    }
}

fn wait_writable(master: &File, deadline: Instant) -> Result<()> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TimeoutError(WRITE_TIMEOUT).into());
        }
        let ms = remaining.as_millis().min(u16::MAX as u128) as u16;
        let mut fds = [PollFd::new(master.as_fd(), PollFlags::POLLOUT)];
        match poll(&mut fds, PollTimeout::from(ms)) {
            Ok(0) | Err(Errno::EINTR) => continue,
            Ok(_) => return Ok(()),
            Err(e) => return Err(io::Error::from(e).into()),
        }
    }
}

fn write_all(master: &File, mut data: &[u8]) -> Result<()> {
    let deadline = Instant::now() + WRITE_TIMEOUT;
    while !data.is_empty() {
        match (&*master).write(data) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => wait_writable(master, deadline)?,
            Err(e) if e.raw_os_error() == Some(libc::EIO) => return Err(PtyError::NotRunning),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Poll the child for `window`, returning its status if it already exited
fn startup_check(child: &mut Child, window: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + window;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Run plain script files (a path to a text file with no shebang) through
/// `shell`, since exec would reject them.
fn wrap_plain_script(argv: Vec<String>, shell: &str) -> Vec<String> {
    if !is_plain_script(Path::new(&argv[0])) {
        return argv;
    }
    debug!(script = %argv[0], shell, "Running script through shell");
    let mut wrapped = Vec::with_capacity(argv.len() + 1);
    wrapped.push(shell.to_string());
    wrapped.extend(argv);
    wrapped
}

fn is_plain_script(path: &Path) -> bool {
    // Bare names go through PATH lookup and are left alone
    if !path.to_string_lossy().contains('/') {
        return false;
    }
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        _ => return false,
    }

    let mut head = [0u8; 64];
    let n = match File::open(path).and_then(|mut f| f.read(&mut head)) {
        Ok(n) => n,
        Err(_) => return false,
    };
    let head = &head[..n];
    let is_binary = head.starts_with(b"\x7fELF") || head.contains(&0);
    !head.starts_with(b"#!") && !is_binary
}

fn winsize(rows: u16, cols: u16) -> Winsize {
    Winsize {
        ws_row: rows,
        ws_col: cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    }
}

fn set_raw_mode(fd: &OwnedFd) -> std::result::Result<(), SpawnError> {
    let mut attrs = termios::tcgetattr(fd).map_err(SpawnError::Configure)?;
    termios::cfmakeraw(&mut attrs);
    termios::tcsetattr(fd, SetArg::TCSANOW, &attrs).map_err(SpawnError::Configure)
}

fn set_nonblocking(fd: &OwnedFd) -> std::result::Result<(), SpawnError> {
    let raw = fd.as_raw_fd();
    let flags = fcntl(raw, FcntlArg::F_GETFL).map_err(SpawnError::Configure)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(raw, FcntlArg::F_SETFL(flags)).map_err(SpawnError::Configure)?;
    Ok(())
}

fn set_cloexec(fd: &OwnedFd) -> std::result::Result<(), SpawnError> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(SpawnError::Configure)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Collects everything the reader delivers
    #[derive(Default)]
    struct Spy {
        bytes: Mutex<Vec<u8>>,
        finished: AtomicBool,
    }

    impl Spy {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.bytes.lock()).into_owned()
        }
    }

    impl OutputSink for Spy {
        fn accept(&self, bytes: &[u8]) {
            self.bytes.lock().extend_from_slice(bytes);
        }

        fn finish(&self) {
            self.finished.store(true, Ordering::SeqCst);
        }
    }

    fn opts() -> SpawnOptions {
        SpawnOptions::default().with_startup_check(Duration::from_millis(300))
    }

    fn wait_for(spy: &Spy, needle: &str) -> bool {
        wait_until(Duration::from_secs(5), Duration::from_millis(10), || {
            spy.text().contains(needle).then_some(())
        })
        .is_ok()
    }

    #[test]
    fn test_empty_command_rejected() {
        let argv: [&str; 0] = [];
        let err = PtySession::spawn(&argv, &opts()).err().unwrap();
        assert!(matches!(err, PtyError::Spawn(SpawnError::EmptyCommand)));
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = PtySession::spawn(&["cat"], &opts().with_size(0, 80)).err().unwrap();
        assert!(matches!(err, PtyError::InvalidSize { rows: 0, cols: 80 }));
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let err = PtySession::spawn(&["/nonexistent/definitely-not-here"], &opts())
            .err()
            .unwrap();
        assert!(matches!(err, PtyError::Spawn(SpawnError::Exec { .. })));
    }

    #[test]
    fn test_command_not_found_in_shell() {
        let err = PtySession::spawn(&["sh", "-c", "exec /nonexistent/cmd"], &opts())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PtyError::Startup(StartupError::CommandNotFound { code: 127, .. })
        ));
    }

    #[test]
    fn test_nonzero_early_exit() {
        let err = PtySession::spawn(&["sh", "-c", "exit 3"], &opts()).err().unwrap();
        match err {
            PtyError::Startup(StartupError::ExitedEarly { state, .. }) => {
                assert_eq!(state, ExitState::Exited(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_echo_round_trip() {
        let pty = PtySession::spawn(&["cat"], &opts()).unwrap();
        assert!(pty.is_alive());
        assert!(pty.is_running());

        let spy = Arc::new(Spy::default());
        pty.start_reading(spy.clone()).unwrap();
        // Second start is a no-op
        pty.start_reading(spy.clone()).unwrap();

        pty.write(b"ping\n").unwrap();
        assert!(wait_for(&spy, "ping"));

        pty.kill();
        assert!(!pty.is_alive());
        assert!(!pty.is_running());
        assert!(spy.finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_clean_exit_output_still_readable() {
        let pty = PtySession::spawn(&["sh", "-c", "printf done"], &opts()).unwrap();
        let spy = Arc::new(Spy::default());
        pty.start_reading(spy.clone()).unwrap();

        assert!(wait_for(&spy, "done"));
        assert_eq!(pty.wait_exit(Duration::from_secs(5)).unwrap(), ExitState::Exited(0));
        assert!(matches!(pty.write(b"x"), Err(PtyError::NotRunning)));
    }

    #[test]
    fn test_eof_closes_master() {
        let pty = PtySession::spawn(&["sh", "-c", "sleep 0.4; echo bye"], &opts()).unwrap();
        let spy = Arc::new(Spy::default());
        pty.start_reading(spy.clone()).unwrap();

        let closed = wait_until(Duration::from_secs(5), Duration::from_millis(10), || {
            spy.finished.load(Ordering::SeqCst).then_some(())
        });
        assert!(closed.is_ok());
        assert!(spy.text().contains("bye"));
        assert!(!pty.is_running());
    }

    #[test]
    fn test_kill_is_idempotent() {
        let pty = PtySession::spawn(&["sleep", "30"], &opts()).unwrap();
        pty.kill();
        pty.kill();
        assert_eq!(pty.exit_state(), ExitState::Signaled(libc::SIGTERM));
    }

    #[test]
    fn test_kill_escalates_to_sigkill() {
        let options = opts().with_kill_grace(Duration::from_millis(200));
        let pty = PtySession::spawn(&["sh", "-c", "trap '' TERM; sleep 30"], &options).unwrap();
        pty.kill();
        assert!(!pty.is_alive());
        assert_eq!(pty.exit_state(), ExitState::Signaled(libc::SIGKILL));
    }

    #[test]
    fn test_resize_reaches_child() {
        let pty = PtySession::spawn(&["sh", "-c", "sleep 1; stty size"], &opts()).unwrap();
        pty.resize(30, 100).unwrap();
        assert_eq!(pty.size(), (30, 100));

        let spy = Arc::new(Spy::default());
        pty.start_reading(spy.clone()).unwrap();
        assert!(wait_for(&spy, "30 100"));
    }

    #[test]
    fn test_resize_rejects_zero() {
        let pty = PtySession::spawn(&["cat"], &opts()).unwrap();
        assert!(matches!(pty.resize(0, 0), Err(PtyError::InvalidSize { .. })));
    }

    #[test]
    fn test_term_exported() {
        let pty = PtySession::spawn(&["sh", "-c", "sleep 0.1; echo \"T=$TERM\""], &opts()).unwrap();
        let spy = Arc::new(Spy::default());
        pty.start_reading(spy.clone()).unwrap();
        assert!(wait_for(&spy, "T=xterm-256color"));
    }

    #[test]
    fn test_plain_script_runs_through_shell() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("hello.txt");
        fs::write(&script, "sleep 0.1\necho from-script\n").unwrap();
        let path = script.to_string_lossy().into_owned();

        let pty = PtySession::spawn(&[path.as_str()], &opts()).unwrap();
        assert_eq!(pty.program(), "/bin/sh");
        let spy = Arc::new(Spy::default());
        pty.start_reading(spy.clone()).unwrap();
        assert!(wait_for(&spy, "from-script"));
    }

    #[test]
    fn test_script_detection() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain");
        let shebang = dir.path().join("shebang");
        let binary = dir.path().join("binary");
        fs::write(&plain, "echo hi\n").unwrap();
        fs::write(&shebang, "#!/bin/sh\necho hi\n").unwrap();
        fs::write(&binary, b"\x7fELF\x02\x01\x01\x00").unwrap();

        assert!(is_plain_script(&plain));
        assert!(!is_plain_script(&shebang));
        assert!(!is_plain_script(&binary));
        assert!(!is_plain_script(dir.path()));
        assert!(!is_plain_script(Path::new("sh")));
    }
}
