//! Output sinks
//!
//! The PTY read loop hands every chunk to an [`OutputSink`]. Anything can
//! observe the stream (the session buffers, a broadcaster, a test spy) without
//! the PTY layer knowing about it.

/// Receiver of PTY output, called from the session's reader thread
pub trait OutputSink: Send + Sync {
    /// Accept one chunk, in emission order
    fn accept(&self, bytes: &[u8]);

    /// Called once after the read loop stops
    fn finish(&self) {}
}

impl<F> OutputSink for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn accept(&self, bytes: &[u8]) {
        self(bytes)
    }
}
