//! Duplex relay between a session and a remote peer
//!
//! The transport (WebSocket, socket, pipe) supplies a [`Write`] for output and
//! calls [`Relay::forward_input`] for every inbound chunk.

mod filter;

pub use filter::EscapeFilter;

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::core::session::Session;

/// Why [`Relay::pump_output`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// Session ended and its remaining output was delivered
    SessionClosed,
    /// Writing to the peer failed
    PeerClosed,
    /// The stop flag was raised
    Stopped,
}

pub struct Relay {
    session: Arc<Session>,
    filter: EscapeFilter,
    poll_interval: Duration,
    stop: Arc<AtomicBool>,
}

impl Relay {
    pub fn new(session: Arc<Session>, config: &RelayConfig) -> Self {
        Self {
            session,
            filter: EscapeFilter::new(&config.deny_sequences),
            poll_interval: config.poll_interval(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag shared with whoever may end the relay early
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Stream session output to `writer` until the session ends, the peer
    /// goes away or the relay is stopped
    pub fn pump_output<W: Write>(&self, mut writer: W) -> RelayEnd {
        let id = self.session.id();
        let mut filter = self.filter.clone();
        debug!(session = %id, "Relay started");

        loop {
            if self.stop.load(Ordering::SeqCst) {
                debug!(session = %id, "Relay stopped");
                return RelayEnd::Stopped;
            }

            // Sampled before draining so the last drain sees all output
            let ended = self.session.has_ended();
            let chunk = self.session.drain(true);
            let mut out = if chunk.is_empty() {
                filter.flush()
            } else {
                filter.filter(&chunk)
            };
            if ended {
                out.extend(filter.flush());
            }

            if !out.is_empty() {
                if let Err(e) = writer.write_all(&out).and_then(|_| writer.flush()) {
                    info!(session = %id, "Peer closed: {}", e);
                    return RelayEnd::PeerClosed;
                }
            }

            if ended {
                info!(session = %id, "Session ended, relay closing");
                return RelayEnd::SessionClosed;
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Deliver one inbound chunk to the session. Input for a dead session is
    /// dropped.
    pub fn forward_input(&self, bytes: &[u8]) {
        if let Err(e) = self.session.write(bytes) {
            debug!(session = %self.session.id(), "Input dropped: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use crate::core::pty::SpawnOptions;

    fn session(script: &str) -> Arc<Session> {
        let argv = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
        let options = SpawnOptions::default().with_startup_check(Duration::from_millis(100));
        let session = Session::spawn("relay-test", argv, &options, 1 << 16).unwrap();
        session.start_reading().unwrap();
        Arc::new(session)
    }

    struct ClosedPeer;

    impl Write for ClosedPeer {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_pump_filters_and_closes() {
        let session = session("sleep 0.2; printf 'a\\033[?2026hb\\033[?2026lc'");
        let relay = Relay::new(session, &RelayConfig::default());

        let mut peer = Vec::new();
        assert_eq!(relay.pump_output(&mut peer), RelayEnd::SessionClosed);
        assert_eq!(peer, b"abc");
    }

    #[test]
    fn test_forward_input_round_trip() {
        let argv = vec!["cat".to_string()];
        let options = SpawnOptions::default().with_startup_check(Duration::from_millis(100));
        let session = Arc::new(Session::spawn("relay-cat", argv, &options, 1 << 16).unwrap());
        session.start_reading().unwrap();

        let relay = Relay::new(Arc::clone(&session), &RelayConfig::default());
        relay.forward_input(b"hello relay\n");
        session
            .wait_for_output("hello relay", Duration::from_secs(5))
            .unwrap();
        session.kill();

        let mut peer = Vec::new();
        assert_eq!(relay.pump_output(&mut peer), RelayEnd::SessionClosed);
        assert!(String::from_utf8_lossy(&peer).contains("hello relay"));

        // Input after death is dropped quietly
        relay.forward_input(b"ignored");
    }

    #[test]
    fn test_peer_closed() {
        let session = session("printf data; sleep 5");
        let relay = Relay::new(Arc::clone(&session), &RelayConfig::default());
        session.wait_for_output("data", Duration::from_secs(5)).unwrap();

        assert_eq!(relay.pump_output(ClosedPeer), RelayEnd::PeerClosed);
    }

    #[test]
    fn test_stop_flag() {
        let session = session("sleep 5");
        let relay = Relay::new(session, &RelayConfig::default());
        let stop = relay.stop_handle();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            stop.store(true, Ordering::SeqCst);
        });
        assert_eq!(relay.pump_output(io::sink()), RelayEnd::Stopped);
        stopper.join().unwrap();
    }
}
