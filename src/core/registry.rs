//! Session registry
//!
//! Process-wide catalog of sessions keyed by opaque UUID strings. Handlers
//! share one [`SessionRegistry`] (usually behind an `Arc`) and reach sessions
//! only through it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::pty::{PtyError, SpawnOptions};
use super::session::{Session, SessionInfo, DEFAULT_MAX_BUFFER_BYTES};
use super::term::ScreenSnapshot;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Pty(#[from] PtyError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Defaults applied to every session the registry creates
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub spawn: SpawnOptions,
    pub max_buffer_bytes: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            spawn: SpawnOptions::default(),
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    config: RegistryConfig,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Spawn a session and register it under a fresh id
    ///
    /// `env` entries are layered over the configured environment. The read
    /// loop is not started; see [`SessionRegistry::start`].
    pub fn create(
        &self,
        argv: Vec<String>,
        rows: u16,
        cols: u16,
        env: Option<&HashMap<String, String>>,
    ) -> Result<String> {
        let mut options = self.config.spawn.clone().with_size(rows, cols);
        if let Some(env) = env {
            options.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let id = Uuid::new_v4().to_string();
        let session = Session::spawn(id.clone(), argv, &options, self.config.max_buffer_bytes)?;
        info!(session = %id, pid = session.pty().pid(), command = ?session.argv(), "Session created");

        self.sessions.write().insert(id.clone(), Arc::new(session));
        Ok(id)
    }

    /// Begin pumping output into the session's buffers
    pub fn start(&self, session_id: &str) -> Result<()> {
        let session = self.lookup(session_id)?;
        session.start_reading()?;
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Kill and forget a session. Returns false if the id was unknown.
    pub fn delete(&self, session_id: &str) -> bool {
        // Remove first so the map lock is not held while the child is reaped
        let removed = self.sessions.write().remove(session_id);
        match removed {
            Some(session) => {
                session.kill();
                info!(session = %session_id, "Session deleted");
                true
            }
            None => {
                debug!(session = %session_id, "Delete of unknown session");
                false
            }
        }
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Send input to a session. Unknown or dead sessions are ignored.
    pub fn write_input(&self, session_id: &str, data: &[u8]) {
        let Some(session) = self.get(session_id) else {
            debug!(session = %session_id, "Input for unknown session dropped");
            return;
        };
        if let Err(e) = session.write(data) {
            debug!(session = %session_id, "Input dropped: {}", e);
        }
    }

    pub fn drain(&self, session_id: &str, clear: bool) -> Result<Vec<u8>> {
        Ok(self.lookup(session_id)?.drain(clear))
    }

    pub fn screen(&self, session_id: &str) -> Result<ScreenSnapshot> {
        Ok(self.lookup(session_id)?.snapshot())
    }

    pub fn resize(&self, session_id: &str, rows: u16, cols: u16) -> Result<()> {
        self.lookup(session_id)?.resize(rows, cols)?;
        Ok(())
    }

    pub fn info(&self, session_id: &str) -> Result<SessionInfo> {
        Ok(self.lookup(session_id)?.info())
    }

    /// Tear down every session whose process has exited
    pub fn prune_exited(&self) -> Vec<String> {
        let dead: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, session)| !session.is_alive())
            .map(|(id, _)| id.clone())
            .collect();

        dead.into_iter().filter(|id| self.delete(id)).collect()
    }

    /// Delete all sessions
    pub fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.write().drain().map(|(_, s)| s).collect();
        if !sessions.is_empty() {
            info!(count = sessions.len(), "Shutting down sessions");
        }
        for session in sessions {
            session.kill();
        }
    }

    fn lookup(&self, session_id: &str) -> Result<Arc<Session>> {
        self.get(session_id)
            .ok_or_else(|| RegistryError::NotFound(session_id.to_string()))
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
