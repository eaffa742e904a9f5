//! Configuration for termwrap.
//!
//! Settings live in `~/.termwrap/config.toml`. Every field is optional; a
//! missing or unreadable file falls back to the defaults.
//!
//! ```toml
//! # Command run when none is given on the command line
//! command = ["/bin/bash"]
//!
//! # Size used when the host terminal size is unknown
//! rows = 24
//! cols = 80
//!
//! raw_mode = true
//! shell = "/bin/sh"
//! startup_check_ms = 50
//! kill_grace_ms = 2000
//! max_buffer_bytes = 4194304
//!
//! [env]
//! TERM = "xterm-256color"
//!
//! [relay]
//! poll_interval_ms = 1
//! deny_sequences = ["\u001b[?2026h", "\u001b[?2026l", "\u001b[<u"]
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::pty::{SpawnOptions, DEFAULT_TERM};
use crate::core::registry::RegistryConfig;
use crate::core::session::DEFAULT_MAX_BUFFER_BYTES;

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default command line
    pub command: Vec<String>,
    pub rows: u16,
    pub cols: u16,
    /// Raw line discipline on the child side
    pub raw_mode: bool,
    /// Interpreter for shebang-less scripts
    pub shell: String,
    pub startup_check_ms: u64,
    pub kill_grace_ms: u64,
    /// Cap on undrained output per session
    pub max_buffer_bytes: usize,
    /// Extra environment for children
    pub env: HashMap<String, String>,
    pub relay: RelayConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut env = HashMap::new();
        env.insert("TERM".to_string(), DEFAULT_TERM.to_string());

        Self {
            command: vec![default_shell()],
            rows: 24,
            cols: 80,
            raw_mode: true,
            shell: "/bin/sh".to_string(),
            startup_check_ms: 50,
            kill_grace_ms: 2000,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            env,
            relay: RelayConfig::default(),
        }
    }
}

/// Relay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Delay between drains of the output buffer
    pub poll_interval_ms: u64,
    /// Sequences removed from output before it reaches the peer
    pub deny_sequences: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1,
            deny_sequences: vec![
                // Synchronized output on/off
                "\x1b[?2026h".to_string(),
                "\x1b[?2026l".to_string(),
                // Malformed kitty keyboard pop
                "\x1b[<u".to_string(),
            ],
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load `~/.termwrap/config.toml`, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::get_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Spawn options for a session of the given size
    pub fn spawn_options(&self, rows: u16, cols: u16) -> SpawnOptions {
        SpawnOptions {
            rows,
            cols,
            env: self.env.clone(),
            raw_mode: self.raw_mode,
            shell: self.shell.clone(),
            startup_check: Duration::from_millis(self.startup_check_ms),
            kill_grace: Duration::from_millis(self.kill_grace_ms),
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            spawn: self.spawn_options(self.rows, self.cols),
            max_buffer_bytes: self.max_buffer_bytes,
        }
    }

    /// `~/.termwrap/config.toml`
    pub fn get_config_path() -> Option<PathBuf> {
        data_dir().map(|dir| dir.join("config.toml"))
    }
}

/// `~/.termwrap`, also home of the log file
pub fn data_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".termwrap"))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!((config.rows, config.cols), (24, 80));
        assert_eq!(config.env.get("TERM").map(String::as_str), Some("xterm-256color"));
        assert_eq!(config.relay.poll_interval(), Duration::from_millis(1));
        assert_eq!(config.relay.deny_sequences.len(), 3);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "command = [\"/bin/zsh\", \"-l\"]\nrows = 40\n\n[relay]\npoll_interval_ms = 5\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.command, vec!["/bin/zsh", "-l"]);
        assert_eq!(config.rows, 40);
        assert_eq!(config.cols, 80);
        assert_eq!(config.relay.poll_interval_ms, 5);
        assert_eq!(config.relay.deny_sequences, RelayConfig::default().deny_sequences);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "rows = \"many\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.kill_grace_ms = 250;
        config.env.insert("LANG".to_string(), "C.UTF-8".to_string());
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_spawn_options() {
        let mut config = Config::default();
        config.raw_mode = false;
        config.startup_check_ms = 10;

        let options = config.spawn_options(10, 20);
        assert_eq!((options.rows, options.cols), (10, 20));
        assert!(!options.raw_mode);
        assert_eq!(options.startup_check, Duration::from_millis(10));
        assert_eq!(options.kill_grace, Duration::from_secs(2));
        assert_eq!(options.env.get("TERM").map(String::as_str), Some("xterm-256color"));
    }
}
