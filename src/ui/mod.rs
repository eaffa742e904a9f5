//! Host terminal front end used by the interactive binary.
//!
//! - **keymapper**: host key events to PTY input bytes
//! - **renderer**: host terminal setup and incremental snapshot drawing

pub mod keymapper;
pub mod renderer;

pub use keymapper::{KeyMapper, Modifiers};
pub use renderer::{clip_to_width, HostTerminal, SnapshotRenderer};
