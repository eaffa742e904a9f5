//! Terminal screen emulation
//!
//! - **state**: character grid, cursor and the single save slot
//! - **parser**: escape-sequence state machine driving the grid
//! - **screen**: `ScreenBuffer`, the public face of the two

mod parser;
mod screen;
mod state;

pub use parser::VtParser;
pub use screen::{ScreenBuffer, ScreenSnapshot};
pub use state::{CursorPos, Grid, BLANK, TAB_WIDTH};
