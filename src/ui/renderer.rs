//! Snapshot renderer using crossterm
//!
//! Draws [`ScreenSnapshot`]s onto the host terminal, rewriting only the rows
//! that changed since the previous frame.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, Print, ResetColor, SetAttribute},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use unicode_width::UnicodeWidthChar;

use crate::core::term::ScreenSnapshot;

/// Host terminal setup and teardown
pub struct HostTerminal {
    initialized: bool,
}

impl HostTerminal {
    /// Raw mode, alternate screen, no line wrap
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        Ok(Self { initialized: true })
    }

    /// Host size as `(rows, cols)`
    pub fn size() -> io::Result<(u16, u16)> {
        let (cols, rows) = terminal::size()?;
        Ok((rows, cols))
    }

    pub fn leave(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(
            stdout,
            ResetColor,
            SetAttribute(Attribute::Reset),
            Show,
            EnableLineWrap,
            LeaveAlternateScreen
        );
        terminal::disable_raw_mode()
    }
}

impl Drop for HostTerminal {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

/// Incremental renderer for screen snapshots
pub struct SnapshotRenderer {
    /// Lines drawn in the previous frame
    prev: Vec<String>,
    /// Host viewport as `(rows, cols)`
    viewport: (u16, u16),
}

impl SnapshotRenderer {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            prev: Vec::new(),
            viewport: (rows, cols),
        }
    }

    /// Change the viewport; the next frame is drawn in full
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.viewport = (rows, cols);
        self.prev.clear();
    }

    /// Draw one frame. Returns the number of rows rewritten.
    pub fn render<W: Write>(&mut self, out: &mut W, snapshot: &ScreenSnapshot) -> io::Result<usize> {
        let (rows, cols) = self.viewport;
        let visible = snapshot.lines.len().min(rows as usize);
        let full = self.prev.len() != snapshot.lines.len();

        queue!(out, Hide)?;
        if full {
            queue!(out, Clear(ClearType::All))?;
        }

        let mut drawn = 0;
        for (row, line) in snapshot.lines.iter().take(visible).enumerate() {
            if !full && self.prev.get(row) == Some(line) {
                continue;
            }
            queue!(
                out,
                MoveTo(0, row as u16),
                Print(clip_to_width(line, cols as usize)),
                Clear(ClearType::UntilNewLine)
            )?;
            drawn += 1;
        }

        let cursor_row = snapshot.cursor.row.min(rows.saturating_sub(1));
        let cursor_col = snapshot.cursor.col.min(cols.saturating_sub(1));
        queue!(out, MoveTo(cursor_col, cursor_row), Show)?;
        out.flush()?;

        self.prev.clone_from(&snapshot.lines);
        Ok(drawn)
    }
}

/// Longest prefix of `line` that fits in `width` display columns
pub fn clip_to_width(line: &str, width: usize) -> &str {
    let mut used = 0;
    for (idx, ch) in line.char_indices() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            return &line[..idx];
        }
        used += w;
    }
    line
}
