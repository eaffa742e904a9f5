//! Character grid and cursor state
//!
//! The grid is a fixed `rows x cols` matrix of single characters. Writing past
//! the last row clamps instead of scrolling, so snapshot consumers can rely on
//! fixed dimensions.

use serde::{Deserialize, Serialize};

/// Number of columns between tab stops
pub const TAB_WIDTH: u16 = 8;

/// Character stored in cells that have never been written or were erased
pub const BLANK: char = ' ';

/// Cursor position (0-indexed)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPos {
    pub row: u16,
    pub col: u16,
}

impl CursorPos {
    pub const fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }
}

/// Grid state mutated by the parser
pub struct Grid {
    rows: u16,
    cols: u16,
    cells: Vec<Vec<char>>,
    cursor: CursorPos,
    /// Single save slot shared by `CSI s` and `ESC 7`
    saved: Option<CursorPos>,
}

impl Grid {
    pub fn new(rows: u16, cols: u16) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            cells: vec![vec![BLANK; cols as usize]; rows as usize],
            cursor: CursorPos::default(),
            saved: None,
        }
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn cursor(&self) -> CursorPos {
        self.cursor
    }

    /// Character at a cell, `None` when out of range
    pub fn cell(&self, row: u16, col: u16) -> Option<char> {
        self.cells
            .get(row as usize)
            .and_then(|r| r.get(col as usize))
            .copied()
    }

    fn last_row(&self) -> u16 {
        self.rows - 1
    }

    fn last_col(&self) -> u16 {
        self.cols - 1
    }

    /// Write a character at the cursor and advance, wrapping at `cols`
    pub fn put_char(&mut self, ch: char) {
        let CursorPos { row, col } = self.cursor;
        self.cells[row as usize][col as usize] = ch;
        self.advance_to(col + 1);
    }

    /// Move to `col` on the cursor row, wrapping to the next row at `cols`
    fn advance_to(&mut self, col: u16) {
        if col >= self.cols {
            // No scrolling: the last row absorbs further wraps
            self.cursor.col = 0;
            self.cursor.row = (self.cursor.row + 1).min(self.last_row());
        } else {
            self.cursor.col = col;
        }
    }

    /// Carriage return - move cursor to column 0
    pub fn carriage_return(&mut self) {
        self.cursor.col = 0;
    }

    /// Line feed - next row, column 0, clamped at the last row
    pub fn linefeed(&mut self) {
        self.cursor.row = (self.cursor.row + 1).min(self.last_row());
        self.cursor.col = 0;
    }

    /// Backspace - move cursor left
    pub fn backspace(&mut self) {
        if self.cursor.col > 0 {
            self.cursor.col -= 1;
        }
    }

    /// Horizontal tab to the next multiple of [`TAB_WIDTH`], wrapping like a
    /// printable character when that passes the last column
    pub fn horizontal_tab(&mut self) {
        self.advance_to((self.cursor.col / TAB_WIDTH + 1).saturating_mul(TAB_WIDTH));
    }

    pub fn cursor_up(&mut self, n: u16) {
        self.cursor.row = self.cursor.row.saturating_sub(n);
    }

    pub fn cursor_down(&mut self, n: u16) {
        self.cursor.row = self.cursor.row.saturating_add(n).min(self.last_row());
    }

    pub fn cursor_forward(&mut self, n: u16) {
        self.cursor.col = self.cursor.col.saturating_add(n).min(self.last_col());
    }

    pub fn cursor_backward(&mut self, n: u16) {
        self.cursor.col = self.cursor.col.saturating_sub(n);
    }

    /// Set cursor position (1-indexed parameters, 0 treated as 1)
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        self.cursor.row = row.saturating_sub(1).min(self.last_row());
        self.cursor.col = col.saturating_sub(1).min(self.last_col());
    }

    /// Erase in display. Mode 0 clears cursor to end of screen, mode 2 clears
    /// everything and homes the cursor. Other modes are ignored.
    pub fn erase_in_display(&mut self, mode: u16) {
        match mode {
            0 => {
                self.erase_in_line(0);
                let below = self.cursor.row as usize + 1;
                for row in self.cells.iter_mut().skip(below) {
                    row.fill(BLANK);
                }
            }
            2 => {
                for row in &mut self.cells {
                    row.fill(BLANK);
                }
                self.cursor = CursorPos::default();
            }
            _ => {}
        }
    }

    /// Erase in line
    pub fn erase_in_line(&mut self, mode: u16) {
        let CursorPos { row, col } = self.cursor;
        let line = &mut self.cells[row as usize];
        match mode {
            0 => line[col as usize..].fill(BLANK),
            1 => line[..=col as usize].fill(BLANK),
            2 => line.fill(BLANK),
            _ => {}
        }
    }

    pub fn save_cursor(&mut self) {
        self.saved = Some(self.cursor);
    }

    /// Restore the saved cursor; no-op when nothing was saved
    pub fn restore_cursor(&mut self) {
        if let Some(saved) = self.saved {
            self.cursor = saved;
        }
    }

    /// Rows as strings with trailing whitespace stripped
    pub fn lines(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|row| {
                let line: String = row.iter().collect();
                line.trim_end().to_string()
            })
            .collect()
    }
}
