//! Virtual screen
//!
//! [`ScreenBuffer`] answers "what would be visible right now" for a stream of
//! PTY output. Dimensions are fixed for its lifetime; a resize replaces the
//! whole buffer.

use serde::{Deserialize, Serialize};

use super::parser::VtParser;
use super::state::{CursorPos, Grid};

/// Serializable view of a screen at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSnapshot {
    pub rows: u16,
    pub cols: u16,
    pub cursor: CursorPos,
    pub lines: Vec<String>,
}

/// Fixed-size character grid fed by raw terminal output
pub struct ScreenBuffer {
    grid: Grid,
    parser: VtParser,
}

impl ScreenBuffer {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            grid: Grid::new(rows, cols),
            parser: VtParser::new(),
        }
    }

    pub fn rows(&self) -> u16 {
        self.grid.rows()
    }

    pub fn cols(&self) -> u16 {
        self.grid.cols()
    }

    pub fn cursor(&self) -> CursorPos {
        self.grid.cursor()
    }

    /// Apply a chunk of raw output
    pub fn process_output(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.parser.feed(b, &mut self.grid);
        }
    }

    /// One string per row, trailing whitespace stripped
    pub fn get_lines(&self) -> Vec<String> {
        self.grid.lines()
    }

    /// Rows joined with newlines
    pub fn get_text(&self) -> String {
        self.get_lines().join("\n")
    }

    pub fn snapshot(&self) -> ScreenSnapshot {
        ScreenSnapshot {
            rows: self.rows(),
            cols: self.cols(),
            cursor: self.cursor(),
            lines: self.get_lines(),
        }
    }
}

impl std::fmt::Display for ScreenBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.get_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(rows: u16, cols: u16, input: &[u8]) -> ScreenBuffer {
        let mut screen = ScreenBuffer::new(rows, cols);
        screen.process_output(input);
        screen
    }

    #[test]
    fn test_hello_world() {
        let screen = screen(5, 20, b"Hello, World!");
        assert_eq!(screen.get_lines()[0], "Hello, World!");
        assert_eq!(screen.cursor(), CursorPos::new(0, 13));
    }

    #[test]
    fn test_multiple_lines() {
        let screen = screen(5, 20, b"Line 1\nLine 2\nLine 3");
        let lines = screen.get_lines();
        assert_eq!(&lines[..3], &["Line 1", "Line 2", "Line 3"]);
        assert_eq!(screen.cursor(), CursorPos::new(2, 6));
    }

    #[test]
    fn test_sgr_stripped() {
        let screen = screen(5, 40, b"\x1b[31mRed Text\x1b[0m Normal");
        assert_eq!(screen.get_lines()[0], "Red Text Normal");
    }

    #[test]
    fn test_printable_wraps_and_clamps() {
        let input = "abcdefghijklmnopqrstuvwxyz";
        let screen = screen(3, 5, input.as_bytes());
        // Rows 0 and 1 hold the first ten chars, everything after lands on
        // the last row and keeps overwriting it from column 0
        let lines = screen.get_lines();
        assert_eq!(lines[0], "abcde");
        assert_eq!(lines[1], "fghij");
        assert_eq!(lines[2], "zvwxy");
        assert_eq!(screen.cursor(), CursorPos::new(2, 1));
    }

    #[test]
    fn test_exact_width_then_one_more() {
        let mut screen = ScreenBuffer::new(3, 4);
        screen.process_output(b"abcd");
        assert_eq!(screen.cursor(), CursorPos::new(1, 0));
        screen.process_output(b"e");
        assert_eq!(screen.get_lines()[1], "e");
        assert_eq!(screen.cursor(), CursorPos::new(1, 1));
    }

    #[test]
    fn test_clear_screen_idempotent() {
        let mut once = screen(4, 10, b"foo\nbar\x1b[2;2H");
        once.process_output(b"\x1b[2J");
        let mut twice = screen(4, 10, b"foo\nbar\x1b[2;2H");
        twice.process_output(b"\x1b[2J\x1b[2J");

        assert_eq!(once.snapshot(), twice.snapshot());
        assert!(once.get_lines().iter().all(|l| l.is_empty()));
        assert_eq!(once.cursor(), CursorPos::new(0, 0));
    }

    #[test]
    fn test_erase_to_end_of_screen() {
        let mut screen = screen(3, 10, b"aaaa\nbbbb\ncccc");
        screen.process_output(b"\x1b[2;3H\x1b[J");
        assert_eq!(screen.get_lines(), vec!["aaaa", "bb", ""]);

        screen.process_output(b"\x1b[1;2H\x1b[0J");
        assert_eq!(screen.get_lines(), vec!["a", "", ""]);
    }

    #[test]
    fn test_erase_line_variants() {
        let mut screen = screen(3, 10, b"0123456789");
        screen.process_output(b"\x1b[1;4H\x1b[K");
        assert_eq!(screen.get_lines()[0], "012");

        let mut screen2 = ScreenBuffer::new(3, 10);
        screen2.process_output(b"0123456789\x1b[1;4H\x1b[1K");
        assert_eq!(screen2.get_lines()[0], "    456789");

        let mut screen3 = ScreenBuffer::new(3, 10);
        screen3.process_output(b"0123456789\x1b[1;4H\x1b[2K");
        assert_eq!(screen3.get_lines()[0], "");
        assert_eq!(screen3.cursor(), CursorPos::new(0, 3));
    }

    #[test]
    fn test_save_restore_round_trip() {
        let mut screen = ScreenBuffer::new(5, 20);
        screen.process_output(b"\x1b[3;5H\x1b[sintervening\nmore text\x1b[uX");
        assert_eq!(screen.get_lines()[2].chars().nth(4), Some('X'));
        assert_eq!(screen.cursor(), CursorPos::new(2, 5));
    }

    #[test]
    fn test_carriage_return_and_backspace() {
        let screen = screen(2, 20, b"hello\rJ\x08\x08ab");
        assert_eq!(screen.get_lines()[0], "abllo");
    }

    #[test]
    fn test_cursor_moves_clamped() {
        let mut screen = ScreenBuffer::new(5, 10);
        screen.process_output(b"\x1b[100;100H");
        assert_eq!(screen.cursor(), CursorPos::new(4, 9));
        screen.process_output(b"\x1b[50A\x1b[50D");
        assert_eq!(screen.cursor(), CursorPos::new(0, 0));
        screen.process_output(b"\x1b[0B\x1b[0C");
        assert_eq!(screen.cursor(), CursorPos::new(1, 1));
    }

    #[test]
    fn test_blank_rows_compare_equal() {
        let screen = screen(3, 10, b"x\x1b[2;5H   ");
        let lines = screen.get_lines();
        assert_eq!(lines[1], lines[2]);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let screen = screen(2, 8, b"hi");
        let json = serde_json::to_value(screen.snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "rows": 2,
                "cols": 8,
                "cursor": { "row": 0, "col": 2 },
                "lines": ["hi", ""],
            })
        );
    }
}
