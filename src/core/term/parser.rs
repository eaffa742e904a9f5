//! VT sequence parser
//!
//! Byte-level state machine that applies control characters and escape
//! sequences to a [`Grid`]. State survives between calls, so sequences and
//! UTF-8 characters split across read chunks are handled. Input is untrusted:
//! anything unrecognized is consumed silently and never reaches the grid.

use super::state::Grid;

/// Parser state machine
pub struct VtParser {
    state: ParserState,
    params: Vec<u16>,
    current_param: Option<u16>,
    /// Private marker (`?`, `>`, `=`, `<`) or intermediate byte seen in CSI
    marked: bool,
    utf8: Utf8Decoder,
}

#[derive(Clone, Copy, Default, PartialEq, Debug)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    /// `ESC ?` mode strings: swallow bytes up to `h`, `l` or `H`
    EscapeQuestion,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    /// Malformed CSI: swallow bytes up to the final byte
    CsiIgnore,
    /// OSC, DCS, SOS, PM and APC payloads
    StringPayload,
    EscapeInString, // ESC received within a string, waiting for backslash
}

impl Default for VtParser {
    fn default() -> Self {
        Self::new()
    }
}

impl VtParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(16),
            current_param: None,
            marked: false,
            utf8: Utf8Decoder::default(),
        }
    }

    /// Feed a single byte to the parser
    pub fn feed(&mut self, byte: u8, grid: &mut Grid) {
        if byte < 0x80 && self.utf8.is_pending() {
            // Truncated multi-byte sequence
            self.utf8.reset();
            grid.put_char(char::REPLACEMENT_CHARACTER);
        }

        let in_string = matches!(
            self.state,
            ParserState::StringPayload | ParserState::EscapeInString
        );

        // C0 controls act immediately, even in the middle of a sequence
        if byte < 0x20 && !in_string {
            self.control(byte, grid);
            return;
        }

        match self.state {
            ParserState::Ground => self.ground(byte, grid),
            ParserState::Escape => self.escape(byte, grid),
            ParserState::EscapeIntermediate => self.escape_intermediate(byte),
            ParserState::EscapeQuestion => self.escape_question(byte),
            ParserState::CsiEntry => self.csi_entry(byte, grid),
            ParserState::CsiParam => self.csi_param(byte, grid),
            ParserState::CsiIntermediate => self.csi_intermediate(byte, grid),
            ParserState::CsiIgnore => self.csi_ignore(byte),
            ParserState::StringPayload => self.string_payload(byte),
            ParserState::EscapeInString => self.escape_in_string(byte, grid),
        }
    }

    fn control(&mut self, byte: u8, grid: &mut Grid) {
        match byte {
            0x1B => self.enter_escape(),
            0x08 => grid.backspace(),
            0x09 => grid.horizontal_tab(),
            0x0A..=0x0C => grid.linefeed(),
            0x0D => grid.carriage_return(),
            // CAN / SUB abort any sequence in progress
            0x18 | 0x1A => self.state = ParserState::Ground,
            _ => {} // BEL, NUL and the rest never reach the grid
        }
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.params.clear();
        self.current_param = None;
        self.marked = false;
    }

    fn ground(&mut self, byte: u8, grid: &mut Grid) {
        match byte {
            0x20..=0x7E => grid.put_char(byte as char),
            0x7F => {} // DEL
            _ => self.utf8.push(byte, |ch| grid.put_char(ch)),
        }
    }

    fn escape(&mut self, byte: u8, grid: &mut Grid) {
        self.state = ParserState::Ground;
        match byte {
            b'[' => self.state = ParserState::CsiEntry,
            b']' | b'P' | b'X' | b'^' | b'_' => self.state = ParserState::StringPayload,
            // DECSC / DECRC share the CSI s / CSI u slot
            b'7' => grid.save_cursor(),
            b'8' => grid.restore_cursor(),
            b'?' => self.state = ParserState::EscapeQuestion,
            // Charset designation and friends: ESC ( B
            0x20..=0x2F => self.state = ParserState::EscapeIntermediate,
            // ESC =, ESC >, ESC c and anything else: consumed
            _ => {}
        }
    }

    fn escape_intermediate(&mut self, byte: u8) {
        match byte {
            0x20..=0x2F => {}
            _ => self.state = ParserState::Ground,
        }
    }

    fn escape_question(&mut self, byte: u8) {
        if matches!(byte, b'h' | b'l' | b'H') {
            self.state = ParserState::Ground;
        }
    }

    fn csi_entry(&mut self, byte: u8, grid: &mut Grid) {
        match byte {
            b'0'..=b'9' => {
                self.current_param = Some((byte - b'0') as u16);
                self.state = ParserState::CsiParam;
            }
            b';' => {
                self.params.push(0);
                self.state = ParserState::CsiParam;
            }
            b':' => self.state = ParserState::CsiIgnore,
            b'<' | b'=' | b'>' | b'?' => {
                self.marked = true;
                self.state = ParserState::CsiParam;
            }
            0x20..=0x2F => {
                self.marked = true;
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => self.execute_csi(byte, grid),
            _ => self.state = ParserState::CsiIgnore,
        }
    }

    fn csi_param(&mut self, byte: u8, grid: &mut Grid) {
        match byte {
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.current_param = Some(
                    self.current_param
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            b';' => {
                self.params.push(self.current_param.take().unwrap_or(0));
            }
            // Sub-parameters and late private markers are not supported
            0x3A..=0x3F => self.state = ParserState::CsiIgnore,
            0x20..=0x2F => {
                self.finish_param();
                self.marked = true;
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                self.finish_param();
                self.execute_csi(byte, grid);
            }
            _ => self.state = ParserState::CsiIgnore,
        }
    }

    fn csi_intermediate(&mut self, byte: u8, grid: &mut Grid) {
        match byte {
            0x20..=0x2F => {}
            0x40..=0x7E => self.execute_csi(byte, grid),
            _ => self.state = ParserState::CsiIgnore,
        }
    }

    fn csi_ignore(&mut self, byte: u8) {
        if (0x40..=0x7E).contains(&byte) {
            self.state = ParserState::Ground;
        }
    }

    fn string_payload(&mut self, byte: u8) {
        match byte {
            0x07 => self.state = ParserState::Ground,
            0x1B => self.state = ParserState::EscapeInString,
            _ => {}
        }
    }

    fn escape_in_string(&mut self, byte: u8, grid: &mut Grid) {
        if byte == b'\\' {
            self.state = ParserState::Ground;
        } else {
            // Not ST: the string ended, this ESC starts a new sequence
            self.enter_escape();
            if byte < 0x20 {
                self.control(byte, grid);
            } else {
                self.escape(byte, grid);
            }
        }
    }

    fn finish_param(&mut self) {
        if let Some(p) = self.current_param.take() {
            self.params.push(p);
        }
    }

    fn param(&self, index: usize, default: u16) -> u16 {
        self.params.get(index).copied().unwrap_or(default)
    }

    /// Count parameter: missing or zero means 1
    fn count(&self) -> u16 {
        self.param(0, 1).max(1)
    }

    fn execute_csi(&mut self, final_byte: u8, grid: &mut Grid) {
        self.state = ParserState::Ground;

        if self.marked {
            tracing::trace!(
                "Ignored private CSI: params={:?}, final={:?}",
                self.params,
                final_byte as char
            );
            return;
        }

        match final_byte {
            b'H' | b'f' => grid.cursor_position(self.param(0, 1), self.param(1, 1)),
            b'A' => grid.cursor_up(self.count()),
            b'B' => grid.cursor_down(self.count()),
            b'C' => grid.cursor_forward(self.count()),
            b'D' => grid.cursor_backward(self.count()),
            b'J' => grid.erase_in_display(self.param(0, 0)),
            b'K' => grid.erase_in_line(self.param(0, 0)),
            b's' => grid.save_cursor(),
            b'u' => grid.restore_cursor(),
            // SGR: styles are not tracked
            b'm' => {}
            _ => {
                tracing::debug!(
                    "Unknown CSI: params={:?}, final={:?}",
                    self.params,
                    final_byte as char
                );
            }
        }
    }
}

/// Incremental UTF-8 decoder for bytes >= 0x80
#[derive(Default)]
struct Utf8Decoder {
    buf: [u8; 4],
    len: usize,
    need: usize,
}

impl Utf8Decoder {
    fn is_pending(&self) -> bool {
        self.len > 0
    }

    fn reset(&mut self) {
        self.len = 0;
        self.need = 0;
    }

    fn push(&mut self, byte: u8, mut emit: impl FnMut(char)) {
        if self.is_pending() {
            if (0x80..=0xBF).contains(&byte) {
                self.buf[self.len] = byte;
                self.len += 1;
                if self.len == self.need {
                    let ch = std::str::from_utf8(&self.buf[..self.len])
                        .ok()
                        .and_then(|s| s.chars().next())
                        .unwrap_or(char::REPLACEMENT_CHARACTER);
                    self.reset();
                    emit(ch);
                }
                return;
            }
            // New lead byte while a sequence was open
            self.reset();
            emit(char::REPLACEMENT_CHARACTER);
        }

        self.need = match byte {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => {
                emit(char::REPLACEMENT_CHARACTER);
                return;
            }
        };
        self.buf[0] = byte;
        self.len = 1;
    }
}
