//! Key mapping for terminal input
//!
//! Turns host key events into the bytes an xterm-compatible terminal would
//! send to the child.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const ALT   = 0b0010;
        const CTRL  = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        result.set(Modifiers::SHIFT, mods.contains(KeyModifiers::SHIFT));
        result.set(Modifiers::ALT, mods.contains(KeyModifiers::ALT));
        result.set(Modifiers::CTRL, mods.contains(KeyModifiers::CONTROL));
        result
    }
}

impl Modifiers {
    /// xterm modifier parameter (`1 + bits`)
    fn param(self) -> u8 {
        1 + self.bits()
    }
}

/// Stateless key-to-bytes mapper
pub struct KeyMapper;

impl KeyMapper {
    /// Bytes for a key event, `None` for keys with no terminal encoding and
    /// for key releases
    pub fn map(event: &KeyEvent) -> Option<Vec<u8>> {
        if event.kind == KeyEventKind::Release {
            return None;
        }
        let mods = Modifiers::from(event.modifiers);

        let bytes = match event.code {
            KeyCode::Char(ch) => Self::map_char(ch, mods),
            KeyCode::Enter => vec![b'\r'],
            KeyCode::Backspace if mods.contains(Modifiers::ALT) => vec![0x1b, 0x7f],
            KeyCode::Backspace => vec![0x7f],
            KeyCode::Tab if mods.contains(Modifiers::SHIFT) => b"\x1b[Z".to_vec(),
            KeyCode::BackTab => b"\x1b[Z".to_vec(),
            KeyCode::Tab => vec![b'\t'],
            KeyCode::Esc => vec![0x1b],

            KeyCode::Up => Self::csi_final(b'A', mods),
            KeyCode::Down => Self::csi_final(b'B', mods),
            KeyCode::Right => Self::csi_final(b'C', mods),
            KeyCode::Left => Self::csi_final(b'D', mods),
            KeyCode::Home => Self::csi_final(b'H', mods),
            KeyCode::End => Self::csi_final(b'F', mods),

            KeyCode::Insert => Self::csi_tilde(2, mods),
            KeyCode::Delete => Self::csi_tilde(3, mods),
            KeyCode::PageUp => Self::csi_tilde(5, mods),
            KeyCode::PageDown => Self::csi_tilde(6, mods),

            KeyCode::F(n) => Self::function_key(n, mods)?,
            _ => return None,
        };
        Some(bytes)
    }

    fn map_char(ch: char, mods: Modifiers) -> Vec<u8> {
        let ctrl = mods.contains(Modifiers::CTRL);
        let alt = mods.contains(Modifiers::ALT);

        let base = if ctrl {
            match Self::control_byte(ch) {
                Some(b) => vec![b],
                None => ch.to_string().into_bytes(),
            }
        } else {
            ch.to_string().into_bytes()
        };

        if alt {
            let mut bytes = Vec::with_capacity(base.len() + 1);
            bytes.push(0x1b);
            bytes.extend(base);
            bytes
        } else {
            base
        }
    }

    /// C0 byte produced by Ctrl+`ch`
    fn control_byte(ch: char) -> Option<u8> {
        match ch {
            'a'..='z' => Some(ch as u8 - b'a' + 1),
            'A'..='Z' => Some(ch as u8 - b'A' + 1),
            '@' | '`' | ' ' | '2' => Some(0x00),
            '[' | '3' => Some(0x1b),
            '\\' | '4' => Some(0x1c),
            ']' | '5' => Some(0x1d),
            '^' | '~' | '6' => Some(0x1e),
            '_' | '?' | '7' => Some(0x1f),
            _ => None,
        }
    }

    /// `ESC [ X`, or `ESC [ 1 ; m X` with modifiers
    fn csi_final(key: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            vec![0x1b, b'[', key]
        } else {
            format!("\x1b[1;{}{}", mods.param(), key as char).into_bytes()
        }
    }

    /// `ESC [ n ~`, or `ESC [ n ; m ~` with modifiers
    fn csi_tilde(code: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            format!("\x1b[{}~", code).into_bytes()
        } else {
            format!("\x1b[{};{}~", code, mods.param()).into_bytes()
        }
    }

    fn function_key(n: u8, mods: Modifiers) -> Option<Vec<u8>> {
        match n {
            1..=4 => {
                let key = b"PQRS"[(n - 1) as usize];
                if mods.is_empty() {
                    Some(vec![0x1b, b'O', key])
                } else {
                    Some(Self::csi_final(key, mods))
                }
            }
            5..=12 => {
                const CODES: [u8; 8] = [15, 17, 18, 19, 20, 21, 23, 24];
                Some(Self::csi_tilde(CODES[(n - 5) as usize], mods))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(code: KeyCode, mods: KeyModifiers) -> Option<Vec<u8>> {
        KeyMapper::map(&KeyEvent::new(code, mods))
    }

    #[test]
    fn test_char_keys() {
        assert_eq!(map(KeyCode::Char('a'), KeyModifiers::NONE), Some(b"a".to_vec()));
        assert_eq!(map(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(vec![0x03]));
        assert_eq!(map(KeyCode::Char('x'), KeyModifiers::ALT), Some(vec![0x1b, b'x']));
        assert_eq!(
            map(KeyCode::Char('d'), KeyModifiers::CONTROL | KeyModifiers::ALT),
            Some(vec![0x1b, 0x04])
        );
        assert_eq!(map(KeyCode::Char('é'), KeyModifiers::NONE), Some("é".as_bytes().to_vec()));
    }

    #[test]
    fn test_control_punctuation() {
        assert_eq!(map(KeyCode::Char(' '), KeyModifiers::CONTROL), Some(vec![0x00]));
        assert_eq!(map(KeyCode::Char('['), KeyModifiers::CONTROL), Some(vec![0x1b]));
        assert_eq!(map(KeyCode::Char('\\'), KeyModifiers::CONTROL), Some(vec![0x1c]));
    }

    #[test]
    fn test_editing_keys() {
        assert_eq!(map(KeyCode::Enter, KeyModifiers::NONE), Some(vec![b'\r']));
        assert_eq!(map(KeyCode::Backspace, KeyModifiers::NONE), Some(vec![0x7f]));
        assert_eq!(map(KeyCode::BackTab, KeyModifiers::SHIFT), Some(b"\x1b[Z".to_vec()));
        assert_eq!(map(KeyCode::Delete, KeyModifiers::NONE), Some(b"\x1b[3~".to_vec()));
        assert_eq!(map(KeyCode::PageUp, KeyModifiers::SHIFT), Some(b"\x1b[5;2~".to_vec()));
    }

    #[test]
    fn test_arrow_keys() {
        assert_eq!(map(KeyCode::Up, KeyModifiers::NONE), Some(b"\x1b[A".to_vec()));
        assert_eq!(map(KeyCode::Up, KeyModifiers::CONTROL), Some(b"\x1b[1;5A".to_vec()));
        assert_eq!(
            map(KeyCode::Left, KeyModifiers::SHIFT | KeyModifiers::ALT),
            Some(b"\x1b[1;4D".to_vec())
        );
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(map(KeyCode::F(1), KeyModifiers::NONE), Some(b"\x1bOP".to_vec()));
        assert_eq!(map(KeyCode::F(2), KeyModifiers::SHIFT), Some(b"\x1b[1;2Q".to_vec()));
        assert_eq!(map(KeyCode::F(5), KeyModifiers::NONE), Some(b"\x1b[15~".to_vec()));
        assert_eq!(map(KeyCode::F(12), KeyModifiers::CONTROL), Some(b"\x1b[24;5~".to_vec()));
        assert_eq!(map(KeyCode::F(13), KeyModifiers::NONE), None);
    }

    #[test]
    fn test_release_ignored() {
        let mut event = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        event.kind = KeyEventKind::Release;
        assert_eq!(KeyMapper::map(&event), None);
    }
}
