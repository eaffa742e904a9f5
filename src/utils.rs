//! Small helpers shared by sessions, the relay and tests

use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Timed out after {0:?}")]
pub struct TimeoutError(pub Duration);

/// Poll `f` every `interval` until it yields a value or `timeout` passes.
/// `f` always runs at least once.
pub fn wait_until<T, F>(timeout: Duration, interval: Duration, mut f: F) -> Result<T, TimeoutError>
where
    F: FnMut() -> Option<T>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = f() {
            return Ok(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(TimeoutError(timeout));
        }
        thread::sleep(interval.min(deadline - now));
    }
}

/// Remove ANSI escape sequences (`ESC`, one byte in `@`..`_`, parameter
/// bytes, intermediate bytes, final byte)
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            let mut rest = chars.clone();
            if rest.next_if(|c| ('@'..='_').contains(c)).is_some() {
                while rest.next_if(|c| ('0'..='?').contains(c)).is_some() {}
                while rest.next_if(|c| (' '..='/').contains(c)).is_some() {}
                if rest.next_if(|c| ('@'..='~').contains(c)).is_some() {
                    chars = rest;
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

/// Non-blank lines with trailing whitespace removed, joined by newlines
pub fn extract_visible_text<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(|line| line.as_ref().trim_end())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m plain"), "red plain");
        assert_eq!(strip_ansi("\x1b[?25lhidden\x1b[?25h"), "hidden");
        assert_eq!(strip_ansi("\x1b[1;2Hx\x1b[K"), "x");
        assert_eq!(strip_ansi("no escapes"), "no escapes");
    }

    #[test]
    fn test_strip_ansi_incomplete() {
        assert_eq!(strip_ansi("x\x1b"), "x\x1b");
        assert_eq!(strip_ansi("x\x1b[12"), "x\x1b[12");
        assert_eq!(strip_ansi("a\x1b7b"), "a\x1b7b");
    }

    #[test]
    fn test_extract_visible_text() {
        let lines = ["first  ", "", "   ", "second"];
        assert_eq!(extract_visible_text(&lines), "first\nsecond");
    }

    #[test]
    fn test_wait_until() {
        let mut calls = 0;
        let value = wait_until(Duration::from_secs(1), Duration::from_millis(1), || {
            calls += 1;
            (calls == 3).then_some(calls)
        });
        assert_eq!(value, Ok(3));

        let err = wait_until::<(), _>(Duration::from_millis(20), Duration::from_millis(5), || None);
        assert_eq!(err, Err(TimeoutError(Duration::from_millis(20))));
    }
}
