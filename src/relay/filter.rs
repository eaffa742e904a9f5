//! Output sequence denylist

/// Removes denylisted byte sequences from an output stream
///
/// A chunk ending in the first bytes of a denylisted sequence is held back
/// until the next chunk (or [`EscapeFilter::flush`]) decides it.
#[derive(Debug, Clone, Default)]
pub struct EscapeFilter {
    deny: Vec<Vec<u8>>,
    pending: Vec<u8>,
}

impl EscapeFilter {
    pub fn new<I, S>(sequences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let deny = sequences
            .into_iter()
            .map(|s| s.as_ref().to_vec())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            deny,
            pending: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deny.is_empty()
    }

    /// Filter one chunk
    pub fn filter(&mut self, chunk: &[u8]) -> Vec<u8> {
        if self.deny.is_empty() {
            return chunk.to_vec();
        }

        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(chunk);
        let mut out = Vec::with_capacity(input.len());

        let mut i = 0;
        'scan: while i < input.len() {
            let rest = &input[i..];
            for seq in &self.deny {
                if rest.starts_with(seq) {
                    i += seq.len();
                    continue 'scan;
                }
            }
            if self
                .deny
                .iter()
                .any(|seq| seq.len() > rest.len() && seq.starts_with(rest))
            {
                self.pending = rest.to_vec();
                break;
            }
            out.push(input[i]);
            i += 1;
        }
        out
    }

    /// Release held-back bytes as they are
    pub fn flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter() -> EscapeFilter {
        EscapeFilter::new(["\x1b[?2026h", "\x1b[?2026l", "\x1b[<u"])
    }

    #[test]
    fn test_removes_every_occurrence() {
        let mut f = default_filter();
        let out = f.filter(b"\x1b[?2026hframe\x1b[?2026l\x1b[<uend\x1b[?2026h");
        assert_eq!(out, b"frameend");
    }

    #[test]
    fn test_other_sequences_untouched() {
        let mut f = default_filter();
        let input = b"\x1b[31mred\x1b[0m \x1b[?25l\x1b[?2025h";
        assert_eq!(f.filter(input), input.to_vec());
    }

    #[test]
    fn test_split_sequence() {
        let mut f = default_filter();
        assert_eq!(f.filter(b"ab\x1b[?20"), b"ab");
        assert_eq!(f.filter(b"26hcd"), b"cd");
    }

    #[test]
    fn test_held_prefix_released() {
        let mut f = default_filter();
        assert_eq!(f.filter(b"x\x1b"), b"x");
        assert_eq!(f.filter(b"[A"), b"\x1b[A");

        assert_eq!(f.filter(b"\x1b[<"), b"");
        assert_eq!(f.flush(), b"\x1b[<");
        assert!(f.flush().is_empty());
    }

    #[test]
    fn test_empty_denylist_passes_through() {
        let mut f = EscapeFilter::new(Vec::<String>::new());
        assert!(f.is_empty());
        assert_eq!(f.filter(b"\x1b[?2026h"), b"\x1b[?2026h");
    }
}
