//! Newline framing over an arbitrarily chunked byte stream

/// Splits incoming bytes into complete lines.
///
/// Bytes after the last newline are kept and prefixed to the next chunk, so a
/// line (or a UTF-8 sequence) split across reads comes out whole. There is no
/// line length limit: a peer that never sends a newline grows the buffer
/// without bound.
#[derive(Debug, Default)]
pub struct StreamFramer {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to contain no newline.
    scanned: usize,
}

impl StreamFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns the complete lines now available, with
    /// trailing whitespace stripped.
    ///
    /// The iterator is lazy. Lines it does not yield before being dropped stay
    /// buffered and are returned by the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Lines<'_> {
        self.buffer.extend_from_slice(bytes);
        Lines {
            framer: self,
            consumed: 0,
        }
    }

    /// Number of buffered bytes that do not yet form a complete line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

pub struct Lines<'a> {
    framer: &'a mut StreamFramer,
    consumed: usize,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let framer = &mut *self.framer;
        let from = framer.scanned.max(self.consumed);
        let Some(offset) = framer.buffer[from..].iter().position(|&b| b == b'\n') else {
            framer.scanned = framer.buffer.len();
            return None;
        };
        let end = from + offset;
        let line = String::from_utf8_lossy(&framer.buffer[self.consumed..end])
            .trim_end()
            .to_string();
        self.consumed = end + 1;
        framer.scanned = self.consumed;
        Some(line)
    }
}

impl Drop for Lines<'_> {
    fn drop(&mut self) {
        let framer = &mut *self.framer;
        framer.buffer.drain(..self.consumed);
        framer.scanned = framer.scanned.saturating_sub(self.consumed);
    }
}
