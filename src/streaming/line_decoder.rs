//! Incremental line decoder for event streams
//!
//! Turns raw body chunks, split at arbitrary byte offsets, into complete
//! newline-terminated lines. UTF-8 sequences cut by a chunk boundary are carried
//! to the next chunk instead of being replaced.

use std::borrow::Cow;

/// Byte-to-line decoder holding the frame buffer of one stream
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Decoded text not yet handed out as a line
    pending: String,

    /// Leading bytes of a multi-byte character cut off by the last chunk
    utf8_carry: Vec<u8>,

    /// Prefix of `pending` already known to hold no newline
    scanned: usize,

    /// Dropping the rest of an overlong line up to its newline
    discarding: bool,
}

impl LineDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk from the transport
    pub fn push(&mut self, chunk: &[u8]) {
        let bytes: Cow<'_, [u8]> = if self.utf8_carry.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.utf8_carry);
            joined.extend_from_slice(chunk);
            Cow::Owned(joined)
        };

        let mut input: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.pending.push_str(text);
                    break;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.pending.push_str(text);
                    }
                    match err.error_len() {
                        // Invalid, not just incomplete: same as a lossy text decoder.
                        Some(len) => {
                            self.pending.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            self.utf8_carry.extend_from_slice(rest);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Take the next complete line, without its `\n` or a trailing `\r`
    pub fn next_line(&mut self) -> Option<String> {
        if self.discarding {
            let Some(end) = self.pending.find('\n') else {
                self.pending.clear();
                self.scanned = 0;
                return None;
            };
            self.pending.drain(..=end);
            self.scanned = 0;
            self.discarding = false;
        }

        let Some(offset) = self.pending[self.scanned..].find('\n') else {
            self.scanned = self.pending.len();
            return None;
        };
        let end = self.scanned + offset;
        self.scanned = 0;

        let mut line: String = self.pending.drain(..=end).collect();
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }

    /// Drain every complete line currently buffered
    pub fn lines(&mut self) -> impl Iterator<Item = String> + '_ {
        std::iter::from_fn(move || self.next_line())
    }

    /// Bytes buffered but not yet returned as lines
    pub fn pending_len(&self) -> usize {
        self.pending.len() + self.utf8_carry.len()
    }

    /// Drop the buffered partial line and everything up to its newline
    ///
    /// Returns the number of bytes dropped now.
    pub fn discard_partial(&mut self) -> usize {
        let dropped = self.pending_len();
        self.pending.clear();
        self.utf8_carry.clear();
        self.scanned = 0;
        self.discarding = true;
        dropped
    }

    /// End of stream: return the unterminated trailing fragment, if any
    ///
    /// The decoder is empty afterwards. Whether the fragment is used or
    /// dropped is the caller's policy.
    pub fn finish(&mut self) -> Option<String> {
        if std::mem::take(&mut self.discarding) {
            self.pending.clear();
            self.utf8_carry.clear();
            self.scanned = 0;
            return None;
        }
        let mut fragment = std::mem::take(&mut self.pending);
        if !self.utf8_carry.is_empty() {
            fragment.push_str(&String::from_utf8_lossy(&self.utf8_carry));
            self.utf8_carry.clear();
        }
        self.scanned = 0;

        if fragment.ends_with('\r') {
            fragment.pop();
        }
        (!fragment.is_empty()).then_some(fragment)
    }
}
