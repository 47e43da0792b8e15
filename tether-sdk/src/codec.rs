//! Streaming line framing over the raw socket bytes.
//!
//! Bytes are appended as they arrive and complete `\r\n`-terminated lines are
//! taken off the front. Text is only decoded once a whole line is present, so
//! a read that ends inside a multi-byte UTF-8 sequence leaves those bytes
//! untouched until the rest of the line shows up.

use bytes::{Buf, BytesMut};

/// Upper bound on buffered bytes without a line terminator.
pub const MAX_PENDING: usize = 16 * 1024;

#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
    /// Set after an oversized line was dropped; bytes are skipped up to and
    /// including its terminator.
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            discarding: false,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        self.skip_discarded();
        if self.buf.len() > MAX_PENDING && self.find_crlf().is_none() {
            tracing::warn!(
                pending = self.buf.len(),
                "Discarding oversized partial line"
            );
            self.drop_partial();
        }
    }

    fn skip_discarded(&mut self) {
        if !self.discarding {
            return;
        }
        match self.find_crlf() {
            Some(pos) => {
                self.buf.advance(pos + 2);
                self.discarding = false;
            }
            None => self.drop_partial(),
        }
    }

    /// Drop everything pending except a trailing `\r`, which may be the
    /// first half of the terminator.
    fn drop_partial(&mut self) {
        let keep_cr = self.buf.last() == Some(&b'\r');
        self.buf.clear();
        if keep_cr {
            self.buf.extend_from_slice(b"\r");
        }
        self.discarding = true;
    }

    /// Remove and return the first complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.find_crlf()?;
        let line = self.buf.split_to(pos);
        self.buf.advance(2);
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn find_crlf(&self) -> Option<usize> {
        self.buf.windows(2).position(|w| w == b"\r\n")
    }
}
