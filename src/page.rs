//! Owned page buffer (`sbuf` in the source vocabulary).

use bytes::Bytes;

use crate::position::Position;

/// An owned, read-only byte region with a position tag.
///
/// `buf` has length `bufsize`; only the leading `pagesize` bytes are the
/// *logical page* that counts toward progress and hashing — the rest is
/// a margin that scanners may read (for patterns that straddle a page
/// boundary) but that is not otherwise accounted for.
///
/// A `PageBuffer` is immutable once constructed: concurrent scanners
/// share the same `Bytes` view without synchronization.
#[derive(Debug, Clone)]
pub struct PageBuffer {
    pos0: Position,
    buf: Bytes,
    pagesize: usize,
}

impl PageBuffer {
    /// Construct a page buffer. `pagesize` must not exceed `buf.len()`.
    pub fn new(pos0: Position, buf: Bytes, pagesize: usize) -> Self {
        debug_assert!(
            pagesize <= buf.len(),
            "pagesize ({pagesize}) exceeds buffer length ({})",
            buf.len()
        );
        Self { pos0, buf, pagesize }
    }

    pub fn pos0(&self) -> &Position {
        &self.pos0
    }

    /// The logical page bytes only (excludes margin).
    pub fn page(&self) -> &[u8] {
        &self.buf[..self.pagesize]
    }

    /// The full region including margin, for scanners that need lookahead.
    pub fn margin_buf(&self) -> &[u8] {
        &self.buf
    }

    pub fn pagesize(&self) -> usize {
        self.pagesize
    }

    pub fn bufsize(&self) -> usize {
        self.buf.len()
    }

    /// Build a derived page from decoded scanner output, tagging its
    /// position as a child of this page's position.
    pub fn derive(&self, tag: &str, sub_offset: Option<u64>, payload: Bytes) -> PageBuffer {
        let pagesize = payload.len();
        PageBuffer::new(self.pos0.derive(tag, sub_offset), payload, pagesize)
    }
}
