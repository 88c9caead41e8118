//! Growable append-only byte buffer with a cursor-based reader, backing
//! every `IndexBlock`'s posting bytes.
//!
//! Growth is geometric (1.5x) but capped at a 1 MiB step once the buffer
//! is already large, so a long-lived block doesn't repeatedly double into
//! huge over-allocations.

use crate::error::{CoreError, Result};

const GROWTH_STEP_CAP: usize = 1 << 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    pub fn new() -> Self {
        Buffer { data: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Buffer { data: Vec::with_capacity(cap) }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    fn grow_for(&mut self, additional: usize) {
        let needed = self.data.len() + additional;
        if needed <= self.data.capacity() {
            return;
        }
        let current = self.data.capacity().max(64);
        let geometric = current + (current / 2).min(GROWTH_STEP_CAP);
        let target = geometric.max(needed);
        self.data.reserve(target - self.data.len());
    }

    pub fn writer(&mut self) -> BufferWriter<'_> {
        BufferWriter { buf: self }
    }

    pub fn reader(&self) -> BufferReader<'_> {
        BufferReader { bytes: &self.data, pos: 0 }
    }

    pub fn reader_at(&self, offset: usize) -> BufferReader<'_> {
        BufferReader { bytes: &self.data, pos: offset }
    }
}

/// Append-only writer over a `Buffer`. Borrowing the buffer mutably for
/// the writer's lifetime mirrors the one-writer-at-a-time discipline the
/// inverted index already enforces via its own lock.
pub struct BufferWriter<'a> {
    buf: &'a mut Buffer,
}

impl<'a> BufferWriter<'a> {
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        self.buf.grow_for(bytes.len());
        self.buf.data.extend_from_slice(bytes);
        bytes.len()
    }

    pub fn offset(&self) -> usize {
        self.buf.data.len()
    }

    /// Overwrite `len` bytes starting at `at`, used to backpatch the QInt
    /// leading byte after the field widths are known.
    pub fn write_at(&mut self, at: usize, bytes: &[u8]) -> Result<()> {
        if at + bytes.len() > self.buf.data.len() {
            return Err(CoreError::corruption("write_at past end of buffer"));
        }
        self.buf.data[at..at + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// Cursor-based reader over a byte slice borrowed from a `Buffer`.
pub struct BufferReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BufferReader<'a> {
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        BufferReader { bytes, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, offset: usize) {
        self.pos = offset.min(self.bytes.len());
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    pub fn read(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(CoreError::corruption("read past end of buffer"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.bytes.len());
    }
}
