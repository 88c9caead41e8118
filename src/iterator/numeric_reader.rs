use std::sync::Arc;

use parking_lot::RwLock;

use crate::doctable::DocId;
use crate::error::Result;
use crate::inverted_index::InvertedIndex;
use crate::iterator::term_reader::TermReader;
use crate::iterator::{Deadline, IndexIterator, ReadResult, SkipResult};

/// Wraps a `TermReader` over one numeric-tree leaf and filters its
/// postings to `[min, max]`. The tree itself (range-split internal
/// nodes choosing which leaves to visit) lives in the index tables; this
/// reader only knows about a single leaf's inverted index.
pub struct NumericReader {
    inner: TermReader,
    min: f64,
    max: f64,
}

impl NumericReader {
    pub fn new(idx: Arc<RwLock<InvertedIndex>>, min: f64, max: f64, deadline: Deadline) -> Result<Self> {
        Ok(NumericReader { inner: TermReader::new(idx, deadline)?, min, max })
    }

    fn in_range(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl IndexIterator for NumericReader {
    fn read(&mut self) -> Result<ReadResult> {
        loop {
            match self.inner.read()? {
                ReadResult::Found(p) => {
                    let v = p.numeric_value.unwrap_or(f64::NAN);
                    if self.in_range(v) {
                        return Ok(ReadResult::Found(p));
                    }
                    // out of range: skip silently and keep pulling
                }
                other => return Ok(other),
            }
        }
    }

    fn skip_to(&mut self, target: DocId) -> Result<SkipResult> {
        loop {
            match self.inner.skip_to(target)? {
                SkipResult::Found(p) => {
                    let v = p.numeric_value.unwrap_or(f64::NAN);
                    if self.in_range(v) {
                        return Ok(SkipResult::Found(p));
                    }
                    return Ok(SkipResult::NotFound(p));
                }
                SkipResult::NotFound(p) => {
                    let v = p.numeric_value.unwrap_or(f64::NAN);
                    if self.in_range(v) {
                        return Ok(SkipResult::NotFound(p));
                    }
                    match self.inner.read()? {
                        ReadResult::Found(next) => {
                            let v = next.numeric_value.unwrap_or(f64::NAN);
                            if self.in_range(v) {
                                return Ok(SkipResult::NotFound(next));
                            }
                            continue;
                        }
                        ReadResult::Eof => return Ok(SkipResult::Eof),
                        ReadResult::NotFound | ReadResult::Timeout => return Ok(SkipResult::Eof),
                    }
                }
                SkipResult::Eof => return Ok(SkipResult::Eof),
            }
        }
    }

    fn last_doc_id(&self) -> DocId {
        self.inner.last_doc_id()
    }

    fn num_estimated(&self) -> usize {
        self.inner.num_estimated()
    }

    fn rewind(&mut self) {
        self.inner.rewind()
    }

    fn abort(&mut self) {
        self.inner.abort()
    }
}
