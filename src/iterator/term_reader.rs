use std::sync::Arc;

use parking_lot::RwLock;

use crate::doctable::DocId;
use crate::error::Result;
use crate::inverted_index::{InvertedIndex, Posting};
use crate::iterator::{Deadline, IndexIterator, ReadResult, SkipResult};

/// Walks one inverted index's postings in doc-id order.
///
/// The original reader tracks a live cursor into the index's block array
/// and byte buffer. Decoding an inverted index's blocks requires the
/// whole block's byte run to restore delta state, so this reader
/// snapshots the index's current postings into a flat, already-decoded
/// `Vec` and walks that; it re-snapshots whenever the index's `gc_marker`
/// has moved since the last snapshot, which is the same "reopen" trigger
/// the original protocol uses, just realized as a full re-decode instead
/// of an in-place reposition.
pub struct TermReader {
    idx: Arc<RwLock<InvertedIndex>>,
    snapshot: Vec<Posting>,
    cached_gc_marker: u32,
    pos: usize,
    last_id: DocId,
    aborted: bool,
    deadline: Deadline,
    /// When set, postings whose `field_mask` doesn't intersect this are
    /// dropped at snapshot time, so unindexed fields never enter the doc
    /// stream (applied "at the term-reader level" per the planner's
    /// field-mask filtering rule).
    required_field_mask: Option<u64>,
}

impl TermReader {
    pub fn new(idx: Arc<RwLock<InvertedIndex>>, deadline: Deadline) -> Result<Self> {
        let (snapshot, marker) = Self::take_snapshot(&idx, None)?;
        Ok(TermReader { idx, snapshot, cached_gc_marker: marker, pos: 0, last_id: 0, aborted: false, deadline, required_field_mask: None })
    }

    pub fn with_field_mask(idx: Arc<RwLock<InvertedIndex>>, deadline: Deadline, field_mask: u64) -> Result<Self> {
        let (snapshot, marker) = Self::take_snapshot(&idx, Some(field_mask))?;
        Ok(TermReader { idx, snapshot, cached_gc_marker: marker, pos: 0, last_id: 0, aborted: false, deadline, required_field_mask: Some(field_mask) })
    }

    fn take_snapshot(idx: &Arc<RwLock<InvertedIndex>>, required_field_mask: Option<u64>) -> Result<(Vec<Posting>, u32)> {
        let guard = idx.read();
        let mut scanned = guard.scan()?;
        if let Some(mask) = required_field_mask {
            scanned.retain(|p| p.field_mask & mask != 0);
        }
        Ok((scanned, guard.gc_marker()))
    }

    /// Checks whether the backing index moved since our snapshot and, if
    /// so, re-snapshots and repositions the cursor at the first id
    /// greater than `last_id` (the prior read position).
    fn maybe_reload(&mut self) -> Result<()> {
        let current_marker = self.idx.read().gc_marker();
        if current_marker == self.cached_gc_marker {
            return Ok(());
        }
        let (snapshot, marker) = Self::take_snapshot(&self.idx, self.required_field_mask)?;
        self.pos = snapshot.partition_point(|p| p.doc_id <= self.last_id);
        self.snapshot = snapshot;
        self.cached_gc_marker = marker;
        Ok(())
    }

    pub fn num_docs(&self) -> usize {
        self.snapshot.len()
    }
}

impl IndexIterator for TermReader {
    fn read(&mut self) -> Result<ReadResult> {
        if self.aborted {
            return Ok(ReadResult::Eof);
        }
        if self.deadline.expired() {
            return Ok(ReadResult::Timeout);
        }
        self.maybe_reload()?;
        if self.pos >= self.snapshot.len() {
            return Ok(ReadResult::Eof);
        }
        let rec = self.snapshot[self.pos].clone();
        self.pos += 1;
        self.last_id = rec.doc_id;
        Ok(ReadResult::Found(rec))
    }

    fn skip_to(&mut self, target: DocId) -> Result<SkipResult> {
        if self.aborted {
            return Ok(SkipResult::Eof);
        }
        self.maybe_reload()?;
        if target <= self.last_id && self.pos > 0 {
            // idempotent: re-request of an already-produced position
            return Ok(SkipResult::Found(self.snapshot[self.pos - 1].clone()));
        }
        let idx = self.snapshot.partition_point(|p| p.doc_id < target);
        if idx >= self.snapshot.len() {
            self.pos = self.snapshot.len();
            return Ok(SkipResult::Eof);
        }
        let rec = self.snapshot[idx].clone();
        self.pos = idx + 1;
        self.last_id = rec.doc_id;
        if rec.doc_id == target {
            Ok(SkipResult::Found(rec))
        } else {
            Ok(SkipResult::NotFound(rec))
        }
    }

    fn last_doc_id(&self) -> DocId {
        self.last_id
    }

    fn num_estimated(&self) -> usize {
        self.snapshot.len()
    }

    fn rewind(&mut self) {
        self.pos = 0;
        self.last_id = 0;
        self.aborted = false;
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}
