use std::sync::atomic::{AtomicU32, Ordering};

use crate::codec::varint::VarintReader;
use crate::doctable::DocId;
use crate::error::{CoreError, Result};
use crate::inverted_index::block::{IndexBlock, INDEX_BLOCK_SIZE, INDEX_BLOCK_SIZE_DOCID_ONLY};
use crate::inverted_index::posting::{Codec, Posting};
use crate::inverted_index::IndexFlags;

/// Mutually exclusive tail fields: a field mask for text/tag indexes, or
/// a raw entry counter for numeric/doc-ids-only indexes where "which
/// fields contain this term" is meaningless.
#[derive(Debug, Clone, Copy)]
pub enum IndexTail {
    FieldMask(u64),
    NumEntries(u64),
}

/// An ordered sequence of blocks holding every posting for one term, tag
/// value, or numeric-tree leaf.
pub struct InvertedIndex {
    pub flags: IndexFlags,
    blocks: Vec<IndexBlock>,
    last_id: DocId,
    num_docs: u32,
    tail: IndexTail,
    /// Incremented by the owning table (or by GC, via `bump_gc_marker`)
    /// after any structural edit. Readers compare their cached copy to
    /// this to detect they must re-synchronize.
    gc_marker: AtomicU32,
    multi_value: bool,
}

impl InvertedIndex {
    pub fn new(flags: IndexFlags, multi_value: bool) -> Self {
        let tail = if flags.uses_field_mask() {
            IndexTail::FieldMask(0)
        } else {
            IndexTail::NumEntries(0)
        };
        InvertedIndex {
            flags,
            blocks: Vec::new(),
            last_id: 0,
            num_docs: 0,
            tail,
            gc_marker: AtomicU32::new(0),
            multi_value,
        }
    }

    pub fn block_capacity(&self) -> u16 {
        if self.flags.contains(IndexFlags::DOCIDS_ONLY) {
            INDEX_BLOCK_SIZE_DOCID_ONLY
        } else {
            INDEX_BLOCK_SIZE
        }
    }

    pub fn blocks(&self) -> &[IndexBlock] {
        &self.blocks
    }

    /// Direct mutable access to the block array, used by GC's in-place
    /// repair pass (which rewrites individual blocks before calling
    /// `commit_repaired_blocks` to recompute bookkeeping).
    pub fn blocks_mut(&mut self) -> &mut Vec<IndexBlock> {
        &mut self.blocks
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn last_id(&self) -> DocId {
        self.last_id
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn num_entries(&self) -> u64 {
        match self.tail {
            IndexTail::NumEntries(n) => n,
            IndexTail::FieldMask(_) => self.blocks.iter().map(|b| b.num_entries as u64).sum(),
        }
    }

    pub fn field_mask(&self) -> u64 {
        match self.tail {
            IndexTail::FieldMask(m) => m,
            IndexTail::NumEntries(_) => 0,
        }
    }

    pub fn gc_marker(&self) -> u32 {
        self.gc_marker.load(Ordering::Acquire)
    }

    pub fn bump_gc_marker(&self) {
        self.gc_marker.fetch_add(1, Ordering::AcqRel);
    }

    fn codec(&self) -> Codec {
        self.flags.codec()
    }

    /// `writeEntry(docId, record)`: appends to the last block, allocating
    /// a new one if the current tail is full or absent. Records the delta
    /// from `lastId`, and rejects out-of-order writes.
    pub fn write_entry(&mut self, doc_id: DocId, record: &Posting) -> Result<usize> {
        let ordering_ok = if self.multi_value { doc_id >= self.last_id } else { doc_id > self.last_id };
        if self.last_id != 0 && !ordering_ok {
            return Err(CoreError::Ordering { last: self.last_id, attempted: doc_id });
        }

        let is_same_doc = doc_id == self.last_id && self.last_id != 0;
        let cap = self.block_capacity();

        if self.blocks.is_empty() || (!is_same_doc && self.blocks.last().unwrap().num_entries >= cap) {
            self.blocks.push(IndexBlock::new(doc_id));
        }

        let codec = self.codec();
        let block = self.blocks.last_mut().unwrap();
        let prev_last = block.last_id;
        let delta = if block.num_entries == 0 { 0 } else { doc_id - prev_last };

        let mut encoded = Vec::new();
        codec.encode(delta, record, &mut encoded);
        let bytes_written = encoded.len();
        block.buf.writer().write(&encoded);

        block.last_id = doc_id;
        block.num_entries += 1;
        if !is_same_doc {
            self.num_docs += 1;
        }
        self.last_id = doc_id;

        match &mut self.tail {
            IndexTail::FieldMask(m) => *m |= record.field_mask,
            IndexTail::NumEntries(n) => *n += 1,
        }

        Ok(bytes_written)
    }

    /// Decode every surviving posting in document order. Intended for
    /// tests, debug dumps, and GC's full-index repair scan -- not the hot
    /// query path, which uses the iterator readers instead.
    pub fn scan(&self) -> Result<Vec<Posting>> {
        let codec = self.codec();
        let mut out = Vec::new();
        for block in &self.blocks {
            let mut reader = VarintReader::new(block.buf.as_slice());
            let mut prev = 0 as DocId;
            for _ in 0..block.num_entries {
                let rec = codec.decode(prev, &mut reader)?;
                prev = rec.doc_id;
                out.push(rec);
            }
        }
        Ok(out)
    }

    /// Rebuilds an index from its persisted parts (header fields plus the
    /// block list already decoded from disk), recomputing the tail union
    /// and gc-marker from scratch rather than trusting a serialized copy
    /// of either.
    pub fn restore(flags: IndexFlags, multi_value: bool, blocks: Vec<IndexBlock>, last_id: DocId, num_docs: u32) -> Result<Self> {
        let mut idx = InvertedIndex::new(flags, multi_value);
        idx.last_id = last_id;
        idx.num_docs = num_docs;
        if flags.uses_field_mask() {
            let mut mask = 0u64;
            for p in Self::scan_blocks(&blocks, flags.codec())? {
                mask |= p.field_mask;
            }
            idx.tail = IndexTail::FieldMask(mask);
        } else {
            let total: u64 = blocks.iter().map(|b| b.num_entries as u64).sum();
            idx.tail = IndexTail::NumEntries(total);
        }
        idx.blocks = blocks;
        Ok(idx)
    }

    fn scan_blocks(blocks: &[IndexBlock], codec: Codec) -> Result<Vec<Posting>> {
        let mut out = Vec::new();
        for block in blocks {
            let mut reader = VarintReader::new(block.buf.as_slice());
            let mut prev = 0 as DocId;
            for _ in 0..block.num_entries {
                let rec = codec.decode(prev, &mut reader)?;
                prev = rec.doc_id;
                out.push(rec);
            }
        }
        Ok(out)
    }

    /// Swap in a repaired set of blocks (used by fork-GC's commit phase)
    /// and recompute the docs/entries/gc-marker bookkeeping.
    pub fn commit_repaired_blocks(&mut self, new_blocks: Vec<IndexBlock>) {
        self.num_docs = new_blocks.iter().map(|b| b.num_entries as u32).sum();
        self.blocks = new_blocks;
        match &mut self.tail {
            IndexTail::NumEntries(n) => *n = self.blocks.iter().map(|b| b.num_entries as u64).sum(),
            IndexTail::FieldMask(_) => {}
        }
        self.bump_gc_marker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_flags() -> IndexFlags {
        IndexFlags::STORE_FREQS | IndexFlags::STORE_FIELD_MASK
    }

    #[test]
    fn write_entry_rejects_non_increasing_ids() {
        let mut idx = InvertedIndex::new(text_flags(), false);
        idx.write_entry(5, &Posting { doc_id: 5, freq: 1, field_mask: 1, offsets: vec![], numeric_value: None }).unwrap();
        let err = idx.write_entry(5, &Posting { doc_id: 5, freq: 1, field_mask: 1, offsets: vec![], numeric_value: None });
        assert!(err.is_err());
    }

    #[test]
    fn scan_round_trips_monotonic_writes() {
        let mut idx = InvertedIndex::new(text_flags(), false);
        for id in [1u64, 5, 9, 20] {
            idx.write_entry(id, &Posting { doc_id: id, freq: 2, field_mask: 0b1, offsets: vec![], numeric_value: None }).unwrap();
        }
        let scanned = idx.scan().unwrap();
        let ids: Vec<DocId> = scanned.iter().map(|p| p.doc_id).collect();
        assert_eq!(ids, vec![1, 5, 9, 20]);
        assert_eq!(idx.num_docs(), 4);
        assert_eq!(idx.last_id(), 20);
    }

    #[test]
    fn splits_into_new_block_past_capacity() {
        let mut idx = InvertedIndex::new(IndexFlags::DOCIDS_ONLY, false);
        for id in 1..=(INDEX_BLOCK_SIZE_DOCID_ONLY as u64 + 5) {
            idx.write_entry(id, &Posting::doc_id_only(id)).unwrap();
        }
        assert_eq!(idx.num_blocks(), 2);
    }

    #[test]
    fn multi_value_allows_repeated_doc_id() {
        let mut idx = InvertedIndex::new(text_flags(), true);
        idx.write_entry(3, &Posting { doc_id: 3, freq: 1, field_mask: 1, offsets: vec![], numeric_value: None }).unwrap();
        idx.write_entry(3, &Posting { doc_id: 3, freq: 1, field_mask: 2, offsets: vec![], numeric_value: None }).unwrap();
        assert_eq!(idx.num_docs(), 1);
        assert_eq!(idx.scan().unwrap().len(), 2);
    }
}
