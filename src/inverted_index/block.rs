use crate::buffer::Buffer;
use crate::doctable::DocId;

/// Entries in each block before a new one is allocated. Text/tag/numeric
/// indexes use the tighter cap because their records are larger; pure
/// doc-id lists (e.g. a "missing field" index) can pack far more ids per
/// block before paying the cost of a new block header.
pub const INDEX_BLOCK_SIZE: u16 = 100;
pub const INDEX_BLOCK_SIZE_DOCID_ONLY: u16 = 1000;

/// One block of an inverted index: a contiguous, delta-encoded run of
/// postings, bounded so that repair/GC work is proportional to one
/// block rather than the whole index.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IndexBlock {
    pub first_id: DocId,
    pub last_id: DocId,
    pub buf: Buffer,
    pub num_entries: u16,
}

impl IndexBlock {
    pub fn new(first_id: DocId) -> Self {
        IndexBlock { first_id, last_id: first_id, buf: Buffer::new(), num_entries: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    pub fn contains(&self, doc_id: DocId) -> bool {
        doc_id >= self.first_id && doc_id <= self.last_id
    }

    pub fn data_len(&self) -> usize {
        self.buf.len()
    }
}
