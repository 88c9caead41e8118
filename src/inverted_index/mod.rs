//! The inverted index: an ordered sequence of blocks, each a delta-encoded
//! run of postings for one term, tag value, or numeric-tree leaf.

mod block;
mod index;
mod posting;
mod repair;

pub use block::{IndexBlock, INDEX_BLOCK_SIZE, INDEX_BLOCK_SIZE_DOCID_ONLY};
pub use index::InvertedIndex;
pub use posting::{calculate_idf, calculate_idf_bm25, Codec, Posting};
pub use repair::{repair_block, RepairParams, RepairStats};

/// Selects the posting codec and whether a field mask / entry counter is
/// carried in the index's tail union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexFlags(u16);

impl IndexFlags {
    pub const STORE_FREQS: IndexFlags = IndexFlags(1 << 0);
    pub const STORE_FIELD_MASK: IndexFlags = IndexFlags(1 << 1);
    pub const STORE_TERM_OFFSETS: IndexFlags = IndexFlags(1 << 2);
    pub const STORE_NUMERIC: IndexFlags = IndexFlags(1 << 3);
    pub const DOCIDS_ONLY: IndexFlags = IndexFlags(1 << 4);
    pub const WIDE_SCHEMA: IndexFlags = IndexFlags(1 << 5);

    pub fn empty() -> Self {
        IndexFlags(0)
    }

    pub fn contains(self, other: IndexFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn from_bits(bits: u16) -> Self {
        IndexFlags(bits)
    }

    /// Text indexes track a field mask unless the index is too wide for
    /// that to be cheap; numeric/doc-ids-only indexes track a raw entry
    /// count instead. These are mutually exclusive, matching the tail
    /// union in the original layout.
    pub fn uses_field_mask(self) -> bool {
        self.contains(IndexFlags::STORE_FIELD_MASK) && !self.contains(IndexFlags::WIDE_SCHEMA)
    }

    pub fn codec(self) -> Codec {
        if self.contains(IndexFlags::STORE_NUMERIC) {
            Codec::Numeric
        } else if self.contains(IndexFlags::DOCIDS_ONLY) {
            Codec::DocIdsOnly
        } else {
            Codec::FullText {
                freqs: self.contains(IndexFlags::STORE_FREQS),
                field_mask: self.contains(IndexFlags::STORE_FIELD_MASK),
                offsets: self.contains(IndexFlags::STORE_TERM_OFFSETS),
            }
        }
    }
}

impl std::ops::BitOr for IndexFlags {
    type Output = IndexFlags;
    fn bitor(self, rhs: IndexFlags) -> IndexFlags {
        IndexFlags(self.0 | rhs.0)
    }
}
