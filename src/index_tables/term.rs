use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::inverted_index::{IndexFlags, InvertedIndex};

struct TermEntry {
    index: Arc<RwLock<InvertedIndex>>,
    /// Identifies this particular index allocation across reopens; GC
    /// compares the id it captured at fork time to the live entry's id
    /// to detect the term was dropped and recreated underneath it.
    unique_id: u64,
}

/// Token -> inverted index. Modeled as a sorted map from the raw token
/// bytes rather than a character trie -- same lookup/insert contract,
/// simpler to reason about, consistent with the doc table's key map.
pub struct TermIndex {
    entries: RwLock<BTreeMap<Box<[u8]>, TermEntry>>,
    next_unique_id: AtomicU64,
    flags: IndexFlags,
    multi_value: bool,
}

impl TermIndex {
    pub fn new(flags: IndexFlags, multi_value: bool) -> Self {
        TermIndex { entries: RwLock::new(BTreeMap::new()), next_unique_id: AtomicU64::new(1), flags, multi_value }
    }

    pub fn get(&self, term: &[u8]) -> Option<Arc<RwLock<InvertedIndex>>> {
        self.entries.read().get(term).map(|e| e.index.clone())
    }

    pub fn unique_id_of(&self, term: &[u8]) -> Option<u64> {
        self.entries.read().get(term).map(|e| e.unique_id)
    }

    /// Returns the term's inverted index, creating an empty one on first
    /// use, plus the unique id this allocation was assigned.
    pub fn get_or_create(&self, term: &[u8]) -> (Arc<RwLock<InvertedIndex>>, u64) {
        if let Some(entry) = self.entries.read().get(term) {
            return (entry.index.clone(), entry.unique_id);
        }
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(term) {
            return (entry.index.clone(), entry.unique_id);
        }
        let unique_id = self.next_unique_id.fetch_add(1, Ordering::AcqRel);
        let index = Arc::new(RwLock::new(InvertedIndex::new(self.flags, self.multi_value)));
        entries.insert(term.to_vec().into_boxed_slice(), TermEntry { index: index.clone(), unique_id });
        (index, unique_id)
    }

    pub fn terms(&self) -> Vec<Box<[u8]>> {
        self.entries.read().keys().cloned().collect()
    }

    /// `(term, index, unique_id)` for every live term, for GC's repair
    /// scan.
    pub fn entries_snapshot(&self) -> Vec<(Box<[u8]>, Arc<RwLock<InvertedIndex>>, u64)> {
        self.entries.read().iter().map(|(k, e)| (k.clone(), e.index.clone(), e.unique_id)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// GC prunes a term whose index has become empty, but only if the
    /// live entry's unique id still matches what the scan observed --
    /// otherwise a concurrent writer already replaced it.
    pub fn remove_if_unchanged(&self, term: &[u8], observed_unique_id: u64) -> bool {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(term) {
            if entry.unique_id == observed_unique_id {
                entries.remove(term);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inverted_index::Posting;

    #[test]
    fn get_or_create_is_idempotent() {
        let idx = TermIndex::new(IndexFlags::STORE_FREQS, false);
        let (a, id_a) = idx.get_or_create(b"hello");
        let (b, id_b) = idx.get_or_create(b"hello");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn distinct_terms_get_distinct_unique_ids() {
        let idx = TermIndex::new(IndexFlags::STORE_FREQS, false);
        let (_, id_a) = idx.get_or_create(b"alpha");
        let (_, id_b) = idx.get_or_create(b"beta");
        assert_ne!(id_a, id_b);
    }

    #[test]
    fn remove_if_unchanged_respects_unique_id_race() {
        let idx = TermIndex::new(IndexFlags::DOCIDS_ONLY, false);
        let (index, unique_id) = idx.get_or_create(b"term");
        index.write().write_entry(1, &Posting::doc_id_only(1)).unwrap();

        // A racing writer drops and recreates the term before GC acts.
        idx.entries.write().remove(b"term".as_slice());
        idx.get_or_create(b"term");

        assert!(!idx.remove_if_unchanged(b"term", unique_id));
        assert_eq!(idx.len(), 1);
    }
}
