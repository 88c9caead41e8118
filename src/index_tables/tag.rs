use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::inverted_index::{IndexFlags, InvertedIndex};

/// Suffixes shorter than this aren't indexed -- a 1- or 2-byte suffix
/// would match nearly every tag value and blow up the suffix trie for
/// no query-time benefit.
pub const MIN_SUFFIX: usize = 3;

/// Tag value -> inverted index, plus an optional suffix accelerator for
/// `*suffix` and `*contains*` queries. The suffix map is keyed by every
/// suffix of length >= `MIN_SUFFIX` of each tag value, pointing at the
/// set of full tag values that produced it.
pub struct TagIndex {
    values: RwLock<BTreeMap<Box<[u8]>, Arc<RwLock<InvertedIndex>>>>,
    suffixes: RwLock<BTreeMap<Box<[u8]>, Vec<Box<[u8]>>>>,
    flags: IndexFlags,
}

impl TagIndex {
    pub fn new(flags: IndexFlags) -> Self {
        TagIndex { values: RwLock::new(BTreeMap::new()), suffixes: RwLock::new(BTreeMap::new()), flags }
    }

    pub fn get(&self, value: &[u8]) -> Option<Arc<RwLock<InvertedIndex>>> {
        self.values.read().get(value).map(|i| i.clone())
    }

    pub fn get_or_create(&self, value: &[u8]) -> Arc<RwLock<InvertedIndex>> {
        if let Some(idx) = self.values.read().get(value) {
            return idx.clone();
        }
        let mut values = self.values.write();
        if let Some(idx) = values.get(value) {
            return idx.clone();
        }
        let idx = Arc::new(RwLock::new(InvertedIndex::new(self.flags, true)));
        values.insert(value.to_vec().into_boxed_slice(), idx.clone());
        drop(values);
        self.index_suffixes(value);
        idx
    }

    fn index_suffixes(&self, value: &[u8]) {
        if value.len() < MIN_SUFFIX {
            return;
        }
        let mut suffixes = self.suffixes.write();
        for start in 0..=(value.len() - MIN_SUFFIX) {
            let suffix = &value[start..];
            let entry = suffixes.entry(suffix.to_vec().into_boxed_slice()).or_default();
            if !entry.iter().any(|v| v.as_ref() == value) {
                entry.push(value.to_vec().into_boxed_slice());
            }
        }
    }

    /// Every tag value whose byte string ends with `suffix`.
    pub fn values_ending_with(&self, suffix: &[u8]) -> Vec<Box<[u8]>> {
        self.suffixes.read().get(suffix).cloned().unwrap_or_default()
    }

    /// Every tag value containing `needle` anywhere, found by scanning
    /// from each of `needle`'s own suffix registrations and filtering;
    /// only practical because `needle` itself is short (a query term).
    pub fn values_containing(&self, needle: &[u8]) -> Vec<Box<[u8]>> {
        if needle.len() < MIN_SUFFIX {
            return self
                .values
                .read()
                .keys()
                .filter(|v| contains(v, needle))
                .cloned()
                .collect();
        }
        self.suffixes
            .read()
            .range(needle.to_vec().into_boxed_slice()..)
            .take_while(|(k, _)| k.starts_with(needle))
            .flat_map(|(_, vs)| vs.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// `(value, index)` for every live tag value, for GC's repair scan.
    pub fn entries_snapshot(&self) -> Vec<(Box<[u8]>, Arc<RwLock<InvertedIndex>>)> {
        self.values.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// GC prunes a tag value whose inverted index emptied out, removing
    /// it from both the value map and every suffix entry that referenced
    /// it.
    pub fn remove_if_empty(&self, value: &[u8]) -> bool {
        let is_empty = match self.values.read().get(value) {
            Some(idx) => idx.read().num_docs() == 0,
            None => return false,
        };
        if !is_empty {
            return false;
        }
        self.values.write().remove(value);
        let mut suffixes = self.suffixes.write();
        suffixes.retain(|_, vs| {
            vs.retain(|v| v.as_ref() != value);
            !vs.is_empty()
        });
        true
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_lookup_finds_matching_values() {
        let idx = TagIndex::new(IndexFlags::DOCIDS_ONLY);
        idx.get_or_create(b"red");
        idx.get_or_create(b"bored");
        idx.get_or_create(b"blue");

        let mut matches = idx.values_ending_with(b"red");
        matches.sort();
        assert_eq!(matches, vec![Box::from(*b"bored"), Box::from(*b"red")]);
    }

    #[test]
    fn contains_lookup_finds_substring_matches() {
        let idx = TagIndex::new(IndexFlags::DOCIDS_ONLY);
        idx.get_or_create(b"seafood");
        idx.get_or_create(b"food-truck");
        idx.get_or_create(b"blue");

        let mut matches = idx.values_containing(b"foo");
        matches.sort();
        assert_eq!(matches, vec![Box::from(*b"food-truck"), Box::from(*b"seafood")]);
    }

    #[test]
    fn remove_if_empty_cleans_suffix_entries() {
        let idx = TagIndex::new(IndexFlags::DOCIDS_ONLY);
        idx.get_or_create(b"red");
        assert!(idx.remove_if_empty(b"red"));
        assert!(idx.values_ending_with(b"red").is_empty());
        assert_eq!(idx.len(), 0);
    }
}
