//! Registry tying field names to the index tables that back them. Built
//! once at index-definition time and shared between document ingestion
//! and query compilation, so both sides agree on which bit of a term's
//! field mask a given text field owns.

use std::collections::HashMap;
use std::sync::Arc;

use crate::doctable::DocTable;
use crate::error::{CoreError, Result};
use crate::index_tables::{NumericTree, TagIndex, TermIndex};
use crate::inverted_index::IndexFlags;

/// Every full-text field shares one `TermIndex`; a field is distinguished
/// by the bit it owns in a posting's field mask (up to 64 full-text
/// fields per index, the same ceiling a 64-bit mask imposes generally).
pub struct Schema {
    doc_table: Arc<DocTable>,
    terms: Arc<TermIndex>,
    text_fields: HashMap<String, u64>,
    numeric_fields: HashMap<String, Arc<NumericTree>>,
    tag_fields: HashMap<String, Arc<TagIndex>>,
    next_text_bit: u32,
}

impl Schema {
    pub fn new(doc_table: Arc<DocTable>) -> Self {
        Schema {
            doc_table,
            terms: Arc::new(TermIndex::new(IndexFlags::STORE_FREQS | IndexFlags::STORE_FIELD_MASK | IndexFlags::STORE_TERM_OFFSETS, true)),
            text_fields: HashMap::new(),
            numeric_fields: HashMap::new(),
            tag_fields: HashMap::new(),
            next_text_bit: 0,
        }
    }

    pub fn doc_table(&self) -> &Arc<DocTable> {
        &self.doc_table
    }

    pub fn terms(&self) -> &Arc<TermIndex> {
        &self.terms
    }

    /// Registers a full-text field, assigning it the next free field-mask
    /// bit. Re-declaring an existing field name is a no-op.
    pub fn add_text_field(&mut self, name: &str) -> Result<u64> {
        if let Some(&mask) = self.text_fields.get(name) {
            return Ok(mask);
        }
        if self.next_text_bit >= 64 {
            return Err(CoreError::ResourceExhausted("too many full-text fields for a 64-bit mask".to_string()));
        }
        let mask = 1u64 << self.next_text_bit;
        self.next_text_bit += 1;
        self.text_fields.insert(name.to_string(), mask);
        Ok(mask)
    }

    pub fn text_field_mask(&self, name: &str) -> Option<u64> {
        self.text_fields.get(name).copied()
    }

    pub fn add_numeric_field(&mut self, name: &str, split_card: u32) -> Arc<NumericTree> {
        self.numeric_fields.entry(name.to_string()).or_insert_with(|| Arc::new(NumericTree::new(split_card))).clone()
    }

    pub fn numeric_field(&self, name: &str) -> Option<Arc<NumericTree>> {
        self.numeric_fields.get(name).cloned()
    }

    pub fn add_tag_field(&mut self, name: &str) -> Arc<TagIndex> {
        self.tag_fields.entry(name.to_string()).or_insert_with(|| Arc::new(TagIndex::new(IndexFlags::DOCIDS_ONLY))).clone()
    }

    pub fn tag_field(&self, name: &str) -> Option<Arc<TagIndex>> {
        self.tag_fields.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(Arc::new(DocTable::new(1000)))
    }

    #[test]
    fn text_fields_get_distinct_mask_bits() {
        let mut s = schema();
        let a = s.add_text_field("title").unwrap();
        let b = s.add_text_field("body").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.count_ones(), 1);
        assert_eq!(b.count_ones(), 1);
    }

    #[test]
    fn redeclaring_a_text_field_returns_the_same_mask() {
        let mut s = schema();
        let a = s.add_text_field("title").unwrap();
        let b = s.add_text_field("title").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn numeric_and_tag_fields_are_looked_up_by_name() {
        let mut s = schema();
        s.add_numeric_field("price", 10_000);
        s.add_tag_field("color");
        assert!(s.numeric_field("price").is_some());
        assert!(s.tag_field("color").is_some());
        assert!(s.numeric_field("missing").is_none());
    }
}
