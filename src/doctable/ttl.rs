//! Optional TTL side table: maps a doc-id to an absolute expiration and,
//! optionally, per-field expirations, without bloating every document's
//! metadata node with fields most indexes never use.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::doctable::DocId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldExpiration {
    pub field_index: u16,
    pub expires_at_ms: u64,
}

#[derive(Default)]
struct Entry {
    doc_expires_at_ms: Option<u64>,
    field_expirations: Vec<FieldExpiration>,
}

#[derive(Default)]
pub struct TtlTable {
    entries: RwLock<HashMap<DocId, Entry>>,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

impl TtlTable {
    pub fn new() -> Self {
        TtlTable::default()
    }

    pub fn set_doc_expiration(&self, id: DocId, expires_at_ms: u64) {
        self.entries.write().entry(id).or_default().doc_expires_at_ms = Some(expires_at_ms);
    }

    pub fn set_field_expiration(&self, id: DocId, field_index: u16, expires_at_ms: u64) {
        let mut entries = self.entries.write();
        let entry = entries.entry(id).or_default();
        if let Some(existing) = entry.field_expirations.iter_mut().find(|f| f.field_index == field_index) {
            existing.expires_at_ms = expires_at_ms;
        } else {
            entry.field_expirations.push(FieldExpiration { field_index, expires_at_ms });
        }
    }

    pub fn has_expiration(&self, id: DocId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Is the document itself expired as of `now_ms`? `None` means no TTL
    /// is set, which is never expired.
    pub fn is_doc_expired(&self, id: DocId, now_ms_val: u64) -> bool {
        self.entries
            .read()
            .get(&id)
            .and_then(|e| e.doc_expires_at_ms)
            .map(|exp| now_ms_val >= exp)
            .unwrap_or(false)
    }

    pub fn is_doc_expired_now(&self, id: DocId) -> bool {
        self.is_doc_expired(id, now_ms())
    }

    /// Verify a field-expiration predicate: "is any of these fields
    /// expired?" (used by queries that must skip postings whose owning
    /// field has expired independently of the whole document).
    pub fn any_field_expired(&self, id: DocId, field_indices: &[u16], now_ms_val: u64) -> bool {
        let entries = self.entries.read();
        let Some(entry) = entries.get(&id) else { return false };
        entry
            .field_expirations
            .iter()
            .any(|f| field_indices.contains(&f.field_index) && now_ms_val >= f.expires_at_ms)
    }

    pub fn clear(&self, id: DocId) {
        self.entries.write().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_without_ttl_never_expires() {
        let t = TtlTable::new();
        assert!(!t.is_doc_expired(5, u64::MAX));
    }

    #[test]
    fn doc_expiration_is_respected() {
        let t = TtlTable::new();
        t.set_doc_expiration(1, 1000);
        assert!(!t.is_doc_expired(1, 999));
        assert!(t.is_doc_expired(1, 1000));
        assert!(t.is_doc_expired(1, 1001));
    }

    #[test]
    fn field_expiration_predicate_checks_only_named_fields() {
        let t = TtlTable::new();
        t.set_field_expiration(1, 3, 500);
        assert!(!t.any_field_expired(1, &[4], 600));
        assert!(t.any_field_expired(1, &[3, 4], 600));
    }
}
