//! Cursor store: opaque 64-bit continuation handles for multi-round
//! aggregation. `FT.CURSOR READ` reclaims an entry, resumes its paused
//! pipeline, and either completes (entry dropped) or is re-inserted with
//! a fresh idle timestamp. Entries idle past `cursor_max_idle` are swept
//! on access rather than by a background timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

pub type CursorId = u64;

/// The paused state a cursor resumes into. Concretely this is whatever
/// the host's aggregation pipeline needs to carry between rounds; this
/// crate only needs to move it opaquely, so it's a type parameter rather
/// than a concrete pipeline type.
struct Entry<P> {
    pipeline: P,
    idle_since: Instant,
}

/// Process-wide table of paused aggregation pipelines, keyed by opaque
/// cursor id. `dashmap` gives the concurrent, no-single-owning-lock
/// access this workload needs: many query threads inserting and
/// removing cursors independently.
pub struct CursorStore<P> {
    entries: DashMap<CursorId, Entry<P>>,
    next_id: AtomicU64,
    max_idle: Duration,
}

impl<P> CursorStore<P> {
    pub fn new(max_idle: Duration) -> Self {
        CursorStore { entries: DashMap::new(), next_id: AtomicU64::new(1), max_idle }
    }

    /// Stores a newly paused pipeline and returns its opaque id.
    pub fn store(&self, pipeline: P) -> CursorId {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        self.entries.insert(id, Entry { pipeline, idle_since: Instant::now() });
        id
    }

    /// `FT.CURSOR READ`: removes and returns the entry if present and not
    /// expired. The caller decides whether to re-store it (more rounds
    /// pending) or let it stay dropped (aggregation complete).
    pub fn reclaim(&self, id: CursorId) -> Option<P> {
        self.sweep_expired();
        self.entries.remove(&id).map(|(_, e)| e.pipeline)
    }

    /// Re-inserts a pipeline under the same id with a fresh idle
    /// timestamp, for a round that produced more results to come.
    pub fn re_store(&self, id: CursorId, pipeline: P) {
        self.entries.insert(id, Entry { pipeline, idle_since: Instant::now() });
    }

    /// `FT.CURSOR DEL`: drops an entry outright regardless of idle time.
    pub fn delete(&self, id: CursorId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Garbage-collects entries idle longer than `max_idle`. Called on
    /// every access rather than on a timer.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| now.duration_since(e.idle_since) < self.max_idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn store_and_reclaim_round_trips() {
        let store: CursorStore<Vec<u32>> = CursorStore::new(Duration::from_secs(60));
        let id = store.store(vec![1, 2, 3]);
        let pipeline = store.reclaim(id).unwrap();
        assert_eq!(pipeline, vec![1, 2, 3]);
        assert!(store.reclaim(id).is_none());
    }

    #[test]
    fn re_store_keeps_same_id_alive_for_another_round() {
        let store: CursorStore<u32> = CursorStore::new(Duration::from_secs(60));
        let id = store.store(10);
        let p = store.reclaim(id).unwrap();
        store.re_store(id, p + 1);
        assert_eq!(store.reclaim(id), Some(11));
    }

    #[test]
    fn idle_entries_are_swept_on_access() {
        let store: CursorStore<u32> = CursorStore::new(Duration::from_millis(10));
        let id = store.store(1);
        std::thread::sleep(Duration::from_millis(30));
        assert!(store.reclaim(id).is_none());
    }

    #[test]
    fn delete_removes_regardless_of_idle_time() {
        let store: CursorStore<u32> = CursorStore::new(Duration::from_secs(60));
        let id = store.store(1);
        assert!(store.delete(id));
        assert!(!store.delete(id));
    }
}
