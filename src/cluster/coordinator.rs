//! Dispatches one query to every shard, merges their already-sorted
//! reply streams, and produces a partial-results indication when the
//! per-request deadline fires before every shard has responded.
//!
//! Each shard's RPC call runs on `rayon`'s pool, used here for the data
//! parallelism of dispatching to every shard at once; replies are pushed
//! onto a bounded `crossbeam` channel so
//! the merge loop never needs to poll -- it blocks on `recv_timeout`
//! against the shared deadline instead.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, RecvTimeoutError};

use crate::cluster::barrier::ShardBarrier;
use crate::cluster::slot_range::{self, SlotRange};
use crate::doctable::DocId;

/// Literal argument name the host's command parser recognizes, per
/// spec.md §6: commands are forwarded verbatim with this one extra
/// trailing argument appended when the index is partitioned.
const RANGE_SLOTS_ARG: &[u8] = b"RANGE_SLOTS_BINARY";

/// Appends ` RANGE_SLOTS_BINARY <encoded-ranges>` to `command` for a shard
/// that owns a non-empty set of slot ranges; commands for an unpartitioned
/// index (empty `ranges`) are forwarded unchanged.
fn command_for_shard(command: &[u8], ranges: &[SlotRange]) -> Vec<u8> {
    let mut out = command.to_vec();
    if ranges.is_empty() {
        return out;
    }
    out.push(b' ');
    out.extend_from_slice(RANGE_SLOTS_ARG);
    out.push(b' ');
    out.extend_from_slice(&slot_range::encode(ranges));
    out
}

/// One shard's answer to a fanned-out command. `ids` is already sorted
/// ascending by doc-id within the shard (the property every iterator in
/// this crate guarantees); the coordinator only has to merge across
/// shards, not within one.
#[derive(Debug, Clone)]
pub struct ShardReply {
    pub shard_index: usize,
    pub ids: Vec<(DocId, f32)>,
    pub total_results: i64,
    pub is_error: bool,
    pub error_detail: Option<String>,
}

/// The host's RPC transport, abstracted to the one call the coordinator
/// needs. A real host implements this over its native wire framing;
/// tests use an in-memory stand-in.
pub trait ShardClient: Send + Sync {
    fn query(&self, shard_index: usize, command: &[u8]) -> ShardReply;
}

pub struct FanoutOutcome {
    pub merged: Vec<(DocId, f32)>,
    pub total_results: i64,
    /// True if the deadline fired before every shard reported; the
    /// caller should annotate its reply with a partial-results warning.
    pub partial: bool,
    pub shard_errors: usize,
}

pub struct Coordinator;

struct HeapEntry {
    doc_id: DocId,
    score: f32,
    shard: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.doc_id == other.doc_id
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; invert so the smallest doc-id surfaces
        // first, giving ascending-id merge order across shards.
        other.doc_id.cmp(&self.doc_id)
    }
}

impl Coordinator {
    /// Dispatches `command` to every client in `clients`, merges replies
    /// by ascending doc-id until `k` results have been produced or every
    /// shard has reported, and stops early (marking the outcome partial)
    /// if `deadline` fires first.
    ///
    /// `shard_slot_ranges[i]` is the set of slot ranges shard `i` owns; a
    /// non-empty set gets `RANGE_SLOTS_BINARY <encoded-ranges>` appended to
    /// its forwarded command per spec.md §6. Pass an empty slice per shard
    /// for an unpartitioned index.
    pub fn fan_out(
        clients: &[Arc<dyn ShardClient>],
        command: Vec<u8>,
        shard_slot_ranges: &[Vec<SlotRange>],
        k: usize,
        deadline: Duration,
    ) -> FanoutOutcome {
        let barrier = Arc::new(ShardBarrier::new());
        barrier.set_num_shards(clients.len());
        let (tx, rx) = bounded::<ShardReply>(clients.len().max(1));

        let started = Instant::now();
        let deadline_at = started + deadline;

        rayon::scope(|scope| {
            for (i, client) in clients.iter().enumerate() {
                let tx = tx.clone();
                let client = client.clone();
                let ranges = shard_slot_ranges.get(i).map(Vec::as_slice).unwrap_or(&[]);
                let shard_command = command_for_shard(&command, ranges);
                scope.spawn(move |_| {
                    let reply = client.query(i, &shard_command);
                    let _ = tx.send(reply);
                });
            }
        });
        drop(tx);

        let mut heaps_by_shard: Vec<std::collections::VecDeque<(DocId, f32)>> = vec![Default::default(); clients.len()];
        let mut shard_errors = 0usize;
        let mut total_results: i64 = 0;
        let mut partial = false;

        barrier.begin_reply();
        loop {
            if barrier.is_complete() {
                break;
            }
            let remaining = deadline_at.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                partial = true;
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok(reply) => {
                    barrier.notify(reply.total_results, reply.is_error);
                    if reply.is_error {
                        shard_errors += 1;
                    } else {
                        total_results += reply.total_results;
                        heaps_by_shard[reply.shard_index] = reply.ids.into_iter().collect();
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    partial = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        // Only one side (timeout path above, or the complete-barrier path)
        // should actually finalize a reply; the other is a no-op CAS loss.
        let _claimed = barrier.try_claim_reply();

        let mut heap = BinaryHeap::new();
        for (shard, ids) in heaps_by_shard.iter().enumerate() {
            if let Some(&(doc_id, score)) = ids.front() {
                heap.push(HeapEntry { doc_id, score, shard });
            }
        }
        let mut queues = heaps_by_shard;
        let mut merged = Vec::with_capacity(k.min(1024));
        while merged.len() < k {
            let Some(HeapEntry { doc_id, score, shard }) = heap.pop() else { break };
            merged.push((doc_id, score));
            queues[shard].pop_front();
            if let Some(&(next_id, next_score)) = queues[shard].front() {
                heap.push(HeapEntry { doc_id: next_id, score: next_score, shard });
            }
        }

        FanoutOutcome { merged, total_results, partial, shard_errors }
    }
}
