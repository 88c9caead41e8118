//! Shard-count barrier and reply state machine for cluster fan-out,
//! grounded on the original's `ShardCountBarrier`/`ShardResponseBarrier`
//! and `shard_barrier.h`'s notify callback: `numShards` is set once when
//! the topology is known, `numResponded` is incremented per reply, and
//! `accumulated_total` sums each shard's `total_results` for the
//! aggregate reply.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

/// `NotReplied -> Replying -> Replied`. `try_claim_reply` is the only way
/// to advance past `Replying`, implemented as a CAS so exactly one writer
/// -- the timeout firing or the final shard's data arriving, whichever
/// wins the race -- produces the final reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyState {
    NotReplied = 0,
    Replying = 1,
    Replied = 2,
}

impl ReplyState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ReplyState::NotReplied,
            1 => ReplyState::Replying,
            _ => ReplyState::Replied,
        }
    }
}

pub struct ShardBarrier {
    num_shards: AtomicUsize,
    num_responded: AtomicUsize,
    accumulated_total: AtomicI64,
    has_shard_error: AtomicBool,
    state: std::sync::atomic::AtomicU8,
}

impl ShardBarrier {
    pub fn new() -> Self {
        ShardBarrier {
            num_shards: AtomicUsize::new(0),
            num_responded: AtomicUsize::new(0),
            accumulated_total: AtomicI64::new(0),
            has_shard_error: AtomicBool::new(false),
            state: std::sync::atomic::AtomicU8::new(ReplyState::NotReplied as u8),
        }
    }

    /// Set once from the IO thread when the shard topology for this
    /// query becomes known.
    pub fn set_num_shards(&self, n: usize) {
        self.num_shards.store(n, Ordering::SeqCst);
    }

    pub fn num_shards(&self) -> usize {
        self.num_shards.load(Ordering::SeqCst)
    }

    pub fn num_responded(&self) -> usize {
        self.num_responded.load(Ordering::SeqCst)
    }

    /// Records one shard's reply; call once per shard, in any order.
    pub fn notify(&self, total_results: i64, is_error: bool) {
        self.num_responded.fetch_add(1, Ordering::SeqCst);
        if is_error {
            self.has_shard_error.store(true, Ordering::SeqCst);
        } else {
            self.accumulated_total.fetch_add(total_results, Ordering::SeqCst);
        }
    }

    pub fn accumulated_total(&self) -> i64 {
        self.accumulated_total.load(Ordering::SeqCst)
    }

    pub fn has_shard_error(&self) -> bool {
        self.has_shard_error.load(Ordering::SeqCst)
    }

    /// True once every expected shard has replied (`numShards` must
    /// already be set).
    pub fn is_complete(&self) -> bool {
        let expected = self.num_shards();
        expected > 0 && self.num_responded() >= expected
    }

    pub fn state(&self) -> ReplyState {
        ReplyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Moves `NotReplied -> Replying`, the first step before producing a
    /// reply (partial-on-timeout or complete-on-last-shard).
    pub fn begin_reply(&self) -> bool {
        self.state
            .compare_exchange(ReplyState::NotReplied as u8, ReplyState::Replying as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// CAS `Replying -> Replied`. Exactly one of {timeout firing, last
    /// shard's data arriving} wins this race; the loser's reply is
    /// dropped rather than double-sent.
    pub fn try_claim_reply(&self) -> bool {
        self.state
            .compare_exchange(ReplyState::Replying as u8, ReplyState::Replied as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for ShardBarrier {
    fn default() -> Self {
        Self::new()
    }
}
