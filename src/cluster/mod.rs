//! Cluster fan-out coordinator: dispatches a query to every shard
//! that owns a piece of the key-space, merges the ordered per-shard reply
//! streams, and tracks partial failure and timeout against a shared
//! barrier.

mod barrier;
mod coordinator;
mod slot_range;

pub use barrier::{ReplyState, ShardBarrier};
pub use coordinator::{Coordinator, FanoutOutcome, ShardClient, ShardReply};
pub use slot_range::SlotRange;
