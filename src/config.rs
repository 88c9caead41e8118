//! Engine configuration.
//!
//! Every knob the core reads is collected into one `Config` struct so a
//! request can capture an immutable snapshot at the start of its lifetime
//! (see the design notes on avoiding mid-request config drift) instead of
//! reading a globally mutable value at arbitrary points.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Bucket upper bound for the doc table.
    pub max_doc_table_size: usize,

    /// Disable the block allocator pool (use the system allocator directly).
    pub no_mem_pool: bool,

    /// Seconds between fork-GC rounds under normal operation.
    pub fork_gc_run_interval_sec: u64,

    /// Seconds to wait before retrying a fork-GC round after a failed fork
    /// or a broken pipe.
    pub fork_gc_retry_interval_sec: u64,

    /// Minimum fraction of reclaimable bytes in a block before GC bothers
    /// rewriting it, expressed as a percentage (0..=100).
    pub fork_gc_clean_threshold: u8,

    /// Seconds the GC child sleeps before exiting, to let the parent finish
    /// draining the pipe.
    pub fork_gc_sleep_before_exit_sec: u64,

    /// Whether a GC round also sweeps empty numeric-tree leaves.
    pub fork_gc_clean_numeric_empty_nodes: bool,

    /// Absolute per-query timeout.
    pub query_timeout_ms: u64,

    /// Cursors idle longer than this are eligible for cleanup.
    pub cursor_max_idle_ms: u64,

    /// Hard cap on the number of results a single query may return.
    pub max_search_results: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_doc_table_size: 1_000_000,
            no_mem_pool: false,
            fork_gc_run_interval_sec: 30,
            fork_gc_retry_interval_sec: 5,
            fork_gc_clean_threshold: 100,
            fork_gc_sleep_before_exit_sec: 0,
            fork_gc_clean_numeric_empty_nodes: true,
            query_timeout_ms: 500,
            cursor_max_idle_ms: 300_000,
            max_search_results: 1_000_000,
        }
    }
}

impl Config {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn cursor_max_idle(&self) -> Duration {
        Duration::from_millis(self.cursor_max_idle_ms)
    }

    pub fn fork_gc_run_interval(&self) -> Duration {
        Duration::from_secs(self.fork_gc_run_interval_sec)
    }

    pub fn fork_gc_retry_interval(&self) -> Duration {
        Duration::from_secs(self.fork_gc_retry_interval_sec)
    }

    /// A preset tuned for test suites: tight timeouts, frequent GC, no
    /// idle grace period, so scenario tests don't need to sleep long.
    pub fn for_testing() -> Self {
        Config {
            max_doc_table_size: 10_000,
            fork_gc_run_interval_sec: 0,
            fork_gc_retry_interval_sec: 0,
            query_timeout_ms: 5_000,
            cursor_max_idle_ms: 1_000,
            ..Default::default()
        }
    }
}
