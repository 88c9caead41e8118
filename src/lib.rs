//! Embedded inverted-index search core.
//!
//! This crate holds the indexing and query-execution engine for a
//! full-text/numeric/tag search extension meant to be embedded inside a
//! host key/value store: inverted-index block storage, the query
//! iterator tree, the document table, a fork-based garbage collector,
//! and a cluster fan-out coordinator. Tokenization, the RESP/CLI wire
//! surface, a vector engine's similarity math, and thread-pool
//! internals stay out of scope; this crate models them with narrow
//! seams (`IndexIterator`, `ShardClient`, `work_queue::Job`) rather than
//! implementing them.

pub mod buffer;
pub mod cluster;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod doctable;
pub mod error;
pub mod gc;
pub mod index_tables;
pub mod inverted_index;
pub mod iterator;
pub mod persist;
pub mod query;
pub mod reply_pool;
pub mod work_queue;

pub use config::Config;
pub use doctable::DocId;
pub use error::{CoreError, Result};
pub use query::{ExecutionEngine, ExecutionPlan, QueryNode, QueryPlanner, SearchRequest, SearchResult, Schema};
