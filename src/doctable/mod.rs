//! The document table: the mapping from opaque external key to an internal
//! monotonic doc-id, plus per-document metadata, refcounted lifecycle, and
//! TTL bookkeeping.

mod table;
mod ttl;

pub use table::{DocFlags, DocHandle, DocMetadata, DocTable, PutResult, SortValue};
pub use ttl::{FieldExpiration, TtlTable};

pub type DocId = u64;
