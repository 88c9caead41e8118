//! The query iterator tree: a composable family of doc-id-ordered cursors
//! with uniform `read`/`skipTo` semantics. Dynamic dispatch is avoided
//! inside the tree itself -- `IteratorNode` is a tagged sum over the ten
//! variants, each monomorphised; only the query-planner API boundary
//! returns a `Box<dyn IndexIterator>`.

mod id_list;
mod intersect;
mod not;
mod numeric_reader;
mod optional;
mod term_reader;
mod union;
mod wildcard;

pub use id_list::IdListIterator;
pub use intersect::IntersectIterator;
pub use not::NotIterator;
pub use numeric_reader::NumericReader;
pub use optional::OptionalIterator;
pub use term_reader::TermReader;
pub use union::UnionIterator;
pub use wildcard::WildcardIterator;

use std::time::Instant;

use crate::doctable::DocId;
use crate::error::Result;
use crate::inverted_index::Posting;

#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    Found(Posting),
    NotFound,
    Eof,
    Timeout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipResult {
    /// The exact target was found.
    Found(Posting),
    /// The target was absent; this is the result at the next id after it.
    NotFound(Posting),
    Eof,
}

/// A per-query absolute deadline, checked at block boundaries and on
/// every `skip_to`, matching the suspension points named in the
/// concurrency model.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn from_now(timeout: std::time::Duration) -> Self {
        Deadline { at: Instant::now() + timeout }
    }

    pub fn far_future() -> Self {
        Deadline { at: Instant::now() + std::time::Duration::from_secs(3600 * 24 * 365) }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

pub trait IndexIterator {
    fn read(&mut self) -> Result<ReadResult>;
    fn skip_to(&mut self, target: DocId) -> Result<SkipResult>;
    fn last_doc_id(&self) -> DocId;
    /// Upper bound used by the planner to order intersect children for
    /// best galloping behaviour; not necessarily exact.
    fn num_estimated(&self) -> usize;
    fn rewind(&mut self);
    fn abort(&mut self);
}

/// A tagged sum over every iterator variant. Query-tree composition
/// builds these directly; only the planner's public entry point erases
/// the type into `Box<dyn IndexIterator>`.
pub enum IteratorNode {
    Term(TermReader),
    Numeric(NumericReader),
    Union(UnionIterator),
    Intersect(IntersectIterator),
    Not(NotIterator),
    Optional(OptionalIterator),
    Wildcard(WildcardIterator),
    IdList(IdListIterator),
}

impl IndexIterator for IteratorNode {
    fn read(&mut self) -> Result<ReadResult> {
        match self {
            IteratorNode::Term(it) => it.read(),
            IteratorNode::Numeric(it) => it.read(),
            IteratorNode::Union(it) => it.read(),
            IteratorNode::Intersect(it) => it.read(),
            IteratorNode::Not(it) => it.read(),
            IteratorNode::Optional(it) => it.read(),
            IteratorNode::Wildcard(it) => it.read(),
            IteratorNode::IdList(it) => it.read(),
        }
    }

    fn skip_to(&mut self, target: DocId) -> Result<SkipResult> {
        match self {
            IteratorNode::Term(it) => it.skip_to(target),
            IteratorNode::Numeric(it) => it.skip_to(target),
            IteratorNode::Union(it) => it.skip_to(target),
            IteratorNode::Intersect(it) => it.skip_to(target),
            IteratorNode::Not(it) => it.skip_to(target),
            IteratorNode::Optional(it) => it.skip_to(target),
            IteratorNode::Wildcard(it) => it.skip_to(target),
            IteratorNode::IdList(it) => it.skip_to(target),
        }
    }

    fn last_doc_id(&self) -> DocId {
        match self {
            IteratorNode::Term(it) => it.last_doc_id(),
            IteratorNode::Numeric(it) => it.last_doc_id(),
            IteratorNode::Union(it) => it.last_doc_id(),
            IteratorNode::Intersect(it) => it.last_doc_id(),
            IteratorNode::Not(it) => it.last_doc_id(),
            IteratorNode::Optional(it) => it.last_doc_id(),
            IteratorNode::Wildcard(it) => it.last_doc_id(),
            IteratorNode::IdList(it) => it.last_doc_id(),
        }
    }

    fn num_estimated(&self) -> usize {
        match self {
            IteratorNode::Term(it) => it.num_estimated(),
            IteratorNode::Numeric(it) => it.num_estimated(),
            IteratorNode::Union(it) => it.num_estimated(),
            IteratorNode::Intersect(it) => it.num_estimated(),
            IteratorNode::Not(it) => it.num_estimated(),
            IteratorNode::Optional(it) => it.num_estimated(),
            IteratorNode::Wildcard(it) => it.num_estimated(),
            IteratorNode::IdList(it) => it.num_estimated(),
        }
    }

    fn rewind(&mut self) {
        match self {
            IteratorNode::Term(it) => it.rewind(),
            IteratorNode::Numeric(it) => it.rewind(),
            IteratorNode::Union(it) => it.rewind(),
            IteratorNode::Intersect(it) => it.rewind(),
            IteratorNode::Not(it) => it.rewind(),
            IteratorNode::Optional(it) => it.rewind(),
            IteratorNode::Wildcard(it) => it.rewind(),
            IteratorNode::IdList(it) => it.rewind(),
        }
    }

    fn abort(&mut self) {
        match self {
            IteratorNode::Term(it) => it.abort(),
            IteratorNode::Numeric(it) => it.abort(),
            IteratorNode::Union(it) => it.abort(),
            IteratorNode::Intersect(it) => it.abort(),
            IteratorNode::Not(it) => it.abort(),
            IteratorNode::Optional(it) => it.abort(),
            IteratorNode::Wildcard(it) => it.abort(),
            IteratorNode::IdList(it) => it.abort(),
        }
    }
}
