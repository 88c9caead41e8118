//! Parses and compiles a query string into a ready-to-run iterator tree,
//! capturing limit/offset and an absolute deadline at plan time so a
//! single request's timeout doesn't drift while it executes.

use std::sync::Arc;
use std::time::Duration;

use crate::doctable::DocTable;
use crate::error::Result;
use crate::iterator::{Deadline, IteratorNode};
use crate::query::compiler::Compiler;
use crate::query::parser::Parser;
use crate::query::schema::Schema;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    pub offset: usize,
    pub timeout: Duration,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        SearchRequest { query: query.into(), limit: 10, offset: 0, timeout: Duration::from_millis(500) }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct ExecutionPlan {
    pub root: Box<IteratorNode>,
    pub limit: usize,
    pub offset: usize,
    pub total_docs: usize,
    /// Consulted once per match so a document deleted after its posting
    /// was written, but before fork-GC next reclaims it, never surfaces
    /// in a result set.
    pub doc_table: Arc<DocTable>,
}

pub struct QueryPlanner<'a> {
    schema: &'a Schema,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        QueryPlanner { schema }
    }

    pub fn plan(&self, request: &SearchRequest) -> Result<ExecutionPlan> {
        let ast = Parser::parse(&request.query)?;
        let deadline = Deadline::from_now(request.timeout);
        let compiler = Compiler::new(self.schema, deadline);
        let root = compiler.compile(&ast)?;
        Ok(ExecutionPlan {
            root,
            limit: request.limit,
            offset: request.offset,
            total_docs: self.schema.doc_table().len() as usize,
            doc_table: self.schema.doc_table().clone(),
        })
    }
}
