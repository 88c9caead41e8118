//! Parses a query string, compiles it against a field schema into an
//! iterator tree, and executes it into a ranked result set.

mod ast;
mod compiler;
mod executor;
mod parser;
mod planner;
mod schema;

pub use ast::QueryNode;
pub use executor::{ExecutionEngine, SearchResult};
pub use planner::{ExecutionPlan, QueryPlanner, SearchRequest};
pub use schema::Schema;
