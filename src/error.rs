//! Crate-wide error taxonomy.
//!
//! Errors partition into three tiers: input errors are surfaced to the
//! caller verbatim, resource errors describe conditions the caller can
//! retry or degrade around, and internal errors should not occur in steady
//! state -- their public `Display` is deliberately generic, while the full
//! diagnosis is kept around for `Debug` and tests.

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    // --- Input: surfaced to the caller verbatim ---
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("could not parse arguments: {0}")]
    ParseArgs(String),

    #[error("unknown attribute: {0}")]
    BadAttr(String),

    #[error("missing required parameter: {0}")]
    NoParam(String),

    #[error("duplicate parameter: {0}")]
    DupParam(String),

    #[error("invalid value: {0}")]
    BadVal(String),

    #[error("key must not be empty")]
    BadKey,

    #[error("docId ordering violated: tried to write {attempted}, last was {last}")]
    Ordering { last: u64, attempted: u64 },

    // --- Resource: caller can retry or degrade ---
    #[error("no results")]
    NoResults,

    #[error("query timed out")]
    TimedOut,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("doc table is full")]
    DocTableFull,

    #[error("generic error: {0}")]
    Generic(String),

    // --- Internal: public Display is deliberately vague ---
    #[error("internal inconsistency")]
    Internal(InternalError),
}

/// Detailed diagnosis for an `Internal` error. Kept out of `CoreError`'s
/// public `Display` so callers never see raw corruption detail, but fully
/// inspectable via `Debug` and in tests.
#[derive(Debug)]
pub struct InternalError {
    pub kind: InternalErrorKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalErrorKind {
    Corruption,
    GcPipeEof,
    RefcountUnderflow,
    Io,
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

impl CoreError {
    pub fn corruption(detail: impl Into<String>) -> Self {
        CoreError::Internal(InternalError { kind: InternalErrorKind::Corruption, detail: detail.into() })
    }

    pub fn gc_pipe_eof(detail: impl Into<String>) -> Self {
        CoreError::Internal(InternalError { kind: InternalErrorKind::GcPipeEof, detail: detail.into() })
    }

    pub fn refcount_underflow(detail: impl Into<String>) -> Self {
        CoreError::Internal(InternalError { kind: InternalErrorKind::RefcountUnderflow, detail: detail.into() })
    }

    /// True for errors that should degrade a reply to "partial results"
    /// rather than aborting it outright.
    pub fn is_degradable(&self) -> bool {
        matches!(self, CoreError::TimedOut | CoreError::NoResults)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Internal(InternalError { kind: InternalErrorKind::Io, detail: e.to_string() })
    }
}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::corruption(format!("serialization failure: {e}"))
    }
}
