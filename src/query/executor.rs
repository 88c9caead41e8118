//! Drives a compiled iterator tree to completion, scores each match, and
//! keeps only the top `limit + offset` results seen so far in a bounded
//! min-heap rather than collecting and sorting the whole match set.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::doctable::DocId;
use crate::error::Result;
use crate::inverted_index::calculate_idf;
use crate::iterator::{IndexIterator, ReadResult};
use crate::query::planner::ExecutionPlan;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub doc_id: DocId,
    pub score: f32,
}

/// Ordered so a `BinaryHeap<ScoredDoc>` pops its *worst* entry first,
/// letting the executor evict the weakest candidate once the heap grows
/// past `limit + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScoredDoc(SearchResult);

impl Eq for ScoredDoc {}

impl PartialOrd for ScoredDoc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredDoc {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .score
            .partial_cmp(&self.0.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.0.doc_id.cmp(&self.0.doc_id))
    }
}

pub struct ExecutionEngine;

impl ExecutionEngine {
    pub fn new() -> Self {
        ExecutionEngine
    }

    /// Runs `plan.root` to exhaustion (or until its deadline trips),
    /// scores every match, and returns up to `limit` results starting
    /// after the first `offset`, ordered by descending score then
    /// ascending doc-id.
    pub fn execute(&self, mut plan: ExecutionPlan) -> Result<Vec<SearchResult>> {
        let keep = plan.limit.saturating_add(plan.offset);
        let term_docs = plan.root.num_estimated().max(1);
        let idf = calculate_idf(plan.total_docs.max(1), term_docs) as f32;

        let mut heap: BinaryHeap<ScoredDoc> = BinaryHeap::new();
        loop {
            match plan.root.read()? {
                ReadResult::Found(posting) => {
                    if !plan.doc_table.is_live(posting.doc_id) {
                        continue;
                    }
                    let score = (posting.freq.max(1) as f32) * idf;
                    heap.push(ScoredDoc(SearchResult { doc_id: posting.doc_id, score }));
                    if keep > 0 && heap.len() > keep {
                        heap.pop();
                    }
                }
                ReadResult::Eof => break,
                ReadResult::NotFound => continue,
                ReadResult::Timeout => break,
            }
        }

        let mut ranked: Vec<SearchResult> = heap.into_iter().map(|s| s.0).collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.doc_id.cmp(&b.doc_id)));
        if plan.offset >= ranked.len() {
            return Ok(Vec::new());
        }
        let end = (plan.offset + plan.limit).min(ranked.len());
        Ok(ranked[plan.offset..end].to_vec())
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}
