use std::sync::Arc;

use crate::doctable::{DocId, DocTable};
use crate::error::Result;
use crate::inverted_index::Posting;
use crate::iterator::{IndexIterator, ReadResult, SkipResult};

/// Synthesizes a dense doc-id stream over every live document, without
/// backing storage of its own. Used as the universe for `NOT` and as the
/// base stream for `OPTIONAL`. The doc-id range is snapshotted at
/// construction time from the table's `max_doc_id`; ids created after
/// that point are simply not visited, matching a single query's
/// point-in-time view of the corpus.
pub struct WildcardIterator {
    doc_table: Arc<DocTable>,
    max_id: DocId,
    cur: DocId,
    last_id: DocId,
    aborted: bool,
}

impl WildcardIterator {
    pub fn new(doc_table: Arc<DocTable>) -> Self {
        let max_id = doc_table.max_doc_id();
        WildcardIterator { doc_table, max_id, cur: 0, last_id: 0, aborted: false }
    }

    fn next_live_from(&self, mut id: DocId) -> Option<DocId> {
        while id <= self.max_id {
            if self.doc_table.borrow(id).is_some() {
                return Some(id);
            }
            id += 1;
        }
        None
    }
}

impl IndexIterator for WildcardIterator {
    fn read(&mut self) -> Result<ReadResult> {
        if self.aborted {
            return Ok(ReadResult::Eof);
        }
        match self.next_live_from(self.cur + 1) {
            Some(id) => {
                self.cur = id;
                self.last_id = id;
                Ok(ReadResult::Found(Posting::doc_id_only(id)))
            }
            None => {
                self.cur = self.max_id + 1;
                Ok(ReadResult::Eof)
            }
        }
    }

    fn skip_to(&mut self, target: DocId) -> Result<SkipResult> {
        if self.aborted {
            return Ok(SkipResult::Eof);
        }
        let from = target.max(self.cur + 1);
        match self.next_live_from(from) {
            Some(id) => {
                self.cur = id;
                self.last_id = id;
                if id == target {
                    Ok(SkipResult::Found(Posting::doc_id_only(id)))
                } else {
                    Ok(SkipResult::NotFound(Posting::doc_id_only(id)))
                }
            }
            None => {
                self.cur = self.max_id + 1;
                Ok(SkipResult::Eof)
            }
        }
    }

    fn last_doc_id(&self) -> DocId {
        self.last_id
    }

    fn num_estimated(&self) -> usize {
        self.doc_table.len() as usize
    }

    fn rewind(&mut self) {
        self.cur = 0;
        self.last_id = 0;
        self.aborted = false;
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}
