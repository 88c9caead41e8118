use crate::doctable::DocId;
use crate::error::Result;
use crate::inverted_index::Posting;
use crate::iterator::{IndexIterator, ReadResult, SkipResult};

/// A pre-sorted, static list of doc-ids, used for small literal sets such
/// as a tag value's expansion or a tiny tombstone list where building a
/// full inverted index would be overkill.
pub struct IdListIterator {
    ids: Vec<DocId>,
    pos: usize,
    last_id: DocId,
    aborted: bool,
}

impl IdListIterator {
    /// `ids` must already be sorted ascending; duplicates are collapsed.
    pub fn new(mut ids: Vec<DocId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        IdListIterator { ids, pos: 0, last_id: 0, aborted: false }
    }
}

impl IndexIterator for IdListIterator {
    fn read(&mut self) -> Result<ReadResult> {
        if self.aborted || self.pos >= self.ids.len() {
            return Ok(ReadResult::Eof);
        }
        let id = self.ids[self.pos];
        self.pos += 1;
        self.last_id = id;
        Ok(ReadResult::Found(Posting::doc_id_only(id)))
    }

    fn skip_to(&mut self, target: DocId) -> Result<SkipResult> {
        if self.aborted {
            return Ok(SkipResult::Eof);
        }
        let idx = self.ids[self.pos..].partition_point(|&id| id < target) + self.pos;
        if idx >= self.ids.len() {
            self.pos = self.ids.len();
            return Ok(SkipResult::Eof);
        }
        let id = self.ids[idx];
        self.pos = idx + 1;
        self.last_id = id;
        if id == target {
            Ok(SkipResult::Found(Posting::doc_id_only(id)))
        } else {
            Ok(SkipResult::NotFound(Posting::doc_id_only(id)))
        }
    }

    fn last_doc_id(&self) -> DocId {
        self.last_id
    }

    fn num_estimated(&self) -> usize {
        self.ids.len()
    }

    fn rewind(&mut self) {
        self.pos = 0;
        self.last_id = 0;
        self.aborted = false;
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_sorted_deduplicated() {
        let mut it = IdListIterator::new(vec![5, 3, 3, 1]);
        let mut seen = Vec::new();
        loop {
            match it.read().unwrap() {
                ReadResult::Found(p) => seen.push(p.doc_id),
                ReadResult::Eof => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(seen, vec![1, 3, 5]);
    }

    #[test]
    fn skip_to_binary_searches() {
        let mut it = IdListIterator::new(vec![1, 4, 9, 16, 25]);
        assert_eq!(it.skip_to(9).unwrap(), SkipResult::Found(Posting::doc_id_only(9)));
        assert_eq!(it.skip_to(10).unwrap(), SkipResult::NotFound(Posting::doc_id_only(16)));
        assert_eq!(it.skip_to(100).unwrap(), SkipResult::Eof);
    }
}
