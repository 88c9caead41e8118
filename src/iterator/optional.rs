use crate::doctable::DocId;
use crate::error::Result;
use crate::inverted_index::Posting;
use crate::iterator::wildcard::WildcardIterator;
use crate::iterator::{IndexIterator, IteratorNode, ReadResult, SkipResult};

/// Always yields the full universe of live documents, but enriches a
/// document's record with `child`'s posting when present. Used for
/// optional query clauses that boost matching documents without
/// restricting the result set to them.
pub struct OptionalIterator {
    child: Box<IteratorNode>,
    universe: WildcardIterator,
    child_exhausted: bool,
    last_id: DocId,
    aborted: bool,
}

impl OptionalIterator {
    pub fn new(child: Box<IteratorNode>, universe: WildcardIterator) -> Self {
        OptionalIterator { child, universe, child_exhausted: false, last_id: 0, aborted: false }
    }

    fn child_match(&mut self, id: DocId) -> Result<Option<Posting>> {
        if self.child_exhausted {
            return Ok(None);
        }
        match self.child.skip_to(id)? {
            SkipResult::Found(p) => Ok(Some(p)),
            SkipResult::NotFound(_) => Ok(None),
            SkipResult::Eof => {
                self.child_exhausted = true;
                Ok(None)
            }
        }
    }

    fn enrich(base: Posting, child: Option<Posting>) -> Posting {
        match child {
            None => base,
            Some(c) => Posting { doc_id: base.doc_id, freq: base.freq + c.freq, field_mask: base.field_mask | c.field_mask, offsets: c.offsets, numeric_value: base.numeric_value.or(c.numeric_value) },
        }
    }
}

impl IndexIterator for OptionalIterator {
    fn read(&mut self) -> Result<ReadResult> {
        if self.aborted {
            return Ok(ReadResult::Eof);
        }
        match self.universe.read()? {
            ReadResult::Found(p) => {
                let m = self.child_match(p.doc_id)?;
                self.last_id = p.doc_id;
                Ok(ReadResult::Found(Self::enrich(p, m)))
            }
            other => Ok(other),
        }
    }

    fn skip_to(&mut self, target: DocId) -> Result<SkipResult> {
        if self.aborted {
            return Ok(SkipResult::Eof);
        }
        match self.universe.skip_to(target)? {
            SkipResult::Found(p) => {
                let m = self.child_match(p.doc_id)?;
                self.last_id = p.doc_id;
                Ok(SkipResult::Found(Self::enrich(p, m)))
            }
            SkipResult::NotFound(p) => {
                let m = self.child_match(p.doc_id)?;
                self.last_id = p.doc_id;
                Ok(SkipResult::NotFound(Self::enrich(p, m)))
            }
            SkipResult::Eof => Ok(SkipResult::Eof),
        }
    }

    fn last_doc_id(&self) -> DocId {
        self.last_id
    }

    fn num_estimated(&self) -> usize {
        self.universe.num_estimated()
    }

    fn rewind(&mut self) {
        self.universe.rewind();
        self.child.rewind();
        self.child_exhausted = false;
        self.last_id = 0;
        self.aborted = false;
    }

    fn abort(&mut self) {
        self.aborted = true;
        self.universe.abort();
        self.child.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctable::{DocFlags, DocTable};
    use crate::iterator::IdListIterator;
    use std::sync::Arc;

    fn table_with(n: usize) -> Arc<DocTable> {
        let dt = DocTable::new(1000);
        for i in 0..n {
            dt.put(format!("doc{i}").as_bytes(), 1.0, DocFlags::default(), None).unwrap();
        }
        Arc::new(dt)
    }

    #[test]
    fn yields_all_documents_boosting_matches() {
        let dt = table_with(4);
        let universe = WildcardIterator::new(dt);
        let child = Box::new(IteratorNode::IdList(IdListIterator::new(vec![2])));
        let mut it = OptionalIterator::new(child, universe);

        let mut results = Vec::new();
        loop {
            match it.read().unwrap() {
                ReadResult::Found(p) => results.push((p.doc_id, p.freq)),
                ReadResult::Eof => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(results, vec![(1, 1), (2, 2), (3, 1), (4, 1)]);
    }
}
