use crate::doctable::DocId;
use crate::error::Result;
use crate::inverted_index::Posting;
use crate::iterator::wildcard::WildcardIterator;
use crate::iterator::{IndexIterator, IteratorNode, ReadResult, SkipResult};

/// Doc-ids present in the universe (all live documents) but absent from
/// `child`. The universe is a `WildcardIterator` rather than a bare
/// range, so deleted documents are never produced even when negated.
pub struct NotIterator {
    child: Box<IteratorNode>,
    universe: WildcardIterator,
    child_exhausted: bool,
    last_id: DocId,
    aborted: bool,
}

impl NotIterator {
    pub fn new(child: Box<IteratorNode>, universe: WildcardIterator) -> Self {
        NotIterator { child, universe, child_exhausted: false, last_id: 0, aborted: false }
    }

    /// True if `child` contains `id`, advancing its cursor up to `id`.
    fn child_contains(&mut self, id: DocId) -> Result<bool> {
        if self.child_exhausted {
            return Ok(false);
        }
        match self.child.skip_to(id)? {
            SkipResult::Found(_) => Ok(true),
            SkipResult::NotFound(_) => Ok(false),
            SkipResult::Eof => {
                self.child_exhausted = true;
                Ok(false)
            }
        }
    }
}

impl IndexIterator for NotIterator {
    fn read(&mut self) -> Result<ReadResult> {
        if self.aborted {
            return Ok(ReadResult::Eof);
        }
        loop {
            match self.universe.read()? {
                ReadResult::Found(p) => {
                    if self.child_contains(p.doc_id)? {
                        continue;
                    }
                    self.last_id = p.doc_id;
                    return Ok(ReadResult::Found(p));
                }
                other => return Ok(other),
            }
        }
    }

    fn skip_to(&mut self, target: DocId) -> Result<SkipResult> {
        if self.aborted {
            return Ok(SkipResult::Eof);
        }
        let mut result = self.universe.skip_to(target)?;
        loop {
            match result {
                SkipResult::Found(p) | SkipResult::NotFound(p) => {
                    if self.child_contains(p.doc_id)? {
                        result = self.universe.read().map(|r| match r {
                            ReadResult::Found(np) => SkipResult::NotFound(np),
                            _ => SkipResult::Eof,
                        })?;
                        continue;
                    }
                    self.last_id = p.doc_id;
                    return Ok(if p.doc_id == target { SkipResult::Found(p) } else { SkipResult::NotFound(p) });
                }
                SkipResult::Eof => return Ok(SkipResult::Eof),
            }
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
    fn yields_everything_not_in_child() {
        let dt = table_with(5);
        let universe = WildcardIterator::new(dt);
        let child = Box::new(IteratorNode::IdList(IdListIterator::new(vec![2, 4])));
        let mut it = NotIterator::new(child, universe);

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
}
