use crate::doctable::DocId;
use crate::error::Result;
use crate::inverted_index::Posting;
use crate::iterator::{IndexIterator, IteratorNode, ReadResult, SkipResult};

fn merge(mut postings: Vec<Posting>) -> Posting {
    debug_assert!(!postings.is_empty());
    let mut merged = postings.pop().unwrap();
    for p in postings {
        merged.freq += p.freq;
        merged.field_mask |= p.field_mask;
        merged.offsets.extend(p.offsets);
    }
    merged.offsets.sort_unstable();
    merged.offsets.dedup();
    merged
}

/// k-way union (OR) over a set of children, merging children that agree
/// on the same doc-id into a single result so downstream scoring sees
/// one record per document.
pub struct UnionIterator {
    children: Vec<Box<IteratorNode>>,
    heads: Vec<Option<Posting>>,
    exhausted: Vec<bool>,
    last_id: DocId,
    aborted: bool,
    primed: bool,
}

impl UnionIterator {
    pub fn new(children: Vec<Box<IteratorNode>>) -> Self {
        let n = children.len();
        UnionIterator { children, heads: vec![None; n], exhausted: vec![false; n], last_id: 0, aborted: false, primed: false }
    }

    fn prime(&mut self) -> Result<()> {
        if self.primed {
            return Ok(());
        }
        for i in 0..self.children.len() {
            self.pull(i)?;
        }
        self.primed = true;
        Ok(())
    }

    fn pull(&mut self, i: usize) -> Result<()> {
        if self.exhausted[i] {
            self.heads[i] = None;
            return Ok(());
        }
        match self.children[i].read()? {
            ReadResult::Found(p) => self.heads[i] = Some(p),
            ReadResult::Eof => {
                self.exhausted[i] = true;
                self.heads[i] = None;
            }
            ReadResult::NotFound | ReadResult::Timeout => {
                self.exhausted[i] = true;
                self.heads[i] = None;
            }
        }
        Ok(())
    }

    fn current_min(&self) -> Option<DocId> {
        self.heads.iter().flatten().map(|p| p.doc_id).min()
    }
}

impl IndexIterator for UnionIterator {
    fn read(&mut self) -> Result<ReadResult> {
        if self.aborted {
            return Ok(ReadResult::Eof);
        }
        self.prime()?;
        let min = match self.current_min() {
            Some(m) => m,
            None => return Ok(ReadResult::Eof),
        };

        let mut winners = Vec::new();
        for i in 0..self.heads.len() {
            if self.heads[i].as_ref().map(|p| p.doc_id) == Some(min) {
                winners.push(self.heads[i].take().unwrap());
                self.pull(i)?;
            }
        }

        self.last_id = min;
        Ok(ReadResult::Found(merge(winners)))
    }

    fn skip_to(&mut self, target: DocId) -> Result<SkipResult> {
        if self.aborted {
            return Ok(SkipResult::Eof);
        }
        self.prime()?;
        for i in 0..self.children.len() {
            let needs_pull = match &self.heads[i] {
                Some(p) => p.doc_id < target,
                None => !self.exhausted[i],
            };
            if needs_pull {
                match self.children[i].skip_to(target)? {
                    SkipResult::Found(p) | SkipResult::NotFound(p) => self.heads[i] = Some(p),
                    SkipResult::Eof => {
                        self.exhausted[i] = true;
                        self.heads[i] = None;
                    }
                }
            }
        }

        let min = match self.current_min() {
            Some(m) => m,
            None => return Ok(SkipResult::Eof),
        };

        let mut winners = Vec::new();
        for i in 0..self.heads.len() {
            if self.heads[i].as_ref().map(|p| p.doc_id) == Some(min) {
                winners.push(self.heads[i].take().unwrap());
                self.pull(i)?;
            }
        }

        self.last_id = min;
        let merged = merge(winners);
        if min == target {
            Ok(SkipResult::Found(merged))
        } else {
            Ok(SkipResult::NotFound(merged))
        }
    }

    fn last_doc_id(&self) -> DocId {
        self.last_id
    }

    fn num_estimated(&self) -> usize {
        self.children.iter().map(|c| c.num_estimated()).sum()
    }

    fn rewind(&mut self) {
        for c in &mut self.children {
            c.rewind();
        }
        self.heads.iter_mut().for_each(|h| *h = None);
        self.exhausted.iter_mut().for_each(|e| *e = false);
        self.last_id = 0;
        self.aborted = false;
        self.primed = false;
    }

    fn abort(&mut self) {
        self.aborted = true;
        for c in &mut self.children {
            c.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::IdListIterator;

    fn node(ids: Vec<DocId>) -> Box<IteratorNode> {
        Box::new(IteratorNode::IdList(IdListIterator::new(ids)))
    }

    #[test]
    fn merges_overlapping_doc_ids() {
        let mut u = UnionIterator::new(vec![node(vec![1, 3, 5]), node(vec![3, 4])]);
        let mut seen = Vec::new();
        loop {
            match u.read().unwrap() {
                ReadResult::Found(p) => seen.push(p.doc_id),
                ReadResult::Eof => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(seen, vec![1, 3, 4, 5]);
    }

    #[test]
    fn skip_to_lands_on_union_of_children() {
        let mut u = UnionIterator::new(vec![node(vec![2, 8]), node(vec![5, 9])]);
        assert_eq!(u.skip_to(5).unwrap(), SkipResult::Found(Posting::doc_id_only(5)));
        assert_eq!(u.skip_to(8).unwrap(), SkipResult::Found(Posting::doc_id_only(8)));
    }

    #[test]
    fn num_estimated_sums_children() {
        let u = UnionIterator::new(vec![node(vec![1, 2]), node(vec![3])]);
        assert_eq!(u.num_estimated(), 3);
    }
}
