use crate::doctable::DocId;
use crate::error::Result;
use crate::inverted_index::Posting;
use crate::iterator::{IndexIterator, IteratorNode, ReadResult, SkipResult};

fn merge(postings: Vec<Posting>, doc_id: DocId) -> Posting {
    let mut freq = 0u32;
    let mut field_mask = 0u64;
    let mut offsets = Vec::new();
    for p in postings {
        freq += p.freq;
        field_mask |= p.field_mask;
        offsets.extend(p.offsets);
    }
    offsets.sort_unstable();
    offsets.dedup();
    Posting { doc_id, freq, field_mask, offsets, numeric_value: None }
}

/// Checks whether `per_child` (one offset list per intersected term) has
/// a phrase match within `max_slop` gaps, trying every combination of one
/// offset per child. Offset lists are small (bounded by term frequency
/// within a single field), so brute force is appropriate here.
fn has_phrase_match(per_child: &[Vec<u32>], max_slop: u32, in_order: bool) -> bool {
    fn backtrack(per_child: &[Vec<u32>], idx: usize, chosen: &mut Vec<u32>, max_slop: u32, in_order: bool) -> bool {
        if idx == per_child.len() {
            return satisfies_slop(chosen, max_slop, in_order);
        }
        for &offset in &per_child[idx] {
            chosen.push(offset);
            if backtrack(per_child, idx + 1, chosen, max_slop, in_order) {
                return true;
            }
            chosen.pop();
        }
        false
    }

    fn satisfies_slop(chosen: &[u32], max_slop: u32, in_order: bool) -> bool {
        if in_order {
            for w in chosen.windows(2) {
                if w[1] <= w[0] || (w[1] - w[0] - 1) as u32 > max_slop {
                    return false;
                }
            }
            true
        } else {
            let min = *chosen.iter().min().unwrap();
            let max = *chosen.iter().max().unwrap();
            (max - min) as u32 <= max_slop + chosen.len() as u32 - 1
        }
    }

    if per_child.iter().any(|v| v.is_empty()) {
        return false;
    }
    backtrack(per_child, 0, &mut Vec::new(), max_slop, in_order)
}

/// AND of all children: advances the laggards up to the current maximum
/// until every child agrees on a doc-id, optionally also requiring a
/// phrase-proximity match across term offsets.
pub struct IntersectIterator {
    children: Vec<Box<IteratorNode>>,
    heads: Vec<Option<Posting>>,
    exhausted: bool,
    last_id: DocId,
    aborted: bool,
    max_slop: Option<u32>,
    in_order: bool,
}

impl IntersectIterator {
    pub fn new(children: Vec<Box<IteratorNode>>) -> Self {
        let n = children.len();
        IntersectIterator { children, heads: vec![None; n], exhausted: false, last_id: 0, aborted: false, max_slop: None, in_order: false }
    }

    pub fn with_slop(mut self, max_slop: u32, in_order: bool) -> Self {
        self.max_slop = Some(max_slop);
        self.in_order = in_order;
        self
    }

    fn slop_ok(&self, postings: &[Posting]) -> bool {
        match self.max_slop {
            None => true,
            Some(slop) => {
                let per_child: Vec<Vec<u32>> = postings.iter().map(|p| p.offsets.clone()).collect();
                has_phrase_match(&per_child, slop, self.in_order)
            }
        }
    }

    /// Advance until every child's head agrees, or one is exhausted.
    /// Returns the agreed postings (one per child) or `None` at EOF.
    fn converge(&mut self, start: DocId) -> Result<Option<Vec<Posting>>> {
        if self.children.is_empty() {
            return Ok(None);
        }
        let mut target = start;
        loop {
            for i in 0..self.children.len() {
                let needs_skip = match &self.heads[i] {
                    Some(p) => p.doc_id < target,
                    None => true,
                };
                if needs_skip {
                    match self.children[i].skip_to(target)? {
                        SkipResult::Found(p) | SkipResult::NotFound(p) => self.heads[i] = Some(p),
                        SkipResult::Eof => {
                            self.exhausted = true;
                            return Ok(None);
                        }
                    }
                }
            }

            let max_id = self.heads.iter().flatten().map(|p| p.doc_id).max().unwrap();
            if self.heads.iter().all(|h| h.as_ref().unwrap().doc_id == max_id) {
                let postings: Vec<Posting> = self.heads.iter_mut().map(|h| h.take().unwrap()).collect();
                if self.slop_ok(&postings) {
                    return Ok(Some(postings));
                }
                target = max_id + 1;
                continue;
            }
            target = max_id;
        }
    }
}

impl IndexIterator for IntersectIterator {
    fn read(&mut self) -> Result<ReadResult> {
        if self.aborted || self.exhausted {
            return Ok(ReadResult::Eof);
        }
        match self.converge(self.last_id + 1)? {
            Some(postings) => {
                let doc_id = postings[0].doc_id;
                self.last_id = doc_id;
                Ok(ReadResult::Found(merge(postings, doc_id)))
            }
            None => Ok(ReadResult::Eof),
        }
    }

    fn skip_to(&mut self, target: DocId) -> Result<SkipResult> {
        if self.aborted || self.exhausted {
            return Ok(SkipResult::Eof);
        }
        match self.converge(target)? {
            Some(postings) => {
                let doc_id = postings[0].doc_id;
                self.last_id = doc_id;
                let merged = merge(postings, doc_id);
                if doc_id == target {
                    Ok(SkipResult::Found(merged))
                } else {
                    Ok(SkipResult::NotFound(merged))
                }
            }
            None => Ok(SkipResult::Eof),
        }
    }

    fn last_doc_id(&self) -> DocId {
        self.last_id
    }

    fn num_estimated(&self) -> usize {
        self.children.iter().map(|c| c.num_estimated()).min().unwrap_or(0)
    }

    fn rewind(&mut self) {
        for c in &mut self.children {
            c.rewind();
        }
        self.heads.iter_mut().for_each(|h| *h = None);
        self.exhausted = false;
        self.last_id = 0;
        self.aborted = false;
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
    fn yields_only_common_doc_ids() {
        let mut it = IntersectIterator::new(vec![node(vec![1, 2, 3, 4]), node(vec![2, 4, 6])]);
        let mut seen = Vec::new();
        loop {
            match it.read().unwrap() {
                ReadResult::Found(p) => seen.push(p.doc_id),
                ReadResult::Eof => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(seen, vec![2, 4]);
    }

    #[test]
    fn empty_intersection_when_no_overlap() {
        let mut it = IntersectIterator::new(vec![node(vec![1, 3]), node(vec![2, 4])]);
        assert_eq!(it.read().unwrap(), ReadResult::Eof);
    }

    #[test]
    fn phrase_match_respects_order_and_slop() {
        use crate::inverted_index::{IndexFlags, InvertedIndex};
        use crate::iterator::{term_reader::TermReader, Deadline};
        use parking_lot::RwLock;
        use std::sync::Arc;

        let mut idx_a = InvertedIndex::new(IndexFlags::STORE_FREQS | IndexFlags::STORE_TERM_OFFSETS, false);
        idx_a.write_entry(1, &Posting { doc_id: 1, freq: 1, field_mask: 0, offsets: vec![0], numeric_value: None }).unwrap();
        let mut idx_b = InvertedIndex::new(IndexFlags::STORE_FREQS | IndexFlags::STORE_TERM_OFFSETS, false);
        idx_b.write_entry(1, &Posting { doc_id: 1, freq: 1, field_mask: 0, offsets: vec![1], numeric_value: None }).unwrap();

        let term_a = TermReader::new(Arc::new(RwLock::new(idx_a)), Deadline::far_future()).unwrap();
        let term_b = TermReader::new(Arc::new(RwLock::new(idx_b)), Deadline::far_future()).unwrap();

        let mut it = IntersectIterator::new(vec![
            Box::new(IteratorNode::Term(term_a)),
            Box::new(IteratorNode::Term(term_b)),
        ])
        .with_slop(0, true);

        assert_eq!(it.read().unwrap(), ReadResult::Found(Posting { doc_id: 1, freq: 2, field_mask: 0, offsets: vec![0, 1], numeric_value: None }));
    }
}
