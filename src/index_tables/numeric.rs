use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::doctable::DocId;
use crate::error::Result;
use crate::inverted_index::{IndexFlags, InvertedIndex, Posting};

/// A leaf's covered value range, its live inverted index, and a rough
/// cardinality estimate used to decide when to split.
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
    pub index: Arc<RwLock<InvertedIndex>>,
    /// Distinguishes this leaf allocation across reopens/splits, the
    /// same role `unique_id` plays for the term index.
    pub unique_id: u64,
}

enum Node {
    Leaf(NumericRange),
    Internal { split: f64, left: usize, right: usize },
    /// A collapsed-away slot left behind by `sweep_empty_leaves`. Arena
    /// positions are never reused so every other node's indices stay
    /// valid; a `Dead` slot is simply unreachable from the root.
    Dead,
}

/// Range-split binary tree of inverted indexes over a numeric field.
/// Nodes live in a flat arena and are referred to by index rather than
/// raw pointer, so the tree (and GC's pruning of empty leaves) never
/// needs back-traversal or manual cycle-breaking.
pub struct NumericTree {
    arena: RwLock<Vec<Node>>,
    root: RwLock<usize>,
    split_card: u32,
    next_unique_id: AtomicU64,
}

impl NumericTree {
    pub fn new(split_card: u32) -> Self {
        let root_leaf = Node::Leaf(NumericRange {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            index: Arc::new(RwLock::new(InvertedIndex::new(IndexFlags::STORE_NUMERIC, true))),
            unique_id: 1,
        });
        NumericTree { arena: RwLock::new(vec![root_leaf]), root: RwLock::new(0), split_card, next_unique_id: AtomicU64::new(2) }
    }

    /// Inserts `(doc_id, value)` into the leaf covering `value`, splitting
    /// that leaf on its median once it crosses `split_card` entries.
    pub fn insert(&self, doc_id: DocId, value: f64) -> Result<()> {
        let leaf_idx = self.find_leaf(value);
        {
            let arena = self.arena.read();
            if let Node::Leaf(range) = &arena[leaf_idx] {
                range.index.write().write_entry(doc_id, &Posting::numeric(doc_id, value))?;
            }
        }
        self.maybe_split(leaf_idx);
        Ok(())
    }

    fn find_leaf(&self, value: f64) -> usize {
        let arena = self.arena.read();
        let mut cur = *self.root.read();
        loop {
            match &arena[cur] {
                Node::Leaf(_) => return cur,
                Node::Internal { split, left, right } => {
                    cur = if value <= *split { *left } else { *right };
                }
                Node::Dead => unreachable!("dead arena slot reached from root"),
            }
        }
    }

    fn maybe_split(&self, leaf_idx: usize) {
        let should_split = {
            let arena = self.arena.read();
            match &arena[leaf_idx] {
                Node::Leaf(range) => range.index.read().num_docs() > self.split_card,
                Node::Internal { .. } | Node::Dead => false,
            }
        };
        if !should_split {
            return;
        }

        let mut arena = self.arena.write();
        let (min, max, postings) = match &arena[leaf_idx] {
            Node::Leaf(range) => {
                let postings = range.index.read().scan().unwrap_or_default();
                (range.min, range.max, postings)
            }
            Node::Internal { .. } | Node::Dead => return,
        };
        if postings.len() < 2 {
            return;
        }

        let mut values: Vec<f64> = postings.iter().filter_map(|p| p.numeric_value).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = values[values.len() / 2];
        if median == min || !median.is_finite() {
            return;
        }

        let mut left_idx = InvertedIndex::new(IndexFlags::STORE_NUMERIC, true);
        let mut right_idx = InvertedIndex::new(IndexFlags::STORE_NUMERIC, true);
        let mut sorted_postings = postings;
        sorted_postings.sort_by_key(|p| p.doc_id);
        for p in &sorted_postings {
            let v = p.numeric_value.unwrap_or(0.0);
            if v <= median {
                left_idx.write_entry(p.doc_id, p).ok();
            } else {
                right_idx.write_entry(p.doc_id, p).ok();
            }
        }

        let left_id = self.next_unique_id.fetch_add(1, Ordering::AcqRel);
        let right_id = self.next_unique_id.fetch_add(1, Ordering::AcqRel);
        let left_node = Node::Leaf(NumericRange { min, max: median, index: Arc::new(RwLock::new(left_idx)), unique_id: left_id });
        let right_node = Node::Leaf(NumericRange { min: median, max, index: Arc::new(RwLock::new(right_idx)), unique_id: right_id });

        arena.push(left_node);
        let left_pos = arena.len() - 1;
        arena.push(right_node);
        let right_pos = arena.len() - 1;
        arena[leaf_idx] = Node::Internal { split: median, left: left_pos, right: right_pos };
    }

    /// Every leaf whose range overlaps `[min, max]`, in ascending order.
    pub fn overlapping_leaves(&self, min: f64, max: f64) -> Vec<Arc<RwLock<InvertedIndex>>> {
        let arena = self.arena.read();
        let mut out = Vec::new();
        let mut stack = vec![*self.root.read()];
        while let Some(cur) = stack.pop() {
            match &arena[cur] {
                Node::Leaf(range) => {
                    if range.min <= max && range.max >= min {
                        out.push((range.min, range.index.clone()));
                    }
                }
                Node::Internal { split, left, right } => {
                    if min <= *split {
                        stack.push(*left);
                    }
                    if max > *split {
                        stack.push(*right);
                    }
                }
                Node::Dead => unreachable!("dead arena slot reached from root"),
            }
        }
        out.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        out.into_iter().map(|(_, idx)| idx).collect()
    }

    /// Every leaf's `(unique_id, index)`, for GC's repair scan and for
    /// routing a reconciled repair message back to its leaf.
    pub fn leaves(&self) -> Vec<(u64, Arc<RwLock<InvertedIndex>>)> {
        self.arena
            .read()
            .iter()
            .filter_map(|n| match n {
                Node::Leaf(r) => Some((r.unique_id, r.index.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn leaf_by_unique_id(&self, id: u64) -> Option<Arc<RwLock<InvertedIndex>>> {
        self.arena.read().iter().find_map(|n| match n {
            Node::Leaf(r) if r.unique_id == id => Some(r.index.clone()),
            _ => None,
        })
    }

    pub fn num_leaves(&self) -> usize {
        self.arena.read().iter().filter(|n| matches!(n, Node::Leaf(_))).count()
    }

    /// Count of leaves whose inverted index has become empty -- the
    /// trigger GC uses to decide a sweep is due.
    pub fn num_empty_leaves(&self) -> usize {
        self.arena
            .read()
            .iter()
            .filter(|n| matches!(n, Node::Leaf(r) if r.index.read().num_docs() == 0))
            .count()
    }

    /// Collapses every internal node both of whose children are empty
    /// leaves into a single empty leaf spanning their combined range.
    /// Returns the number of internal nodes collapsed.
    pub fn sweep_empty_leaves(&self) -> usize {
        let mut arena = self.arena.write();
        let is_empty_leaf = |arena: &[Node], i: usize| matches!(&arena[i], Node::Leaf(r) if r.index.read().num_docs() == 0);

        let candidates: Vec<usize> = (0..arena.len())
            .filter(|&i| match &arena[i] {
                Node::Internal { left, right, .. } => is_empty_leaf(&arena, *left) && is_empty_leaf(&arena, *right),
                _ => false,
            })
            .collect();

        let mut swept = 0;
        for i in candidates {
            let (left, right) = match &arena[i] {
                Node::Internal { left, right, .. } => (*left, *right),
                _ => continue, // an ancestor in this same pass already collapsed past this node
            };
            let (min, max) = match (&arena[left], &arena[right]) {
                (Node::Leaf(l), Node::Leaf(r)) => (l.min, r.max),
                _ => continue,
            };
            let unique_id = self.next_unique_id.fetch_add(1, Ordering::AcqRel);
            arena[left] = Node::Dead;
            arena[right] = Node::Dead;
            arena[i] = Node::Leaf(NumericRange {
                min,
                max,
                index: Arc::new(RwLock::new(InvertedIndex::new(IndexFlags::STORE_NUMERIC, true))),
                unique_id,
            });
            swept += 1;
        }
        swept
    }
}
