use crate::codec::varint::VarintReader;
use crate::doctable::DocId;
use crate::error::Result;
use crate::inverted_index::block::IndexBlock;
use crate::inverted_index::posting::{Codec, Posting};

/// Input knobs and output counters for one block's repair pass. Mirrors
/// the original's in/out `IndexRepairParams` struct rather than splitting
/// into separate request/response types, since GC reuses and accumulates
/// the same counters across many blocks in one round.
#[derive(Debug, Clone, Default)]
pub struct RepairParams {
    /// How many index blocks this round is willing to scan before
    /// yielding back to the scheduler.
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RepairStats {
    pub bytes_before_fix: usize,
    pub bytes_after_fix: usize,
    pub bytes_collected: usize,
    pub docs_collected: usize,
    pub entries_collected: usize,
    /// True if every entry in the block was dropped; the caller should
    /// remove the block entirely rather than keep an empty shell.
    pub became_empty: bool,
}

/// Walk `block`'s postings, dropping every record whose doc-id fails
/// `is_alive`, and rewrite the surviving tail in place so delta
/// continuity is preserved. `on_survive` is invoked once per surviving
/// record (used by numeric-tree leaves to rebuild their cardinality
/// estimate without a second pass).
pub fn repair_block(
    block: &mut IndexBlock,
    codec: Codec,
    is_alive: impl Fn(DocId) -> bool,
    mut on_survive: impl FnMut(&Posting),
) -> Result<RepairStats> {
    let bytes_before = block.buf.len();
    let mut reader = VarintReader::new(block.buf.as_slice());
    let mut prev = 0 as DocId;
    let mut survivors: Vec<Posting> = Vec::with_capacity(block.num_entries as usize);
    let mut docs_collected = 0usize;
    let mut entries_collected = 0usize;

    for _ in 0..block.num_entries {
        let rec = codec.decode(prev, &mut reader)?;
        prev = rec.doc_id;
        if is_alive(rec.doc_id) {
            on_survive(&rec);
            survivors.push(rec);
        } else {
            entries_collected += 1;
            docs_collected += 1;
        }
    }

    let mut new_buf = Vec::new();
    let mut prev_id = 0 as DocId;
    for rec in &survivors {
        let delta = if prev_id == 0 { 0 } else { rec.doc_id - prev_id };
        codec.encode(delta, rec, &mut new_buf);
        prev_id = rec.doc_id;
    }

    let bytes_after = new_buf.len();
    let became_empty = survivors.is_empty();

    block.buf = crate::buffer::Buffer::new();
    block.buf.writer().write(&new_buf);
    block.num_entries = survivors.len() as u16;
    block.first_id = survivors.first().map(|r| r.doc_id).unwrap_or(block.first_id);
    block.last_id = survivors.last().map(|r| r.doc_id).unwrap_or(block.first_id);

    Ok(RepairStats {
        bytes_before_fix: bytes_before,
        bytes_after_fix: bytes_after,
        bytes_collected: bytes_before.saturating_sub(bytes_after),
        docs_collected,
        entries_collected,
        became_empty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inverted_index::Codec;

    fn make_block(ids: &[u64]) -> IndexBlock {
        let codec = Codec::DocIdsOnly;
        let mut block = IndexBlock::new(ids[0]);
        let mut prev = 0u64;
        for &id in ids {
            let delta = id - prev;
            let rec = Posting::doc_id_only(id);
            let mut tmp = Vec::new();
            codec.encode(delta, &rec, &mut tmp);
            block.buf.writer().write(&tmp);
            prev = id;
        }
        block.num_entries = ids.len() as u16;
        block.last_id = *ids.last().unwrap();
        block
    }

    #[test]
    fn repair_drops_dead_docs_and_preserves_survivors() {
        let mut block = make_block(&[1, 2, 3, 4, 5]);
        let dead = [2u64, 4];
        let mut survived = Vec::new();
        let stats = repair_block(&mut block, Codec::DocIdsOnly, |id| !dead.contains(&id), |p| survived.push(p.doc_id)).unwrap();

        assert_eq!(survived, vec![1, 3, 5]);
        assert_eq!(stats.docs_collected, 2);
        assert!(!stats.became_empty);
        assert_eq!(block.num_entries, 3);
        assert_eq!(block.first_id, 1);
        assert_eq!(block.last_id, 5);
    }

    #[test]
    fn repair_reports_empty_block_when_all_dead() {
        let mut block = make_block(&[10, 11, 12]);
        let stats = repair_block(&mut block, Codec::DocIdsOnly, |_| false, |_| {}).unwrap();
        assert!(stats.became_empty);
        assert_eq!(block.num_entries, 0);
    }

    #[test]
    fn surviving_deltas_stay_consistent_after_repair() {
        let mut block = make_block(&[5, 10, 15, 20]);
        repair_block(&mut block, Codec::DocIdsOnly, |id| id != 10, |_| {}).unwrap();

        let mut reader = crate::codec::varint::VarintReader::new(block.buf.as_slice());
        let mut prev = 0u64;
        let mut ids = Vec::new();
        for _ in 0..block.num_entries {
            let rec = Codec::DocIdsOnly.decode(prev, &mut reader).unwrap();
            prev = rec.doc_id;
            ids.push(rec.doc_id);
        }
        assert_eq!(ids, vec![5, 15, 20]);
    }
}
