//! On-disk format for a single inverted index: a varint header followed
//! by each non-empty block, length-prefixed. Used by the host's RDB-style
//! snapshot machinery; this crate only owns the byte layout, not when or
//! where a host decides to call it.

use crate::codec::varint::{decode_varint, encode_varint, VarintReader};
use crate::doctable::DocId;
use crate::error::{CoreError, Result};
use crate::inverted_index::{IndexBlock, IndexFlags, InvertedIndex};

/// Bumped whenever the on-disk layout changes in a way that isn't
/// self-describing from the flags alone. Encodings below the current
/// version are read through a back-compat shim rather than rejected.
pub const INVERTED_INDEX_ENCVER: u32 = 2;

/// The encoding version before per-entry frequencies were stored. Readers
/// of this version force-enable `StoreFreqs` on the decoded flags, since
/// every record implicitly carried frequency 1.
const ENCVER_PRE_FREQUENCIES: u32 = 1;

pub fn encode(idx: &InvertedIndex) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(encode_varint(INVERTED_INDEX_ENCVER as u64));
    out.extend(encode_varint(idx.flags.bits() as u64));
    out.extend(encode_varint(idx.last_id()));
    out.extend(encode_varint(idx.num_docs() as u64));

    let non_empty: Vec<&IndexBlock> = idx.blocks().iter().filter(|b| !b.is_empty()).collect();
    out.extend(encode_varint(non_empty.len() as u64));

    for block in non_empty {
        out.extend(encode_varint(block.first_id));
        out.extend(encode_varint(block.last_id));
        out.extend(encode_varint(block.num_entries as u64));
        let bytes = block.buf.as_slice();
        out.extend(encode_varint(bytes.len() as u64));
        out.extend_from_slice(bytes);
    }
    out
}

pub fn decode(bytes: &[u8], multi_value: bool) -> Result<InvertedIndex> {
    let mut reader = VarintReader::new(bytes);
    let encver = reader.read()? as u32;
    if encver > INVERTED_INDEX_ENCVER {
        return Err(CoreError::Unsupported(format!("inverted index encver {encver} is newer than this build supports")));
    }

    let mut flags = IndexFlags::from_bits(reader.read()? as u16);
    if encver <= ENCVER_PRE_FREQUENCIES {
        flags = flags | IndexFlags::STORE_FREQS;
    }

    let last_id: DocId = reader.read()?;
    let num_docs = reader.read()? as u32;
    let num_blocks = reader.read()?;

    let mut blocks = Vec::with_capacity(num_blocks as usize);
    for _ in 0..num_blocks {
        let first_id: DocId = reader.read()?;
        let block_last_id: DocId = reader.read()?;
        let num_entries = reader.read()? as u16;
        let byte_len = reader.read()? as usize;
        let raw = reader.read_bytes(byte_len)?;

        let mut block = IndexBlock::new(first_id);
        block.last_id = block_last_id;
        block.num_entries = num_entries;
        block.buf.writer().write(raw);
        blocks.push(block);
    }

    InvertedIndex::restore(flags, multi_value, blocks, last_id, num_docs)
}

/// Reads just the header (flags/lastId/numDocs/numBlocks), without
/// decoding any block bytes -- used by introspection tooling that only
/// needs the summary counters.
pub struct Header {
    pub encver: u32,
    pub flags: IndexFlags,
    pub last_id: DocId,
    pub num_docs: u32,
    pub num_blocks: u64,
}

pub fn read_header(bytes: &[u8]) -> Result<Header> {
    let (encver, mut pos) = decode_varint(bytes)?;
    let (flags_bits, n) = decode_varint(&bytes[pos..])?;
    pos += n;
    let (last_id, n) = decode_varint(&bytes[pos..])?;
    pos += n;
    let (num_docs, n) = decode_varint(&bytes[pos..])?;
    pos += n;
    let (num_blocks, _) = decode_varint(&bytes[pos..])?;

    let mut flags = IndexFlags::from_bits(flags_bits as u16);
    if (encver as u32) <= ENCVER_PRE_FREQUENCIES {
        flags = flags | IndexFlags::STORE_FREQS;
    }

    Ok(Header { encver: encver as u32, flags, last_id, num_docs: num_docs as u32, num_blocks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inverted_index::Posting;

    #[test]
    fn round_trips_a_populated_index() {
        let mut idx = InvertedIndex::new(IndexFlags::STORE_FREQS | IndexFlags::STORE_FIELD_MASK, false);
        for id in [1u64, 5, 9] {
            idx.write_entry(id, &Posting { doc_id: id, freq: 2, field_mask: 0b1, offsets: vec![], numeric_value: None }).unwrap();
        }

        let bytes = encode(&idx);
        let restored = decode(&bytes, false).unwrap();
        assert_eq!(restored.last_id(), idx.last_id());
        assert_eq!(restored.num_docs(), idx.num_docs());
        assert_eq!(restored.scan().unwrap(), idx.scan().unwrap());
    }

    #[test]
    fn empty_blocks_are_dropped_on_encode() {
        let idx = InvertedIndex::new(IndexFlags::DOCIDS_ONLY, false);
        let bytes = encode(&idx);
        let restored = decode(&bytes, false).unwrap();
        assert_eq!(restored.num_blocks(), 0);
    }

    #[test]
    fn header_reads_without_decoding_blocks() {
        let mut idx = InvertedIndex::new(IndexFlags::DOCIDS_ONLY, false);
        for id in 1..=3u64 {
            idx.write_entry(id, &Posting::doc_id_only(id)).unwrap();
        }
        let bytes = encode(&idx);
        let header = read_header(&bytes).unwrap();
        assert_eq!(header.last_id, 3);
        assert_eq!(header.num_docs, 3);
        assert_eq!(header.num_blocks, 1);
    }

    #[test]
    fn newer_encver_than_supported_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend(encode_varint((INVERTED_INDEX_ENCVER + 1) as u64));
        bytes.extend(encode_varint(0));
        bytes.extend(encode_varint(0));
        bytes.extend(encode_varint(0));
        bytes.extend(encode_varint(0));
        assert!(decode(&bytes, false).is_err());
    }
}
