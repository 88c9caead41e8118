use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::inverted_index::IndexBlock;

/// One index's repair outcome, as sent by the forked child back to the
/// parent over a pipe.
///
/// Only blocks that existed at fork time (`position < original_block_count`)
/// are ever repaired here -- any block the parent appends after the fork
/// is invisible to the child and must be preserved untouched on commit.
/// `lastblk_num_entries` is the tail block's entry count as the child
/// observed it at fork time; the parent uses this to detect a
/// "last-block denied" race where it appended more entries to that same
/// block after the fork (see `reconcile`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairMessage {
    pub key: Vec<u8>,
    pub original_block_count: usize,
    pub tail_position: usize,
    pub lastblk_num_entries: u16,
    /// `(position, repaired block)` for blocks that lost entries but
    /// stayed non-empty.
    pub repaired: Vec<(usize, IndexBlock)>,
    /// Positions (< `original_block_count`) whose block lost every entry
    /// and should be dropped entirely.
    pub deleted_positions: Vec<usize>,
    pub bytes_collected: usize,
    pub docs_collected: usize,
}

/// One category's message stream, terminated by a `CategoryDone`
/// sentinel, matching the "terms, then numeric, then tags" framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Term,
    Numeric,
    Tag,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GcWireMessage {
    Repair(Category, RepairMessage),
    CategoryDone(Category),
}

pub fn write_message(writer: &mut impl Write, msg: &GcWireMessage) -> io::Result<()> {
    let bytes = bincode::serialize(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(&bytes)?;
    Ok(())
}

/// Reads one framed message, or `None` on a clean EOF (child closed the
/// pipe -- treated as "no more messages", distinct from a broken pipe
/// mid-frame, which surfaces as an `Err`).
pub fn read_message(reader: &mut impl Read) -> io::Result<Option<GcWireMessage>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    let msg = bincode::deserialize(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(key: &[u8]) -> RepairMessage {
        RepairMessage {
            key: key.to_vec(),
            original_block_count: 2,
            tail_position: 1,
            lastblk_num_entries: 3,
            repaired: vec![(0, IndexBlock::new(1))],
            deleted_positions: vec![],
            bytes_collected: 10,
            docs_collected: 2,
        }
    }

    #[test]
    fn round_trips_through_an_in_memory_pipe() {
        let msg = GcWireMessage::Repair(Category::Term, sample(b"hello"));
        let mut buf = Vec::new();
        write_message(&mut buf, &msg).unwrap();
        write_message(&mut buf, &GcWireMessage::CategoryDone(Category::Term)).unwrap();

        let mut cursor = io::Cursor::new(buf);
        let first = read_message(&mut cursor).unwrap().unwrap();
        match first {
            GcWireMessage::Repair(cat, rm) => {
                assert_eq!(cat, Category::Term);
                assert_eq!(rm.key, b"hello");
            }
            _ => panic!("expected Repair"),
        }
        let second = read_message(&mut cursor).unwrap().unwrap();
        assert!(matches!(second, GcWireMessage::CategoryDone(Category::Term)));
        assert!(read_message(&mut cursor).unwrap().is_none());
    }
}
