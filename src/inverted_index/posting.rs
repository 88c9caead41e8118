use crate::codec::qint::{qint_decode, qint_encode};
use crate::codec::varint::{write_varint, VarintReader};
use crate::doctable::DocId;
use crate::error::Result;

/// One decoded record from an inverted index, analogous to `RSIndexResult`
/// for a single-index leaf (aggregate results composed by iterators carry
/// multiple of these as children).
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub doc_id: DocId,
    pub freq: u32,
    pub field_mask: u64,
    pub offsets: Vec<u32>,
    pub numeric_value: Option<f64>,
}

impl Posting {
    pub fn doc_id_only(doc_id: DocId) -> Self {
        Posting { doc_id, freq: 1, field_mask: 0, offsets: Vec::new(), numeric_value: None }
    }

    pub fn numeric(doc_id: DocId, value: f64) -> Self {
        Posting { doc_id, freq: 1, field_mask: 0, offsets: Vec::new(), numeric_value: Some(value) }
    }
}

/// The posting format selected by an index's flags. Each variant encodes
/// and decodes its own delta-prefixed record; `InvertedIndex` dispatches
/// to these rather than carrying function pointers, since the set of
/// formats is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    FullText { freqs: bool, field_mask: bool, offsets: bool },
    Numeric,
    DocIdsOnly,
}

impl Codec {
    /// Encode `record`, given the `delta` from the previous doc-id in the
    /// block (0 for the first record in a block).
    pub fn encode(self, delta: u64, record: &Posting, out: &mut Vec<u8>) {
        match self {
            Codec::DocIdsOnly => {
                write_varint(delta, out);
            }
            Codec::Numeric => {
                // QInt-packs delta/sign+exponent/mantissa-hi/mantissa-lo as
                // its four fields rather than a varint per component, per
                // spec.md's numeric posting format.
                let bits = record.numeric_value.unwrap_or(0.0).to_bits();
                let sign = (bits >> 63) as u32;
                let exponent = ((bits >> 52) & 0x7FF) as u32;
                let mantissa = bits & 0x000F_FFFF_FFFF_FFFF;
                let sign_exp = (sign << 11) | exponent;
                let mantissa_hi = (mantissa >> 32) as u32;
                let mantissa_lo = (mantissa & 0xFFFF_FFFF) as u32;
                let packed = qint_encode(&[delta as u32, sign_exp, mantissa_hi, mantissa_lo])
                    .expect("numeric posting always packs exactly 4 qint fields");
                out.extend_from_slice(&packed);
            }
            Codec::FullText { freqs, field_mask, offsets } => {
                write_varint(delta, out);
                if freqs {
                    write_varint(record.freq as u64, out);
                }
                if field_mask {
                    write_varint(record.field_mask, out);
                }
                if offsets {
                    write_varint(record.offsets.len() as u64, out);
                    let mut prev = 0u32;
                    for &pos in &record.offsets {
                        write_varint((pos - prev) as u64, out);
                        prev = pos;
                    }
                }
            }
        }
    }

    /// Decode one record starting at the reader's current position,
    /// given the previous absolute doc-id (0 before the first record).
    /// Returns the decoded record and its new absolute doc-id.
    pub fn decode(self, prev_doc_id: DocId, reader: &mut VarintReader<'_>) -> Result<Posting> {
        match self {
            Codec::DocIdsOnly => {
                let delta = reader.read()?;
                Ok(Posting::doc_id_only(prev_doc_id + delta))
            }
            Codec::Numeric => {
                let (fields, consumed) = qint_decode(reader.peek_remaining(), 4)?;
                reader.skip(consumed);
                let [delta, sign_exp, mantissa_hi, mantissa_lo] = [fields[0], fields[1], fields[2], fields[3]];
                let sign = (sign_exp >> 11) & 0x1;
                let exponent = sign_exp & 0x7FF;
                let mantissa = ((mantissa_hi as u64) << 32) | (mantissa_lo as u64);
                let bits = ((sign as u64) << 63) | ((exponent as u64) << 52) | mantissa;
                let doc_id = prev_doc_id + delta as u64;
                Ok(Posting::numeric(doc_id, f64::from_bits(bits)))
            }
            Codec::FullText { freqs, field_mask, offsets } => {
                let delta = reader.read()?;
                let doc_id = prev_doc_id + delta;
                let freq = if freqs { reader.read()? as u32 } else { 1 };
                let mask = if field_mask { reader.read()? } else { 0 };
                let offset_vec = if offsets {
                    let n = reader.read()?;
                    let mut v = Vec::with_capacity(n as usize);
                    let mut prev = 0u32;
                    for _ in 0..n {
                        let d = reader.read()? as u32;
                        prev += d;
                        v.push(prev);
                    }
                    v
                } else {
                    Vec::new()
                };
                Ok(Posting { doc_id, freq, field_mask: mask, offsets: offset_vec, numeric_value: None })
            }
        }
    }
}

/// Inverse document frequency, as used by the default (TF-IDF-ish) scorer.
pub fn calculate_idf(total_docs: usize, term_docs: usize) -> f64 {
    let term_docs = if term_docs == 0 { 1 } else { term_docs };
    (1.0 + total_docs as f64 / term_docs as f64).log2()
}

/// IDF as used by BM25 scoring, which can (by design) go negative for
/// terms present in the overwhelming majority of documents.
pub fn calculate_idf_bm25(total_docs: usize, term_docs: usize) -> f64 {
    let total_docs = total_docs as f64;
    let term_docs = term_docs as f64;
    (1.0 + (total_docs - term_docs + 0.5) / (term_docs + 0.5)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_ids_only_round_trips() {
        let codec = Codec::DocIdsOnly;
        let mut bytes = Vec::new();
        codec.encode(5, &Posting::doc_id_only(5), &mut bytes);
        let mut r = VarintReader::new(&bytes);
        let decoded = codec.decode(0, &mut r).unwrap();
        assert_eq!(decoded.doc_id, 5);
    }

    #[test]
    fn full_text_with_offsets_round_trips() {
        let codec = Codec::FullText { freqs: true, field_mask: true, offsets: true };
        let record = Posting { doc_id: 42, freq: 3, field_mask: 0b101, offsets: vec![1, 4, 9], numeric_value: None };
        let mut bytes = Vec::new();
        codec.encode(42, &record, &mut bytes);
        let mut r = VarintReader::new(&bytes);
        let decoded = codec.decode(0, &mut r).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn numeric_round_trips_through_bit_pattern() {
        let codec = Codec::Numeric;
        let record = Posting::numeric(7, 3.5);
        let mut bytes = Vec::new();
        codec.encode(7, &record, &mut bytes);
        let mut r = VarintReader::new(&bytes);
        let decoded = codec.decode(0, &mut r).unwrap();
        assert_eq!(decoded.numeric_value, Some(3.5));
    }

    #[test]
    fn idf_decreases_as_term_becomes_more_common() {
        let rare = calculate_idf(1000, 1);
        let common = calculate_idf(1000, 900);
        assert!(rare > common);
    }

    #[test]
    fn bm25_idf_can_go_negative_for_ubiquitous_terms() {
        let idf = calculate_idf_bm25(1000, 999);
        assert!(idf < 0.0);
    }
}
