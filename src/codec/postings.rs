//! Delta + variable-byte compression for postings lists
//!
//! Document ids are stored as gaps from the previous id. Each gap is written
//! as 7-bit groups, least significant first; the final byte of a number has
//! its high bit set, so the stream needs no length table.

use serde::{Deserialize, Serialize};

use crate::error::{FragdexError, Result};
use crate::index::{DocumentId, Posting, PostingsList};

const CODEC_LOCATION: &str = "compressed postings";

/// Variable-byte encode one integer
pub fn encode_vbyte(value: u64, output: &mut Vec<u8>) {
    let mut v = value;
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            output.push(byte | 0x80); // Set high bit to indicate last byte
            break;
        } else {
            output.push(byte);
        }
    }
}

/// Decode one variable-byte integer starting at `pos`, advancing it
pub fn decode_vbyte(input: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;

    loop {
        let Some(&byte) = input.get(*pos) else {
            return Err(FragdexError::corrupt(
                CODEC_LOCATION,
                0,
                "unexpected end of vbyte stream",
            ));
        };
        *pos += 1;

        let group = (byte & 0x7F) as u64;
        if (shift == 63 && group > 1) || shift > 63 {
            return Err(FragdexError::corrupt(
                CODEC_LOCATION,
                0,
                "vbyte value exceeds 64 bits",
            ));
        }
        result |= group << shift;

        if byte & 0x80 != 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Decode every integer in `input`
pub fn decode_vbyte_stream(input: &[u8]) -> Result<Vec<u64>> {
    let mut values = Vec::new();
    let mut pos = 0;
    while pos < input.len() {
        values.push(decode_vbyte(input, &mut pos)?);
    }
    Ok(values)
}

/// First value unchanged, then successive differences.
///
/// The input must be strictly increasing; callers deduplicate first.
pub fn delta_encode(values: &[u64]) -> Result<Vec<u64>> {
    let mut deltas = Vec::with_capacity(values.len());
    let mut previous: Option<u64> = None;
    for (index, &value) in values.iter().enumerate() {
        match previous {
            None => deltas.push(value),
            Some(prev) if value > prev => deltas.push(value - prev),
            Some(prev) => {
                return Err(FragdexError::EncodingPrecondition {
                    index,
                    previous: prev,
                    value,
                })
            }
        }
        previous = Some(value);
    }
    Ok(deltas)
}

/// Undo `delta_encode` with running prefix sums
pub fn delta_decode(deltas: &[u64]) -> Result<Vec<u64>> {
    let mut values = Vec::with_capacity(deltas.len());
    let mut acc: u64 = 0;
    for (i, &delta) in deltas.iter().enumerate() {
        acc = if i == 0 {
            delta
        } else {
            acc.checked_add(delta).ok_or_else(|| {
                FragdexError::corrupt(CODEC_LOCATION, 0, "delta sum overflows u64")
            })?
        };
        values.push(acc);
    }
    Ok(values)
}

/// Compress a strictly increasing id sequence
pub fn encode_doc_ids(doc_ids: &[u64]) -> Result<Vec<u8>> {
    let deltas = delta_encode(doc_ids)?;
    let mut output = Vec::with_capacity(deltas.len());
    for delta in deltas {
        encode_vbyte(delta, &mut output);
    }
    Ok(output)
}

/// Restore the exact sequence written by `encode_doc_ids`
pub fn decode_doc_ids(bytes: &[u8]) -> Result<Vec<u64>> {
    let deltas = decode_vbyte_stream(bytes)?;
    delta_decode(&deltas)
}

/// One postings list in compressed form.
///
/// Three vbyte streams share the document order of `doc_ids`:
/// - `doc_ids`: delta-encoded document ids
/// - `frequencies`: term frequency per document
/// - `positions`: per document, its positions delta-encoded
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedPostings {
    pub doc_ids: Vec<u8>,
    pub frequencies: Vec<u8>,
    pub positions: Vec<u8>,
}

impl CompressedPostings {
    pub fn compress(list: &PostingsList) -> Result<Self> {
        let ids = list.doc_ids();
        let doc_ids = encode_doc_ids(&ids)?;

        let mut frequencies = Vec::with_capacity(ids.len());
        let mut positions = Vec::new();
        for posting in list {
            encode_vbyte(posting.term_frequency() as u64, &mut frequencies);
            let pos: Vec<u64> = posting.positions().iter().map(|&p| p as u64).collect();
            for delta in delta_encode(&pos)? {
                encode_vbyte(delta, &mut positions);
            }
        }

        Ok(Self {
            doc_ids,
            frequencies,
            positions,
        })
    }

    /// Decode only the document ids
    pub fn doc_ids(&self) -> Result<Vec<DocumentId>> {
        decode_doc_ids(&self.doc_ids)
    }

    pub fn decompress(&self) -> Result<PostingsList> {
        let ids = self.doc_ids()?;
        let freqs = decode_vbyte_stream(&self.frequencies)?;
        if freqs.len() != ids.len() {
            return Err(FragdexError::corrupt(
                CODEC_LOCATION,
                0,
                format!(
                    "{} document ids but {} frequencies",
                    ids.len(),
                    freqs.len()
                ),
            ));
        }

        let mut list = PostingsList::new();
        let mut cursor = 0;
        for (doc_id, tf) in ids.into_iter().zip(freqs) {
            // Every position takes at least one byte.
            if tf > (self.positions.len() - cursor) as u64 {
                return Err(FragdexError::corrupt(
                    CODEC_LOCATION,
                    0,
                    format!("document {} claims {} positions", doc_id, tf),
                ));
            }
            let mut deltas = Vec::with_capacity(tf as usize);
            for _ in 0..tf {
                deltas.push(decode_vbyte(&self.positions, &mut cursor)?);
            }
            let mut positions = Vec::with_capacity(deltas.len());
            for value in delta_decode(&deltas)? {
                let pos = u32::try_from(value).map_err(|_| {
                    FragdexError::corrupt(CODEC_LOCATION, 0, "position exceeds u32")
                })?;
                positions.push(pos);
            }
            if positions.windows(2).any(|w| w[0] >= w[1]) {
                return Err(FragdexError::corrupt(
                    CODEC_LOCATION,
                    0,
                    format!("positions of document {} are not ascending", doc_id),
                ));
            }
            list.insert(Posting::with_positions(doc_id, positions));
        }

        if cursor != self.positions.len() {
            return Err(FragdexError::corrupt(
                CODEC_LOCATION,
                0,
                "trailing bytes in position stream",
            ));
        }
        Ok(list)
    }

    /// Total encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        self.doc_ids.len() + self.frequencies.len() + self.positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_vbyte_marks_last_byte() {
        let mut out = Vec::new();
        encode_vbyte(0, &mut out);
        assert_eq!(out, vec![0x80]);

        out.clear();
        encode_vbyte(127, &mut out);
        assert_eq!(out, vec![0xFF]);

        out.clear();
        encode_vbyte(128, &mut out);
        assert_eq!(out, vec![0x00, 0x81]);

        out.clear();
        encode_vbyte(300, &mut out);
        // 300 = 0b10_0101100: low group 44, high group 2
        assert_eq!(out, vec![44, 2 | 0x80]);
    }

    #[test]
    fn test_dedup_then_encode_scenario() {
        let mut ids = vec![5u64, 12, 12, 20];
        ids.dedup();
        assert_eq!(delta_encode(&ids).unwrap(), vec![5, 7, 8]);

        let bytes = encode_doc_ids(&ids).unwrap();
        assert_eq!(bytes, vec![0x85, 0x87, 0x88]);
        assert_eq!(decode_doc_ids(&bytes).unwrap(), vec![5, 12, 20]);
    }

    #[test]
    fn test_precondition_violations() {
        match encode_doc_ids(&[5, 12, 12, 20]) {
            Err(FragdexError::EncodingPrecondition {
                index,
                previous,
                value,
            }) => {
                assert_eq!((index, previous, value), (2, 12, 12));
            }
            other => panic!("expected precondition error, got {:?}", other),
        }
        assert!(matches!(
            delta_encode(&[9, 3]),
            Err(FragdexError::EncodingPrecondition { index: 1, .. })
        ));
    }

    #[test]
    fn test_edge_sequences() {
        for seq in [vec![], vec![0], vec![u64::MAX], vec![0, u64::MAX], vec![1, 2, 3]] {
            let bytes = encode_doc_ids(&seq).unwrap();
            assert_eq!(decode_doc_ids(&bytes).unwrap(), seq);
        }
        assert!(encode_doc_ids(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_and_oversized_input() {
        // Continuation byte without a terminator
        assert!(matches!(
            decode_doc_ids(&[0x05]),
            Err(FragdexError::CorruptIndexFormat { .. })
        ));

        // Eleven groups cannot fit in a u64
        let mut too_wide = vec![0x7F; 10];
        too_wide.push(0x81);
        assert!(decode_doc_ids(&too_wide).is_err());

        // Two maximal values overflow the running sum
        let mut bytes = Vec::new();
        encode_vbyte(u64::MAX, &mut bytes);
        encode_vbyte(1, &mut bytes);
        assert!(decode_doc_ids(&bytes).is_err());
    }

    #[test]
    fn test_compressed_postings_roundtrip() {
        let mut list = PostingsList::new();
        list.insert(Posting::with_positions(3, vec![0, 4, 9]));
        list.insert(Posting::with_positions(1000, vec![2]));
        list.insert(Posting::with_positions(70_000, vec![1, 300]));

        let compressed = CompressedPostings::compress(&list).unwrap();
        assert_eq!(compressed.doc_ids().unwrap(), vec![3, 1000, 70_000]);
        assert_eq!(compressed.decompress().unwrap(), list);
        assert!(compressed.encoded_len() > 0);
    }

    #[test]
    fn test_mismatched_streams_detected() {
        let mut list = PostingsList::new();
        list.insert(Posting::with_positions(1, vec![0, 1]));
        let mut compressed = CompressedPostings::compress(&list).unwrap();
        compressed.positions.pop();
        assert!(compressed.decompress().is_err());

        let mut compressed = CompressedPostings::compress(&list).unwrap();
        compressed.frequencies.clear();
        assert!(compressed.decompress().is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_random_sequences(raw in proptest::collection::btree_set(any::<u64>(), 0..200)) {
            let seq: Vec<u64> = raw.into_iter().collect();
            let bytes = encode_doc_ids(&seq).unwrap();
            prop_assert_eq!(decode_doc_ids(&bytes).unwrap(), seq);
        }

        #[test]
        fn roundtrip_large_gaps(start in 0u64..1_000, gaps in proptest::collection::vec(1u64..(1 << 40), 0..50)) {
            let mut seq = vec![start];
            for gap in gaps {
                let next = seq.last().unwrap().saturating_add(gap);
                if next == *seq.last().unwrap() {
                    break;
                }
                seq.push(next);
            }
            let bytes = encode_doc_ids(&seq).unwrap();
            prop_assert_eq!(decode_doc_ids(&bytes).unwrap(), seq);
        }
    }
}
