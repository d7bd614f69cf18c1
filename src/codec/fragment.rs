//! Compressed fragment file
//!
//! Layout:
//! - magic `FDXC`, format version (u8)
//! - term count (vbyte)
//! - per term: term length + utf8 bytes, then the doc id, frequency and
//!   position streams, each prefixed by its vbyte length
//! - crc32 of every preceding byte (u32 little endian)

use std::collections::BTreeMap;

use crc32fast::Hasher;

use super::postings::{decode_vbyte, encode_vbyte, CompressedPostings};
use crate::error::{FragdexError, Result};
use crate::index::InvertedIndex;

/// Leading bytes of a compressed fragment
pub const FRAGMENT_MAGIC: &[u8; 4] = b"FDXC";

/// Current fragment format version
pub const FRAGMENT_VERSION: u8 = 1;

/// Whether `bytes` starts like a compressed fragment
pub fn is_compressed_fragment(bytes: &[u8]) -> bool {
    bytes.starts_with(FRAGMENT_MAGIC)
}

/// A whole index with every postings list compressed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompressedIndex {
    terms: BTreeMap<String, CompressedPostings>,
}

impl CompressedIndex {
    pub fn from_index(index: &InvertedIndex) -> Result<Self> {
        let mut terms = BTreeMap::new();
        for (term, list) in index.iter() {
            terms.insert(term.to_string(), CompressedPostings::compress(list)?);
        }
        Ok(Self { terms })
    }

    pub fn to_index(&self) -> Result<InvertedIndex> {
        let mut index = InvertedIndex::new();
        for (term, compressed) in &self.terms {
            index.set_postings(term.clone(), compressed.decompress()?);
        }
        Ok(index)
    }

    pub fn get(&self, term: &str) -> Option<&CompressedPostings> {
        self.terms.get(term)
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Sum of all stream sizes, excluding framing
    pub fn payload_len(&self) -> usize {
        self.terms.values().map(CompressedPostings::encoded_len).sum()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload_len() + 16);
        out.extend_from_slice(FRAGMENT_MAGIC);
        out.push(FRAGMENT_VERSION);
        encode_vbyte(self.terms.len() as u64, &mut out);

        for (term, postings) in &self.terms {
            write_section(&mut out, term.as_bytes());
            write_section(&mut out, &postings.doc_ids);
            write_section(&mut out, &postings.frequencies);
            write_section(&mut out, &postings.positions);
        }

        let mut hasher = Hasher::new();
        hasher.update(&out);
        let crc = hasher.finalize();
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    /// Parse a fragment; `location` names it in error messages
    pub fn from_bytes(bytes: &[u8], location: &str) -> Result<Self> {
        let corrupt = |reason: String| FragdexError::corrupt(location, 0, reason);

        if !is_compressed_fragment(bytes) {
            return Err(corrupt("missing FDXC magic".to_string()));
        }
        if bytes.len() < FRAGMENT_MAGIC.len() + 1 + 4 {
            return Err(corrupt("fragment too short".to_string()));
        }

        let (body, crc_bytes) = bytes.split_at(bytes.len() - 4);
        let mut stored = [0u8; 4];
        stored.copy_from_slice(crc_bytes);
        let stored_crc = u32::from_le_bytes(stored);
        let mut hasher = Hasher::new();
        hasher.update(body);
        if hasher.finalize() != stored_crc {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        let version = body[FRAGMENT_MAGIC.len()];
        if version != FRAGMENT_VERSION {
            return Err(corrupt(format!("unsupported fragment version {}", version)));
        }

        let mut pos = FRAGMENT_MAGIC.len() + 1;
        let term_count = decode_vbyte(body, &mut pos).map_err(|e| relocate(e, location))?;

        let mut terms = BTreeMap::new();
        for _ in 0..term_count {
            let term_bytes = read_section(body, &mut pos, location)?;
            let term = String::from_utf8(term_bytes.to_vec())
                .map_err(|_| corrupt("term is not valid utf-8".to_string()))?;
            let postings = CompressedPostings {
                doc_ids: read_section(body, &mut pos, location)?.to_vec(),
                frequencies: read_section(body, &mut pos, location)?.to_vec(),
                positions: read_section(body, &mut pos, location)?.to_vec(),
            };
            if terms.insert(term.clone(), postings).is_some() {
                return Err(corrupt(format!("term '{}' appears twice", term)));
            }
        }

        if pos != body.len() {
            return Err(corrupt("trailing bytes after last term".to_string()));
        }
        Ok(Self { terms })
    }

    /// Decode a fragment straight into an index, naming `location` on failure
    pub fn decode_index(bytes: &[u8], location: &str) -> Result<InvertedIndex> {
        Self::from_bytes(bytes, location)?
            .to_index()
            .map_err(|e| relocate(e, location))
    }
}

fn write_section(out: &mut Vec<u8>, data: &[u8]) {
    encode_vbyte(data.len() as u64, out);
    out.extend_from_slice(data);
}

fn read_section<'a>(body: &'a [u8], pos: &mut usize, location: &str) -> Result<&'a [u8]> {
    let len = decode_vbyte(body, pos).map_err(|e| relocate(e, location))?;
    let remaining = (body.len() - *pos) as u64;
    if len > remaining {
        return Err(FragdexError::corrupt(
            location,
            0,
            format!("section of {} bytes exceeds remaining {}", len, remaining),
        ));
    }
    let start = *pos;
    *pos += len as usize;
    Ok(&body[start..*pos])
}

/// Attach the fragment name to codec-level corruption errors
fn relocate(err: FragdexError, location: &str) -> FragdexError {
    match err {
        FragdexError::CorruptIndexFormat { line, reason, .. } => FragdexError::CorruptIndexFormat {
            location: location.to_string(),
            line,
            reason,
        },
        other => other,
    }
}
