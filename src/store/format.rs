//! Plain-text index format
//!
//! One line per term, terms and documents ascending:
//!
//! ```text
//! term:Doc <id> -> [p1, p2, ...]; Doc <id> -> [...]
//! ```
//!
//! The parser accepts an optional space after `:` and a trailing `;`, and
//! skips blank lines.

use std::collections::HashSet;
use std::fmt::Write;

use crate::error::{FragdexError, Result};
use crate::index::{DocumentId, InvertedIndex, Position, Posting, PostingsList};

const DOC_PREFIX: &str = "Doc ";
const ARROW: &str = "->";

/// Characters a persisted term may not contain
fn term_is_writable(term: &str) -> bool {
    !term.is_empty() && !term.contains([':', ';', '\n', '\r'])
}

/// Render a single term line without the trailing newline
pub fn format_term_line(term: &str, list: &PostingsList) -> Result<String> {
    if !term_is_writable(term) {
        return Err(FragdexError::InvalidTerm(term.to_string()));
    }

    let mut line = String::with_capacity(term.len() + list.len() * 16);
    line.push_str(term);
    line.push(':');
    for (i, posting) in list.iter().enumerate() {
        if i > 0 {
            line.push_str("; ");
        }
        let _ = write!(line, "{}{} {} [", DOC_PREFIX, posting.doc_id, ARROW);
        for (j, pos) in posting.positions().iter().enumerate() {
            if j > 0 {
                line.push_str(", ");
            }
            let _ = write!(line, "{}", pos);
        }
        line.push(']');
    }
    Ok(line)
}

/// Serialize a whole index
pub fn serialize_index(index: &InvertedIndex) -> Result<String> {
    let mut out = String::new();
    for (term, list) in index.iter() {
        out.push_str(&format_term_line(term, list)?);
        out.push('\n');
    }
    Ok(out)
}

/// Parse a whole text index; `location` names the source in errors
pub fn parse_index(text: &str, location: &str) -> Result<InvertedIndex> {
    let mut index = InvertedIndex::new();
    let mut seen_terms: HashSet<String> = HashSet::new();

    for (n, raw) in text.lines().enumerate() {
        let line_no = n + 1;
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let (term, list) = parse_term_line(line, location, line_no)?;
        if !seen_terms.insert(term.clone()) {
            return Err(FragdexError::corrupt(
                location,
                line_no,
                format!("term '{}' appears on more than one line", term),
            ));
        }
        index.set_postings(term, list);
    }

    Ok(index)
}

/// Parse one `term:Doc ...` line
pub fn parse_term_line(line: &str, location: &str, line_no: usize) -> Result<(String, PostingsList)> {
    let corrupt = |reason: String| FragdexError::corrupt(location, line_no, reason);

    let (term, rest) = line
        .split_once(':')
        .ok_or_else(|| corrupt("missing ':' after term".to_string()))?;
    if term.is_empty() {
        return Err(corrupt("empty term".to_string()));
    }
    let rest = rest.strip_prefix(' ').unwrap_or(rest);

    let mut list = PostingsList::new();
    for entry in rest.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            // trailing ';' or a term with no postings
            continue;
        }
        let posting = parse_entry(entry).map_err(corrupt)?;
        if list.contains(posting.doc_id) {
            return Err(corrupt(format!(
                "document {} listed twice for term '{}'",
                posting.doc_id, term
            )));
        }
        list.insert(posting);
    }

    Ok((term.to_string(), list))
}

/// `Doc <id> -> [p1, p2]`
fn parse_entry(entry: &str) -> std::result::Result<Posting, String> {
    let body = entry
        .strip_prefix(DOC_PREFIX)
        .ok_or_else(|| format!("expected 'Doc ' at '{}'", entry))?;
    let (id_part, positions_part) = body
        .split_once(ARROW)
        .ok_or_else(|| format!("missing '->' in '{}'", entry))?;

    let doc_id: DocumentId = id_part
        .trim()
        .parse()
        .map_err(|_| format!("invalid document id '{}'", id_part.trim()))?;

    let list = positions_part.trim();
    let inner = list
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| format!("positions of document {} are not bracketed", doc_id))?;

    let mut positions: Vec<Position> = Vec::new();
    for piece in inner.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let pos: Position = piece
            .parse()
            .map_err(|_| format!("invalid position '{}' in document {}", piece, doc_id))?;
        if positions.last().is_some_and(|&last| last >= pos) {
            return Err(format!("positions of document {} are not ascending", doc_id));
        }
        positions.push(pos);
    }

    Ok(Posting::with_positions(doc_id, positions))
}
