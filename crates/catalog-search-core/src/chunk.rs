//! Sliding-window document chunker.
//!
//! Long-form documents are split into overlapping windows of `chunk_size`
//! characters, with `chunk_overlap` characters shared by consecutive
//! windows. Each window becomes its own item whose `source_id` is
//! `<documentId>_chunk_<index>`.
//!
//! # Algorithm
//!
//! 1. Start at character 0.
//! 2. Emit `text[start .. min(start + size, len)]`.
//! 3. Stop once a window reaches the end of the text (the final partial
//!    window is always emitted, never overrun).
//! 4. Otherwise step back by `overlap` from the window end. If that would
//!    not move past the previous start (`overlap >= size`), continue from
//!    the window end instead.
//!
//! Positions are in characters, so multi-byte text never splits a code point.
//!
//! # Example
//!
//! ```rust
//! use catalog_search_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("abcdefghij", 4, 2);
//! assert_eq!(chunks, vec!["abcd", "cdef", "efgh", "ghij"]);
//! ```

const CHUNK_MARKER: &str = "_chunk_";

/// One window of a chunked document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub index: usize,
    pub source_id: String,
    pub text: String,
}

/// Split `text` into overlapping character windows.
///
/// Empty input yields no chunks. A `chunk_size` of 0 is treated as 1.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let size = chunk_size.max(1);

    // Byte offset of every char boundary, plus the end of the string.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let len = bounds.len();
    if len == 0 {
        return Vec::new();
    }
    bounds.push(text.len());

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + size).min(len);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        if end == len {
            break;
        }
        let next = end.saturating_sub(chunk_overlap);
        start = if next <= start { end } else { next };
    }
    chunks
}

/// Chunk a document and assign chunk source ids.
pub fn chunk_document(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<DocumentChunk> {
    chunk_text(text, chunk_size, chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(index, text)| DocumentChunk {
            index,
            source_id: chunk_source_id(document_id, index),
            text,
        })
        .collect()
}

/// `<documentId>_chunk_<index>`
pub fn chunk_source_id(document_id: &str, index: usize) -> String {
    format!("{}{}{}", document_id, CHUNK_MARKER, index)
}

/// Prefix shared by every chunk of `document_id`.
pub fn chunk_source_prefix(document_id: &str) -> String {
    format!("{}{}", document_id, CHUNK_MARKER)
}

/// Split a chunk source id back into `(document_id, index)`.
pub fn parse_chunk_source_id(source_id: &str) -> Option<(&str, usize)> {
    let pos = source_id.rfind(CHUNK_MARKER)?;
    let index = source_id[pos + CHUNK_MARKER.len()..].parse().ok()?;
    Some((&source_id[..pos], index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_windows() {
        assert_eq!(
            chunk_text("abcdefghij", 4, 2),
            vec!["abcd", "cdef", "efgh", "ghij"]
        );
    }

    #[test]
    fn test_final_partial_chunk_included() {
        assert_eq!(chunk_text("abcdefg", 3, 0), vec!["abc", "def", "g"]);
        assert_eq!(chunk_text("abcdefghi", 4, 1), vec!["abcd", "defg", "ghi"]);
    }

    #[test]
    fn test_overlap_equal_to_size_terminates() {
        let chunks = chunk_text("abcdefghij", 4, 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_overlap_larger_than_size_terminates() {
        let chunks = chunk_text("abcdefghij", 3, 10);
        assert_eq!(chunks, vec!["abc", "def", "ghi", "j"]);
    }

    #[test]
    fn test_short_text_single_chunk() {
        assert_eq!(chunk_text("abc", 10, 2), vec!["abc"]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("", 10, 2).is_empty());
    }

    #[test]
    fn test_zero_size_treated_as_one() {
        assert_eq!(chunk_text("abc", 0, 0), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_multibyte_characters() {
        let chunks = chunk_text("월별매출지역", 4, 2);
        assert_eq!(chunks, vec!["월별매출", "매출지역"]);
    }

    #[test]
    fn test_chunk_document_ids() {
        let chunks = chunk_document("doc-7", "abcdefghij", 4, 2);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].source_id, "doc-7_chunk_0");
        assert_eq!(chunks[3].source_id, "doc-7_chunk_3");
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn test_parse_chunk_source_id() {
        assert_eq!(parse_chunk_source_id("doc-7_chunk_12"), Some(("doc-7", 12)));
        assert_eq!(parse_chunk_source_id("a_chunk_b_chunk_3"), Some(("a_chunk_b", 3)));
        assert_eq!(parse_chunk_source_id("doc-7"), None);
        assert_eq!(parse_chunk_source_id("doc_chunk_x"), None);
        assert!(chunk_source_id("d", 0).starts_with(&chunk_source_prefix("d")));
    }
}
