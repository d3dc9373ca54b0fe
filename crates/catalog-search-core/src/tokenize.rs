//! Text normalization shared by indexing and querying.
//!
//! The same [`tokenize`] runs over item content when it is stored and over
//! the query string at search time. BM25 only finds matches because both
//! sides go through identical normalization.
//!
//! # Algorithm
//!
//! 1. Lowercase the input.
//! 2. Replace every character that is not a Unicode alphanumeric or `_` with
//!    whitespace (Hangul, CJK and accented Latin letters survive).
//! 3. Split on whitespace runs.
//! 4. Drop tokens of one character or fewer.
//!
//! No stemming and no stop-word removal.

use sha2::{Digest, Sha256};

/// Split `text` into normalized tokens, preserving order and duplicates.
///
/// ```rust
/// use catalog_search_core::tokenize::tokenize;
///
/// assert_eq!(tokenize("Find INACTIVE users!"), vec!["find", "inactive", "users"]);
/// assert_eq!(tokenize("a b cd"), vec!["cd"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| if is_word_char(c) { c } else { ' ' })
        .collect();

    normalized
        .split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Fingerprint `text` for change detection.
///
/// Hex-encoded SHA-256. Only equality matters; this is never used for
/// anything security related.
pub fn hash_content(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
