//! BM25 sparse scorer over cached item tokens.
//!
//! Corpus statistics (document count, average length, document frequency)
//! are rebuilt from the supplied corpus on every call. Nothing is cached
//! between requests, so concurrent writes can never leave stale statistics
//! behind. [`rank`] is the public contract; the statistics structure behind
//! it can be swapped for an inverted index without touching callers.
//!
//! # Scoring
//!
//! For each distinct query term `t` that occurs in item `d`:
//!
//! ```text
//! idf(t)  = ln((N - df(t) + 0.5) / (df(t) + 0.5) + 1)
//! tf(t,d) = f * (k1 + 1) / (f + k1 * (1 - b + b * |d| / avgdl))
//! score   = Σ idf(t) * tf(t,d)
//! ```
//!
//! `idf` is not clamped.

use std::collections::{HashMap, HashSet};

use crate::models::IndexItem;

pub const DEFAULT_K1: f64 = 1.5;
pub const DEFAULT_B: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
        }
    }
}

/// Statistics over one filtered corpus.
#[derive(Debug, Clone)]
pub struct CorpusStats {
    pub doc_count: usize,
    pub avg_doc_len: f64,
    doc_freq: HashMap<String, usize>,
}

impl CorpusStats {
    /// Build statistics from token sequences. Each distinct term counts
    /// once per document toward its document frequency.
    pub fn from_token_lists<'a, I>(docs: I) -> Self
    where
        I: IntoIterator<Item = &'a [String]>,
    {
        let mut doc_count = 0usize;
        let mut total_len = 0usize;
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for tokens in docs {
            doc_count += 1;
            total_len += tokens.len();
            let distinct: HashSet<&String> = tokens.iter().collect();
            for term in distinct {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let avg_doc_len = if doc_count == 0 {
            0.0
        } else {
            total_len as f64 / doc_count as f64
        };

        Self {
            doc_count,
            avg_doc_len,
            doc_freq,
        }
    }

    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freq.get(term).copied().unwrap_or(0)
    }

    pub fn idf(&self, term: &str) -> f64 {
        let n = self.doc_count as f64;
        let df = self.doc_freq(term) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }
}

/// A scored sparse hit. `matched_terms` counts distinct query terms found.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseHit {
    pub item_id: String,
    pub score: f64,
    pub matched_terms: usize,
}

/// Score one token sequence against a (de-duplicated) query term list.
///
/// Returns the accumulated score and how many query terms occurred.
pub fn score_tokens(
    query_terms: &[&str],
    doc_tokens: &[String],
    stats: &CorpusStats,
    params: Bm25Params,
) -> (f64, usize) {
    if doc_tokens.is_empty() || stats.avg_doc_len <= 0.0 {
        return (0.0, 0);
    }

    let mut freqs: HashMap<&str, usize> = HashMap::new();
    for t in doc_tokens {
        *freqs.entry(t.as_str()).or_insert(0) += 1;
    }

    let doc_len = doc_tokens.len() as f64;
    let norm = 1.0 - params.b + params.b * (doc_len / stats.avg_doc_len);

    let mut score = 0.0;
    let mut matched = 0;
    for term in query_terms {
        let freq = match freqs.get(term) {
            Some(&f) if f > 0 => f as f64,
            _ => continue,
        };
        let tf = (freq * (params.k1 + 1.0)) / (freq + params.k1 * norm);
        score += stats.idf(term) * tf;
        matched += 1;
    }

    (score, matched)
}

/// Rank `corpus` against `query_tokens`.
///
/// The corpus is expected to be pre-filtered (active items within scope).
/// Items matching no query term are left out. Ties are broken by item id
/// ascending.
pub fn rank(query_tokens: &[String], corpus: &[IndexItem], params: Bm25Params) -> Vec<SparseHit> {
    if query_tokens.is_empty() || corpus.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let query_terms: Vec<&str> = query_tokens
        .iter()
        .map(String::as_str)
        .filter(|t| seen.insert(*t))
        .collect();

    let stats = CorpusStats::from_token_lists(corpus.iter().map(|item| item.tokens()));

    let mut hits: Vec<SparseHit> = corpus
        .iter()
        .filter_map(|item| {
            let (score, matched) = score_tokens(&query_terms, item.tokens(), &stats, params);
            (matched > 0).then(|| SparseHit {
                item_id: item.id.clone(),
                score,
                matched_terms: matched,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });

    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemContent, ItemType};
    use crate::tokenize::tokenize;

    fn make_item(id: &str, text: &str) -> IndexItem {
        let mut item = IndexItem::new(
            ItemType::Custom,
            id,
            None,
            ItemContent::from_text(text),
            serde_json::json!({}),
        );
        item.id = id.to_string();
        item
    }

    fn order(hits: &[SparseHit]) -> Vec<&str> {
        hits.iter().map(|h| h.item_id.as_str()).collect()
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let corpus = vec![make_item("a", "users table")];
        assert!(rank(&[], &corpus, Bm25Params::default()).is_empty());
    }

    #[test]
    fn test_empty_corpus_returns_nothing() {
        assert!(rank(&tokenize("users"), &[], Bm25Params::default()).is_empty());
    }

    #[test]
    fn test_single_item_corpus_scores_positive() {
        let corpus = vec![make_item("a", "find inactive users")];
        let hits = rank(&tokenize("inactive users"), &corpus, Bm25Params::default());
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.0, "score was {}", hits[0].score);
        assert_eq!(hits[0].matched_terms, 2);
    }

    #[test]
    fn test_absent_term_contributes_zero() {
        let corpus = vec![
            make_item("a", "find inactive users"),
            make_item("b", "monthly revenue by region"),
        ];
        let stats = CorpusStats::from_token_lists(corpus.iter().map(|i| i.tokens()));
        let p = Bm25Params::default();

        let (with_absent, matched) = score_tokens(&["inactive", "zebra"], corpus[0].tokens(), &stats, p);
        let (without, _) = score_tokens(&["inactive"], corpus[0].tokens(), &stats, p);
        assert_eq!(matched, 1);
        assert!((with_absent - without).abs() < 1e-12);

        let (none, matched) = score_tokens(&["zebra"], corpus[0].tokens(), &stats, p);
        assert_eq!(none, 0.0);
        assert_eq!(matched, 0);
    }

    #[test]
    fn test_document_frequency_counts_distinct_terms() {
        let corpus = vec![
            make_item("a", "users users users"),
            make_item("b", "users orders"),
            make_item("c", "orders"),
        ];
        let stats = CorpusStats::from_token_lists(corpus.iter().map(|i| i.tokens()));
        assert_eq!(stats.doc_freq("users"), 2);
        assert_eq!(stats.doc_freq("orders"), 2);
        assert_eq!(stats.doc_freq("missing"), 0);
        assert!((stats.avg_doc_len - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_idf_formula() {
        let corpus = vec![make_item("a", "alpha beta"), make_item("b", "gamma delta")];
        let stats = CorpusStats::from_token_lists(corpus.iter().map(|i| i.tokens()));
        // N = 2, df = 1 → ln(1.5 / 1.5 + 1) = ln 2
        assert!((stats.idf("alpha") - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_rarer_term_ranks_higher() {
        let corpus = vec![
            make_item("a", "users login failures"),
            make_item("b", "users revenue"),
            make_item("c", "users inactive"),
        ];
        let hits = rank(&tokenize("inactive users"), &corpus, Bm25Params::default());
        assert_eq!(hits[0].item_id, "c");
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let corpus = vec![
            make_item("b", "orders shipped"),
            make_item("a", "orders shipped"),
        ];
        let hits = rank(&tokenize("orders"), &corpus, Bm25Params::default());
        assert_eq!(order(&hits), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_query_terms_count_once() {
        let corpus = vec![make_item("a", "users table"), make_item("b", "orders")];
        let once = rank(&tokenize("users"), &corpus, Bm25Params::default());
        let twice = rank(&tokenize("users users"), &corpus, Bm25Params::default());
        assert!((once[0].score - twice[0].score).abs() < 1e-12);
    }

    #[test]
    fn test_doubling_documents_preserves_ranking() {
        let texts = [
            ("a", "inactive users report"),
            ("b", "users revenue by region monthly"),
            ("c", "inactive accounts cleanup job"),
            ("d", "login failures per user"),
        ];
        let corpus: Vec<IndexItem> = texts.iter().map(|(id, t)| make_item(id, t)).collect();
        let doubled: Vec<IndexItem> = texts
            .iter()
            .map(|(id, t)| make_item(id, &format!("{} {}", t, t)))
            .collect();

        let query = tokenize("inactive users");
        let base = rank(&query, &corpus, Bm25Params::default());
        let scaled = rank(&query, &doubled, Bm25Params::default());
        assert_eq!(order(&base), order(&scaled));
    }
}
