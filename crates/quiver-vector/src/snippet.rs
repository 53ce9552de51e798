//! Relevance-weighted snippet extraction.
//!
//! Given stored content and the query that found it, [`extract_snippet`]
//! returns a bounded excerpt centred on the most query-relevant line plus up
//! to five ranked highlight terms.
//!
//! # Term scoring
//!
//! Each query word longer than two characters is scored against the whole
//! content with BM25 term-frequency saturation:
//!
//! ```text
//! tf_norm = tf * (k1 + 1) / (tf + k1 * (1 - b + b * len / avg_len))
//! score   = tf_norm * stopword_penalty * min(term_len / 5, 1.5)
//! ```
//!
//! with `k1 = 1.2`, `b = 0.75` and a fixed `avg_len = 500` words. The
//! average length is a constant rather than a corpus statistic; changing it
//! changes ranking output.

use serde::{Deserialize, Serialize};

/// Lines of context kept on each side of the best line.
pub const DEFAULT_CONTEXT_LINES: usize = 2;

/// Maximum number of highlight terms returned.
pub const MAX_HIGHLIGHTS: usize = 5;

const K1: f64 = 1.2;
const B: f64 = 0.75;
const AVG_DOC_LEN: f64 = 500.0;
const STOPWORD_PENALTY: f64 = 0.1;
const MAX_LENGTH_BOOST: f64 = 1.5;

const STOPWORDS: &[&str] = &[
    "about", "all", "also", "and", "any", "are", "been", "but", "can", "did", "does", "for",
    "from", "had", "has", "have", "her", "his", "how", "into", "its", "not", "one", "our", "out",
    "she", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "was", "were", "what", "when", "where", "which", "who", "why", "will", "with",
    "would", "you", "your",
];

/// An excerpt and its highlight terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    /// Excerpt of at most `2 * context_lines + 1` lines.
    pub snippet: String,

    /// Up to five query terms found in the content, best first.
    pub highlights: Vec<String>,
}

/// Extract a snippet of `content` relevant to `query`.
///
/// Content with at most `2 * context_lines + 1` lines is returned unchanged.
/// Otherwise the window is centred on the highest-scoring line (the first
/// one on ties); when no line contains a query term, the first window is
/// returned.
pub fn extract_snippet(content: &str, query: &str, context_lines: usize) -> Snippet {
    let terms = query_terms(query);
    let lowered = content.to_lowercase();
    let doc_len = content.split_whitespace().count() as f64;

    let scored: Vec<(String, f64)> = terms
        .into_iter()
        .map(|term| {
            let score = term_score(&term, &lowered, doc_len);
            (term, score)
        })
        .collect();

    let mut ranked: Vec<&(String, f64)> = scored
        .iter()
        .filter(|(term, _)| lowered.contains(term.as_str()))
        .collect();
    // stable sort keeps query order among equal scores
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    let highlights = ranked
        .into_iter()
        .take(MAX_HIGHLIGHTS)
        .map(|(term, _)| term.clone())
        .collect();

    let lines: Vec<&str> = content.split('\n').collect();
    let window = context_lines.saturating_mul(2).saturating_add(1);
    if lines.len() <= window {
        return Snippet {
            snippet: content.to_string(),
            highlights,
        };
    }

    let mut best: Option<(usize, f64)> = None;
    for (idx, line) in lines.iter().enumerate() {
        let line = line.to_lowercase();
        let score: f64 = scored
            .iter()
            .filter(|(term, _)| line.contains(term.as_str()))
            .map(|(_, s)| s)
            .sum();
        if score > 0.0 && best.is_none_or(|(_, top)| score > top) {
            best = Some((idx, score));
        }
    }

    let (start, end) = match best {
        Some((center, _)) => (
            center.saturating_sub(context_lines),
            center
                .saturating_add(context_lines)
                .saturating_add(1)
                .min(lines.len()),
        ),
        None => (0, window),
    };

    Snippet {
        snippet: lines[start..end].join("\n"),
        highlights,
    }
}

/// Lower-cased query words longer than two characters, first occurrence order.
fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in query.split_whitespace() {
        let word = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if word.chars().count() > 2 && !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

fn term_score(term: &str, lowered_content: &str, doc_len: f64) -> f64 {
    let tf = lowered_content.matches(term).count() as f64;
    if tf == 0.0 {
        return 0.0;
    }
    let tf_norm = tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * (doc_len / AVG_DOC_LEN)));
    let penalty = if STOPWORDS.contains(&term) {
        STOPWORD_PENALTY
    } else {
        1.0
    };
    let boost = (term.chars().count() as f64 / 5.0).min(MAX_LENGTH_BOOST);
    tf_norm * penalty * boost
}
