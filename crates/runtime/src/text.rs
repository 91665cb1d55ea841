//! Shared text helpers for keyword extraction.
//!
//! The hashing embedder, structured search and follow-up suggestions all
//! need the same notion of a "term": a lowercase alphanumeric run.

/// Words that carry no retrieval signal on their own.
const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "by", "can", "could",
    "count", "describe", "did", "display", "do", "does", "explain", "fetch", "find", "for",
    "from", "get", "give", "has", "have", "how", "i", "in", "is", "it", "its", "list", "many",
    "me", "much", "my", "need", "number", "of", "on", "or", "our", "please", "show", "that",
    "the", "their", "them", "there", "these", "this", "those", "to", "under", "was", "we",
    "were", "what", "when", "where", "which", "who", "why", "will", "with", "would", "you",
    "your",
];

/// Split text into lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

/// Returns true for words that are filtered out of content terms.
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Distinct content terms of `text`, in first-occurrence order.
pub fn content_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in tokenize(text) {
        if is_stop_word(&token) || terms.contains(&token) {
            continue;
        }
        terms.push(token);
    }
    terms
}
