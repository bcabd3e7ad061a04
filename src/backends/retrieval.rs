//! Lightweight lexical retrieval over in-memory text chunks.
//!
//! The heavy retrieval/embedding machinery is the business of external
//! collaborators; the adapters only need a way to pick which chunks of an
//! already-fetched document to hand the model as context.

use std::collections::HashSet;

/// Split text into comparable tokens: lowercased alphanumeric runs, with
/// non-ASCII scripts (CJK has no word boundaries) indexed per character.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c.is_alphanumeric() {
            if c.is_ascii() {
                current.push(c.to_ascii_lowercase());
            } else {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_lowercase().collect());
            }
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Split text into overlapping word-window chunks.
pub fn chunk_words(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let chunk = chunk_size.max(1);
    let step = chunk.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + chunk).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Return up to `k` chunks ordered by token overlap with the query.
///
/// Falls back to document order on ties (and when nothing matches at all) so
/// the model always receives some context.
pub fn rank<'a>(query: &str, chunks: &'a [String], k: usize) -> Vec<&'a str> {
    let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();

    let mut scored: Vec<(usize, usize)> = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let matched: HashSet<String> = tokenize(chunk)
                .into_iter()
                .filter(|t| query_tokens.contains(t))
                .collect();
            (i, matched.len())
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    scored
        .into_iter()
        .take(k)
        .map(|(i, _)| chunks[i].as_str())
        .collect()
}
