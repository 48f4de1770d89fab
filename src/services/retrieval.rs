//! Lexical-overlap retrieval over conversation history.
//!
//! Two layers of scoring share the same token overlap: turn-level (pick the
//! older turns most relevant to the current query) and notebook-level (rank
//! whole notebooks for routing). No embeddings; cheap and deterministic.

use std::collections::{BTreeSet, HashSet};

use crate::services::notebooks::IndexedTurn;
use crate::services::tokenize::tokenize;

/// Upper bound on turns returned by [`pick_retrieved_history`]
pub const RETRIEVED_CONTEXT_TURNS: usize = 6;

/// Turn scores at or below this are dropped before ranking
const TURN_SCORE_THRESHOLD: f32 = 0.05;
/// Weight of the positional recency boost added to each turn score
const RECENCY_BOOST_WEIGHT: f32 = 0.05;
/// Notebook scores look at the concatenation of this many trailing turns
const NOTEBOOK_SCORE_WINDOW: usize = 12;
/// Cap and scale of the density proxy used when the query has no tokens
const NOTEBOOK_DENSITY_CAP: f32 = 0.2;
const NOTEBOOK_DENSITY_SCALE: f32 = 120.0;

fn overlap_count(query_tokens: &HashSet<String>, candidate_tokens: &HashSet<String>) -> usize {
    query_tokens
        .iter()
        .filter(|token| candidate_tokens.contains(*token))
        .count()
}

/// Fraction of query tokens present in `text`; 0.0 for an empty query.
#[must_use]
pub fn overlap_ratio(query_tokens: &HashSet<String>, text: &str) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let candidate_tokens = tokenize(text);
    overlap_count(query_tokens, &candidate_tokens) as f32 / query_tokens.len() as f32
}

/// Picks a bounded set of older turns relevant to `query`.
///
/// Each turn scores `overlap/|query|` plus a recency boost of
/// `((position+1)/len) * 0.05`. Turns above the threshold are ranked, the
/// top matches are expanded to their immediate neighbors for coherence, and
/// the working set is truncated back to the most recent
/// `RETRIEVED_CONTEXT_TURNS` positions. Truncation keeps the latest
/// positions, not the highest scores.
///
/// A query with no tokens, or one that matches nothing, falls back to the
/// trailing recency window: the result is never empty when `turns` is not.
#[must_use]
pub fn pick_retrieved_history<'a>(
    turns: &[IndexedTurn<'a>],
    query: &str,
) -> Vec<IndexedTurn<'a>> {
    if turns.is_empty() {
        return Vec::new();
    }
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return recency_window(turns);
    }

    let total = turns.len();
    let mut scored: Vec<(usize, f32)> = Vec::new();
    for (position, entry) in turns.iter().enumerate() {
        let lexical = overlap_ratio(&query_tokens, &entry.turn.content);
        let recency = ((position + 1) as f32 / total as f32) * RECENCY_BOOST_WEIGHT;
        let score = lexical + recency;
        if score > TURN_SCORE_THRESHOLD {
            scored.push((position, score));
        }
    }
    if scored.is_empty() {
        return recency_window(turns);
    }
    scored.sort_by(|left, right| right.1.total_cmp(&left.1));

    let mut expanded: BTreeSet<usize> = BTreeSet::new();
    for (position, _) in scored.iter().take(RETRIEVED_CONTEXT_TURNS) {
        if *position > 0 {
            expanded.insert(position - 1);
        }
        expanded.insert(*position);
        if position + 1 < total {
            expanded.insert(position + 1);
        }
    }

    let keep_from = expanded.len().saturating_sub(RETRIEVED_CONTEXT_TURNS);
    expanded
        .into_iter()
        .skip(keep_from)
        .filter_map(|position| turns.get(position).copied())
        .collect()
}

fn recency_window<'a>(turns: &[IndexedTurn<'a>]) -> Vec<IndexedTurn<'a>> {
    let keep_from = turns.len().saturating_sub(RETRIEVED_CONTEXT_TURNS);
    turns.iter().skip(keep_from).copied().collect()
}

/// Scores a notebook against pre-tokenized query tokens.
///
/// The overlap ratio is computed against the concatenation of the
/// notebook's last `NOTEBOOK_SCORE_WINDOW` turns. An empty query falls back
/// to a density proxy (`min(0.2, turn_count/120)`); a notebook with no
/// tokens at all scores 0.
#[must_use]
pub fn score_notebook_for_tokens(
    query_tokens: &HashSet<String>,
    turns: &[IndexedTurn<'_>],
) -> f32 {
    if query_tokens.is_empty() {
        return (turns.len() as f32 / NOTEBOOK_DENSITY_SCALE).min(NOTEBOOK_DENSITY_CAP);
    }
    let window_from = turns.len().saturating_sub(NOTEBOOK_SCORE_WINDOW);
    let mut combined = String::new();
    for entry in turns.iter().skip(window_from) {
        combined.push_str(&entry.turn.content);
        combined.push(' ');
    }
    let notebook_tokens = tokenize(&combined);
    if notebook_tokens.is_empty() {
        return 0.0;
    }
    overlap_count(query_tokens, &notebook_tokens) as f32 / query_tokens.len() as f32
}

/// Convenience wrapper tokenizing `query` before scoring.
#[must_use]
pub fn score_notebook_for_query(query: &str, turns: &[IndexedTurn<'_>]) -> f32 {
    score_notebook_for_tokens(&tokenize(query), turns)
}
