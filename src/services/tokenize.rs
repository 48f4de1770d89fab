//! Lexical tokenization and clipping utilities shared by retrieval and
//! context assembly.

use std::collections::HashSet;

/// Tokens shorter than this are discarded as noise ("do", "it", "ok").
const MIN_TOKEN_LEN: usize = 3;

/// Splits text into a set of lowercase alphanumeric tokens.
///
/// A token is a maximal run of `[a-z0-9_]` after lowercasing; everything
/// else is a separator. Deterministic, no side effects, empty input yields
/// an empty set.
#[must_use]
pub fn tokenize(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    lowered
        .split(|character: char| !character.is_ascii_alphanumeric() && character != '_')
        .filter(|token| token.len() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

/// Hard-clips text to `limit` characters, replacing the tail with `"..."`.
///
/// Strings already within the limit are returned unchanged, so the
/// operation is idempotent.
#[must_use]
pub fn clip_context(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit.saturating_sub(3)).collect();
    format!("{}...", kept)
}
