//! Notebook routing: decides which notebooks context is pulled from.

use tracing::debug;

use crate::services::notebooks::{
    DEFAULT_NOTEBOOK_ID, NotebookStores, classify_notebook_id_from_text, normalize_notebook_id,
};
use crate::services::retrieval::score_notebook_for_tokens;
use crate::services::tokenize::tokenize;

/// Weight of the latest user utterance in the blended notebook score
const LATEST_MESSAGE_WEIGHT: f32 = 0.8;
/// Weight of the broader retrieval query in the blended notebook score
const RETRIEVAL_QUERY_WEIGHT: f32 = 0.2;
/// Bonus when the keyword classifier agrees with the candidate
const CLASSIFIER_AGREEMENT_BONUS: f32 = 0.25;
/// Cap and scale of the "has enough history to be worth using" bonus
const DEPTH_BONUS_CAP: f32 = 0.1;
const DEPTH_BONUS_SCALE: f32 = 100.0;
/// Auto mode keeps candidates scoring above this
const SELECTION_SCORE_THRESHOLD: f32 = 0.02;
/// Auto mode selects at most this many notebooks
const MAX_SELECTED_NOTEBOOKS: usize = 3;

/// How the notebook selection was made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// System picks notebook(s) by score
    Auto,
    /// Caller pinned one notebook
    Specific,
}

impl RoutingMode {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            RoutingMode::Auto => "auto",
            RoutingMode::Specific => "specific",
        }
    }
}

/// A ranked routing candidate. `retrieved_turns` is filled in after turn
/// retrieval runs for the selected notebooks.
#[derive(Debug, Clone)]
pub struct NotebookScore {
    pub notebook_id: String,
    pub score: f32,
    pub retrieved_turns: usize,
}

/// Routing outcome for one chat turn; returned to the caller for
/// telemetry and reused by the decomposition context builder.
#[derive(Debug, Clone)]
pub struct RoutingMetadata {
    pub mode: RoutingMode,
    pub requested_notebook_id: Option<String>,
    pub candidate_notebook_ids: Vec<String>,
    pub selected_notebook_ids: Vec<String>,
    pub notebook_scores: Vec<NotebookScore>,
}

/// Caller-supplied routing hints
#[derive(Debug, Clone, Default)]
pub struct RoutingOptions {
    pub mode: Option<RoutingMode>,
    pub notebook_id: Option<String>,
    pub candidate_notebook_ids: Vec<String>,
}

/// Inputs to [`resolve_routing`]
pub struct RoutingRequest<'a> {
    pub stores: &'a NotebookStores<'a>,
    pub latest_user_message: &'a str,
    pub retrieval_query: &'a str,
    pub options: &'a RoutingOptions,
}

/// Selects which notebook(s) to pull context from.
///
/// Specific mode (an explicit notebook id, or `mode: Specific`) always
/// honors the requested notebook regardless of score. Auto mode ranks the
/// candidates by a blended score and keeps the top scorers above the
/// selection threshold, falling back to the single best candidate so the
/// selection is never empty while at least one notebook exists.
#[must_use]
pub fn resolve_routing(request: RoutingRequest<'_>) -> RoutingMetadata {
    let requested = request
        .options
        .notebook_id
        .as_deref()
        .map(normalize_notebook_id);
    let mode = if requested.is_some() || request.options.mode == Some(RoutingMode::Specific) {
        RoutingMode::Specific
    } else {
        RoutingMode::Auto
    };

    if request.stores.is_empty() {
        let fallback = requested
            .clone()
            .unwrap_or_else(|| DEFAULT_NOTEBOOK_ID.to_string());
        return RoutingMetadata {
            mode,
            requested_notebook_id: requested,
            candidate_notebook_ids: vec![fallback.clone()],
            selected_notebook_ids: vec![fallback],
            notebook_scores: Vec::new(),
        };
    }

    let candidate_notebook_ids: Vec<String> = match mode {
        RoutingMode::Specific => vec![
            requested
                .clone()
                .unwrap_or_else(|| DEFAULT_NOTEBOOK_ID.to_string()),
        ],
        RoutingMode::Auto if !request.options.candidate_notebook_ids.is_empty() => {
            dedup_ids(&request.options.candidate_notebook_ids)
        }
        RoutingMode::Auto => request.stores.notebook_ids().to_vec(),
    };

    let latest_tokens = tokenize(request.latest_user_message);
    let query_tokens = tokenize(request.retrieval_query);
    // agreement is checked against the latest message only, not the
    // blended retrieval query
    let inferred_notebook = classify_notebook_id_from_text(request.latest_user_message);

    let mut notebook_scores: Vec<NotebookScore> = candidate_notebook_ids
        .iter()
        .map(|notebook_id| {
            let turns = request.stores.turns(notebook_id);
            let latest_score = score_notebook_for_tokens(&latest_tokens, turns);
            let query_score = score_notebook_for_tokens(&query_tokens, turns);
            let agreement = if inferred_notebook == *notebook_id {
                CLASSIFIER_AGREEMENT_BONUS
            } else {
                0.0
            };
            let depth = (turns.len() as f32 / DEPTH_BONUS_SCALE).min(DEPTH_BONUS_CAP);
            NotebookScore {
                notebook_id: notebook_id.clone(),
                score: LATEST_MESSAGE_WEIGHT * latest_score
                    + RETRIEVAL_QUERY_WEIGHT * query_score
                    + agreement
                    + depth,
                retrieved_turns: 0,
            }
        })
        .collect();
    notebook_scores.sort_by(|left, right| right.score.total_cmp(&left.score));

    let selected_notebook_ids: Vec<String> = match mode {
        RoutingMode::Specific => vec![
            requested
                .clone()
                .unwrap_or_else(|| DEFAULT_NOTEBOOK_ID.to_string()),
        ],
        RoutingMode::Auto => {
            let picked: Vec<String> = notebook_scores
                .iter()
                .filter(|entry| entry.score > SELECTION_SCORE_THRESHOLD)
                .take(MAX_SELECTED_NOTEBOOKS)
                .map(|entry| entry.notebook_id.clone())
                .collect();
            if !picked.is_empty() {
                picked
            } else if let Some(best) = notebook_scores.first() {
                vec![best.notebook_id.clone()]
            } else {
                vec![DEFAULT_NOTEBOOK_ID.to_string()]
            }
        }
    };

    debug!(
        mode = mode.label(),
        selected = %selected_notebook_ids.join(","),
        candidates = candidate_notebook_ids.len(),
        "resolved notebook routing"
    );

    RoutingMetadata {
        mode,
        requested_notebook_id: requested,
        candidate_notebook_ids,
        selected_notebook_ids,
        notebook_scores,
    }
}

fn dedup_ids(raw_ids: &[String]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for raw in raw_ids {
        let normalized = normalize_notebook_id(raw);
        if !ids.contains(&normalized) {
            ids.push(normalized);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notebooks::{ConversationTurn, build_notebook_stores};

    fn options() -> RoutingOptions {
        RoutingOptions::default()
    }

    fn resolve(
        history: &[ConversationTurn],
        latest: &str,
        query: &str,
        options: &RoutingOptions,
    ) -> RoutingMetadata {
        let stores = build_notebook_stores(history);
        resolve_routing(RoutingRequest {
            stores: &stores,
            latest_user_message: latest,
            retrieval_query: query,
            options,
        })
    }

    fn score_of(routing: &RoutingMetadata, notebook_id: &str) -> f32 {
        routing
            .notebook_scores
            .iter()
            .find(|entry| entry.notebook_id == notebook_id)
            .map(|entry| entry.score)
            .unwrap_or(f32::NAN)
    }

    #[test]
    fn test_empty_store_returns_trivial_metadata() {
        let routing = resolve(&[], "hello", "hello", &options());
        assert_eq!(routing.mode, RoutingMode::Auto);
        assert_eq!(routing.selected_notebook_ids, vec![DEFAULT_NOTEBOOK_ID]);
        assert_eq!(routing.candidate_notebook_ids, vec![DEFAULT_NOTEBOOK_ID]);
        assert!(routing.notebook_scores.is_empty());
    }

    #[test]
    fn test_empty_store_honors_requested_id() {
        let hints = RoutingOptions {
            notebook_id: Some("acme".to_string()),
            ..RoutingOptions::default()
        };
        let routing = resolve(&[], "hello", "hello", &hints);
        assert_eq!(routing.mode, RoutingMode::Specific);
        assert_eq!(routing.selected_notebook_ids, vec!["acme"]);
    }

    #[test]
    fn test_selection_never_empty_when_notebooks_exist() {
        let history = vec![ConversationTurn::user("totally unrelated chatter")];
        let routing = resolve(&history, "qqq zzz", "qqq zzz", &options());
        assert!(!routing.selected_notebook_ids.is_empty());
    }

    #[test]
    fn test_specific_mode_always_honors_override() {
        let history = vec![
            ConversationTurn::user("the invoice is late").in_notebook("acme"),
            ConversationTurn::user("gym tonight").in_notebook("personal"),
        ];
        let hints = RoutingOptions {
            notebook_id: Some("personal".to_string()),
            ..RoutingOptions::default()
        };
        let routing = resolve(&history, "invoice status", "invoice status", &hints);
        assert_eq!(routing.mode, RoutingMode::Specific);
        assert_eq!(routing.selected_notebook_ids, vec!["personal"]);
    }

    #[test]
    fn test_auto_mode_ranks_relevant_notebook_first() {
        let mut history: Vec<ConversationTurn> = (0..20)
            .map(|index| {
                ConversationTurn::user(format!("invoice item {}", index)).in_notebook("acme")
            })
            .collect();
        history.push(ConversationTurn::user("nice weather today").in_notebook("chatter"));
        history.push(ConversationTurn::user("indeed lovely").in_notebook("chatter"));

        let routing = resolve(&history, "invoice status", "invoice status", &options());
        assert_eq!(routing.mode, RoutingMode::Auto);
        assert!(routing.selected_notebook_ids.contains(&"acme".to_string()));
        assert!(score_of(&routing, "acme") > score_of(&routing, "chatter"));
    }

    #[test]
    fn test_auto_mode_caps_selection_at_three() {
        let mut history = Vec::new();
        for notebook in ["one", "two", "three", "four", "five"] {
            for _ in 0..5 {
                history.push(
                    ConversationTurn::user("shared invoice wording").in_notebook(notebook),
                );
            }
        }
        let routing = resolve(&history, "invoice", "invoice", &options());
        assert!(routing.selected_notebook_ids.len() <= 3);
        assert!(!routing.selected_notebook_ids.is_empty());
    }

    #[test]
    fn test_caller_candidates_limit_the_field() {
        let history = vec![
            ConversationTurn::user("invoice one").in_notebook("acme"),
            ConversationTurn::user("invoice two").in_notebook("globex"),
        ];
        let hints = RoutingOptions {
            candidate_notebook_ids: vec!["globex".to_string(), "globex".to_string()],
            ..RoutingOptions::default()
        };
        let routing = resolve(&history, "invoice", "invoice", &hints);
        assert_eq!(routing.candidate_notebook_ids, vec!["globex"]);
        assert_eq!(routing.selected_notebook_ids, vec!["globex"]);
    }

    #[test]
    fn test_classifier_agreement_bonus_applies() {
        // Same content in both notebooks; only "clients" matches the
        // classifier's reading of the latest message.
        let history = vec![
            ConversationTurn::user("status update").in_notebook("clients"),
            ConversationTurn::user("status update").in_notebook("chatter"),
        ];
        let routing = resolve(&history, "the invoice is due", "the invoice is due", &options());
        let clients_score = score_of(&routing, "clients");
        let chatter_score = score_of(&routing, "chatter");
        assert!((clients_score - chatter_score - 0.25).abs() < 0.001);
    }
}
