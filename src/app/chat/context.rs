//! Assembles the merged context block spliced into the chat system prompt.
//!
//! One call per inbound chat turn: partition the history into notebooks,
//! resolve routing, retrieve relevant older turns, and render everything
//! into a labeled text block plus structured routing metadata.

use crate::services::notebooks::{ConversationTurn, IndexedTurn, TurnRole, build_notebook_stores};
use crate::services::retrieval::pick_retrieved_history;
use crate::services::routing::{
    RoutingMetadata, RoutingOptions, RoutingRequest, resolve_routing,
};
use crate::services::tokenize::clip_context;

/// How many trailing turns of the raw history always ride along
pub const RECENT_CONTEXT_TURNS: usize = 10;
/// Per-turn character budget in the rendered block
pub const MAX_CONTEXT_CHARS: usize = 220;
/// Character budget for the externally supplied avoidance summary
const AVOIDANCE_CONTEXT_CHARS: usize = 1200;
/// The retrieval query blends the latest message with this many prior user turns
const RETRIEVAL_QUERY_USER_TURNS: usize = 3;

/// Per-request context output; never persisted.
#[derive(Debug, Clone)]
pub struct ContextBlock {
    pub text: String,
    pub recent_turns: Vec<ConversationTurn>,
    pub retrieved_turns: Vec<ConversationTurn>,
    pub routing: RoutingMetadata,
}

/// Inputs to [`build_merged_context_block`]
pub struct ContextRequest<'a> {
    pub history: &'a [ConversationTurn],
    pub latest_user_message: &'a str,
    pub avoidance_context: Option<&'a str>,
    pub options: &'a RoutingOptions,
}

/// Builds the full context block for one chat turn.
///
/// Recent turns are the tail of the entire unpartitioned history and ride
/// along regardless of routing; retrieval only ever sees turns older than
/// that window. Missing optional inputs omit their section; the function
/// is total and never panics.
#[must_use]
pub fn build_merged_context_block(request: ContextRequest<'_>) -> ContextBlock {
    let stores = build_notebook_stores(request.history);

    let recent_from = request.history.len().saturating_sub(RECENT_CONTEXT_TURNS);
    let recent_turns: Vec<ConversationTurn> =
        request.history.iter().skip(recent_from).cloned().collect();

    let retrieval_query = build_retrieval_query(request.latest_user_message, &recent_turns);
    let mut routing = resolve_routing(RoutingRequest {
        stores: &stores,
        latest_user_message: request.latest_user_message,
        retrieval_query: &retrieval_query,
        options: request.options,
    });

    let mut retrieved_turns: Vec<ConversationTurn> = Vec::new();
    for notebook_id in routing.selected_notebook_ids.clone() {
        let older: Vec<IndexedTurn<'_>> = stores
            .turns(&notebook_id)
            .iter()
            .filter(|entry| entry.index < recent_from)
            .copied()
            .collect();
        let picked = pick_retrieved_history(&older, &retrieval_query);
        record_retrieved_count(&mut routing, &notebook_id, picked.len());
        retrieved_turns.extend(picked.into_iter().map(|entry| entry.turn.clone()));
    }

    let last_question = last_assistant_question(request.history);

    let mut lines: Vec<String> = Vec::new();
    lines.push(routing_summary_line(&routing));
    if let Some(question) = &last_question {
        lines.push(format!("Last assistant question: {}", question));
    }
    if !recent_turns.is_empty() {
        lines.push("Recent conversation:".to_string());
        for turn in &recent_turns {
            lines.push(render_turn(turn, MAX_CONTEXT_CHARS));
        }
    }
    if !retrieved_turns.is_empty() {
        lines.push("Retrieved prior context:".to_string());
        for turn in &retrieved_turns {
            lines.push(render_turn(turn, MAX_CONTEXT_CHARS));
        }
    }
    if let Some(avoidance) = request.avoidance_context {
        let trimmed = avoidance.trim();
        if !trimmed.is_empty() {
            lines.push("Avoidance context:".to_string());
            lines.push(clip_context(trimmed, AVOIDANCE_CONTEXT_CHARS));
        }
    }

    ContextBlock {
        text: lines.join("\n"),
        recent_turns,
        retrieved_turns,
        routing,
    }
}

/// The latest message concatenated with the last few user turns of the
/// recent window, so terse follow-ups still carry their subject.
fn build_retrieval_query(latest_user_message: &str, recent_turns: &[ConversationTurn]) -> String {
    let mut query = latest_user_message.to_string();
    for turn in recent_turns
        .iter()
        .rev()
        .filter(|turn| turn.role == TurnRole::User)
        .take(RETRIEVAL_QUERY_USER_TURNS)
    {
        query.push(' ');
        query.push_str(&turn.content);
    }
    query
}

/// Most recent assistant turn whose content ends in a question mark.
/// An unanswered question conditions how a terse follow-up is read.
fn last_assistant_question(history: &[ConversationTurn]) -> Option<String> {
    history
        .iter()
        .rev()
        .find(|turn| turn.role == TurnRole::Assistant && turn.content.trim().ends_with('?'))
        .map(|turn| turn.content.trim().to_string())
}

fn render_turn(turn: &ConversationTurn, limit: usize) -> String {
    format!("{}: {}", turn.role.label(), clip_context(&turn.content, limit))
}

fn routing_summary_line(routing: &RoutingMetadata) -> String {
    let scores: Vec<String> = routing
        .notebook_scores
        .iter()
        .map(|entry| format!("{}={:.2}", entry.notebook_id, entry.score))
        .collect();
    let mut line = format!(
        "Conversation routing: mode={} notebooks={}",
        routing.mode.label(),
        routing.selected_notebook_ids.join(",")
    );
    if !scores.is_empty() {
        line.push_str(&format!(" scores={}", scores.join(",")));
    }
    line
}

fn record_retrieved_count(routing: &mut RoutingMetadata, notebook_id: &str, count: usize) {
    if let Some(entry) = routing
        .notebook_scores
        .iter_mut()
        .find(|entry| entry.notebook_id == notebook_id)
    {
        entry.retrieved_turns = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::routing::RoutingMode;

    fn build(history: &[ConversationTurn], latest: &str) -> ContextBlock {
        let options = RoutingOptions::default();
        build_merged_context_block(ContextRequest {
            history,
            latest_user_message: latest,
            avoidance_context: None,
            options: &options,
        })
    }

    #[test]
    fn test_empty_history_builds_trivial_block() {
        let block = build(&[], "hello");
        assert!(block.recent_turns.is_empty());
        assert!(block.retrieved_turns.is_empty());
        assert!(block.text.starts_with("Conversation routing:"));
    }

    #[test]
    fn test_recent_turns_are_history_tail() {
        let history: Vec<ConversationTurn> = (0..25)
            .map(|index| ConversationTurn::user(format!("message {}", index)))
            .collect();
        let block = build(&history, "message 24");
        assert_eq!(block.recent_turns.len(), RECENT_CONTEXT_TURNS);
        let expected: Vec<ConversationTurn> = history.iter().skip(15).cloned().collect();
        assert_eq!(block.recent_turns, expected);
    }

    #[test]
    fn test_recent_turns_on_short_history() {
        let history = vec![
            ConversationTurn::user("one"),
            ConversationTurn::assistant("two"),
        ];
        let block = build(&history, "three");
        assert_eq!(block.recent_turns, history);
    }

    #[test]
    fn test_terse_followup_surfaces_last_question() {
        let history = vec![
            ConversationTurn::user("let's fix the Acme invoice"),
            ConversationTurn::assistant("Sure, what's the due date?"),
            ConversationTurn::user("do it"),
        ];
        let block = build(&history, "do it");
        assert!(
            block
                .text
                .contains("Last assistant question: Sure, what's the due date?")
        );
    }

    #[test]
    fn test_no_question_omits_section() {
        let history = vec![
            ConversationTurn::user("hello"),
            ConversationTurn::assistant("hi there"),
        ];
        let block = build(&history, "hello again");
        assert!(!block.text.contains("Last assistant question:"));
    }

    #[test]
    fn test_avoidance_context_is_clipped() {
        let history = vec![ConversationTurn::user("hello")];
        let avoidance = "x".repeat(5000);
        let options = RoutingOptions::default();
        let block = build_merged_context_block(ContextRequest {
            history: &history,
            latest_user_message: "hello",
            avoidance_context: Some(&avoidance),
            options: &options,
        });
        assert!(block.text.contains("Avoidance context:"));
        let avoidance_line = block
            .text
            .lines()
            .last()
            .map(str::to_string)
            .unwrap_or_default();
        assert_eq!(avoidance_line.chars().count(), 1200);
        assert!(avoidance_line.ends_with("..."));
    }

    #[test]
    fn test_retrieval_only_sees_older_turns() {
        // Twelve turns in one notebook: the last ten are the recent window,
        // so retrieval may only surface the first two.
        let history: Vec<ConversationTurn> = (0..12)
            .map(|index| {
                ConversationTurn::user(format!("invoice note {}", index)).in_notebook("acme")
            })
            .collect();
        let block = build(&history, "invoice note");
        assert!(!block.retrieved_turns.is_empty());
        for turn in &block.retrieved_turns {
            assert!(
                turn.content.contains("note 0") || turn.content.contains("note 1"),
                "unexpected retrieved turn: {}",
                turn.content
            );
        }
    }

    #[test]
    fn test_retrieved_counts_recorded_in_routing() {
        let history: Vec<ConversationTurn> = (0..12)
            .map(|index| {
                ConversationTurn::user(format!("invoice note {}", index)).in_notebook("acme")
            })
            .collect();
        let block = build(&history, "invoice note");
        let acme = block
            .routing
            .notebook_scores
            .iter()
            .find(|entry| entry.notebook_id == "acme");
        assert_eq!(
            acme.map(|entry| entry.retrieved_turns),
            Some(block.retrieved_turns.len())
        );
    }

    #[test]
    fn test_pinned_notebook_flows_through() {
        let history = vec![
            ConversationTurn::user("invoice talk").in_notebook("acme"),
            ConversationTurn::user("gym plan").in_notebook("personal"),
        ];
        let options = RoutingOptions {
            notebook_id: Some("personal".to_string()),
            ..RoutingOptions::default()
        };
        let block = build_merged_context_block(ContextRequest {
            history: &history,
            latest_user_message: "invoice talk",
            avoidance_context: None,
            options: &options,
        });
        assert_eq!(block.routing.mode, RoutingMode::Specific);
        assert_eq!(block.routing.selected_notebook_ids, vec!["personal"]);
        assert!(block.text.contains("mode=specific"));
    }
}
