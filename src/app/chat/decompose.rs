//! Decomposition support: the forcing heuristic, the `decompose_task` tool
//! definition, and the compact context block the tool round runs on.

use serde_json::json;

use crate::agents::openai_compat::{FunctionDefinition, ToolCallResponse, ToolDefinition};
use crate::app::chat::intent::TaskDomain;
use crate::services::notebooks::ConversationTurn;
use crate::services::routing::RoutingMetadata;
use crate::services::tokenize::clip_context;

pub const DECOMPOSE_TOOL_NAME: &str = "decompose_task";

/// Whole-block character budget for the decomposition context
const DECOMPOSITION_CONTEXT_CHARS: usize = 2200;
/// Trailing recent turns included, and their per-turn budget
const DECOMPOSITION_RECENT_TURNS: usize = 8;
const DECOMPOSITION_RECENT_CHARS: usize = 240;
/// Per-turn budget for retrieved turns
const DECOMPOSITION_RETRIEVED_CHARS: usize = 260;

/// Inputs to [`build_decomposition_rag_context`]
pub struct DecompositionRequest<'a> {
    pub latest_user_message: &'a str,
    pub recent_turns: &'a [ConversationTurn],
    pub retrieved_turns: &'a [ConversationTurn],
    pub routing: &'a RoutingMetadata,
    pub max_chars: Option<usize>,
}

/// Builds the compact context string for the decomposition tool round.
///
/// Smaller and differently shaped than the general chat block: the latest
/// request, the selected notebooks, the last eight recent turns, and all
/// retrieved turns, with the assembled whole hard-clipped to `max_chars`.
#[must_use]
pub fn build_decomposition_rag_context(request: DecompositionRequest<'_>) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("Latest request: {}", request.latest_user_message));
    if !request.routing.selected_notebook_ids.is_empty() {
        lines.push(format!(
            "Selected notebooks: {}",
            request.routing.selected_notebook_ids.join(", ")
        ));
    }

    let recent_from = request
        .recent_turns
        .len()
        .saturating_sub(DECOMPOSITION_RECENT_TURNS);
    let recent: Vec<&ConversationTurn> = request.recent_turns.iter().skip(recent_from).collect();
    if !recent.is_empty() {
        lines.push("Recent turns:".to_string());
        for turn in recent {
            lines.push(format!(
                "{}: {}",
                turn.role.label(),
                clip_context(&turn.content, DECOMPOSITION_RECENT_CHARS)
            ));
        }
    }

    if !request.retrieved_turns.is_empty() {
        lines.push("Retrieved context:".to_string());
        for turn in request.retrieved_turns {
            lines.push(format!(
                "{}: {}",
                turn.role.label(),
                clip_context(&turn.content, DECOMPOSITION_RETRIEVED_CHARS)
            ));
        }
    }

    let limit = request.max_chars.unwrap_or(DECOMPOSITION_CONTEXT_CHARS);
    clip_context(&lines.join("\n"), limit)
}

/// True when the message asks for a task to be broken into subtasks and the
/// domain gate allows forcing the tool call. Personal requests never force.
#[must_use]
pub fn should_force_decomposition(latest_user_message: &str, domain: TaskDomain) -> bool {
    if domain == TaskDomain::Personal {
        return false;
    }
    let lowered = latest_user_message.trim().to_lowercase();
    let triggers = [
        "break down",
        "break this down",
        "break it down",
        "decompose",
        "subtasks",
        "sub-tasks",
        "split this into",
        "split it into",
        "step by step plan",
        "plan this out",
        "make a plan for",
    ];
    triggers.iter().any(|term| lowered.contains(term))
}

/// Tool definition advertised to the model when decomposition is forced
#[must_use]
pub fn decompose_tool_definition() -> ToolDefinition {
    let parameters = json!({
        "type": "object",
        "properties": {
            "title": {
                "type": "string",
                "description": "The task to break into ordered subtasks"
            }
        },
        "required": ["title"]
    });
    ToolDefinition {
        tool_type: "function".to_string(),
        function: FunctionDefinition {
            name: DECOMPOSE_TOOL_NAME.to_string(),
            description: "Break a single requested task into an ordered list of concrete subtasks."
                .to_string(),
            parameters,
        },
    }
}

/// Extracts the first `decompose_task` call, returning its id and title.
#[must_use]
pub fn parse_decompose_call(calls: &[ToolCallResponse]) -> Option<(String, String)> {
    for call in calls {
        if call.function.name != DECOMPOSE_TOOL_NAME {
            continue;
        }
        if let Some(title) = extract_title_from_arguments(&call.function.arguments) {
            return Some((call.id.clone(), title));
        }
    }
    None
}

fn extract_title_from_arguments(arguments: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(arguments).ok()?;
    parsed
        .get("title")
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::routing::{NotebookScore, RoutingMode};

    fn routing(selected: &[&str]) -> RoutingMetadata {
        RoutingMetadata {
            mode: RoutingMode::Auto,
            requested_notebook_id: None,
            candidate_notebook_ids: selected.iter().map(|id| id.to_string()).collect(),
            selected_notebook_ids: selected.iter().map(|id| id.to_string()).collect(),
            notebook_scores: selected
                .iter()
                .map(|id| NotebookScore {
                    notebook_id: id.to_string(),
                    score: 0.5,
                    retrieved_turns: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_decomposition_context_shape() {
        let recent = vec![
            ConversationTurn::user("the acme launch needs doing"),
            ConversationTurn::assistant("noted"),
        ];
        let retrieved = vec![ConversationTurn::user("acme wants it by june")];
        let text = build_decomposition_rag_context(DecompositionRequest {
            latest_user_message: "break down the acme launch",
            recent_turns: &recent,
            retrieved_turns: &retrieved,
            routing: &routing(&["acme"]),
            max_chars: None,
        });
        assert!(text.starts_with("Latest request: break down the acme launch"));
        assert!(text.contains("Selected notebooks: acme"));
        assert!(text.contains("Recent turns:"));
        assert!(text.contains("Retrieved context:"));
        assert!(text.contains("user: acme wants it by june"));
    }

    #[test]
    fn test_decomposition_context_respects_max_chars() {
        let recent: Vec<ConversationTurn> = (0..8)
            .map(|_| ConversationTurn::user("y".repeat(400)))
            .collect();
        let text = build_decomposition_rag_context(DecompositionRequest {
            latest_user_message: "break this down",
            recent_turns: &recent,
            retrieved_turns: &[],
            routing: &routing(&["tasks"]),
            max_chars: Some(500),
        });
        assert_eq!(text.chars().count(), 500);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_decomposition_context_limits_recent_turns() {
        let recent: Vec<ConversationTurn> = (0..10)
            .map(|index| ConversationTurn::user(format!("turn {}", index)))
            .collect();
        let text = build_decomposition_rag_context(DecompositionRequest {
            latest_user_message: "split it into subtasks",
            recent_turns: &recent,
            retrieved_turns: &[],
            routing: &routing(&[]),
            max_chars: None,
        });
        assert!(!text.contains("turn 0"));
        assert!(!text.contains("turn 1"));
        assert!(text.contains("turn 2"));
        assert!(text.contains("turn 9"));
    }

    #[test]
    fn test_forcing_heuristic_table() {
        let cases = [
            ("break down the acme launch", TaskDomain::Work, true),
            ("please decompose this task", TaskDomain::Unknown, true),
            ("split it into subtasks", TaskDomain::Work, true),
            ("break down my vacation packing", TaskDomain::Personal, false),
            ("how is the invoice going", TaskDomain::Work, false),
            ("hello", TaskDomain::Unknown, false),
        ];
        for (input, domain, expected) in cases {
            assert_eq!(
                should_force_decomposition(input, domain),
                expected,
                "{}",
                input
            );
        }
    }

    #[test]
    fn test_parse_decompose_call() {
        let calls = vec![ToolCallResponse {
            id: "call-1".to_string(),
            call_type: "function".to_string(),
            function: crate::agents::openai_compat::FunctionCallResponse {
                name: DECOMPOSE_TOOL_NAME.to_string(),
                arguments: "{\"title\":\"ship the acme launch\"}".to_string(),
            },
        }];
        assert_eq!(
            parse_decompose_call(&calls),
            Some(("call-1".to_string(), "ship the acme launch".to_string()))
        );
        assert_eq!(parse_decompose_call(&[]), None);
    }
}
