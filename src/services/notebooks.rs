//! Notebook identifiers and conversation partitioning.
//!
//! A notebook is a topical bucket of conversation history. Turns carrying an
//! explicit tag keep it; untagged turns are classified by keyword rules.

use std::collections::HashMap;

/// Bucket for turns that match no notebook keyword rule.
pub const DEFAULT_NOTEBOOK_ID: &str = "general";

/// Role of a turn in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// One message in a conversation, as read from the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub notebook_id: Option<String>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            notebook_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            notebook_id: None,
        }
    }

    #[must_use]
    pub fn in_notebook(mut self, notebook_id: impl Into<String>) -> Self {
        self.notebook_id = Some(notebook_id.into());
        self
    }
}

/// A turn plus its position in the full history. The index is what later
/// stages use to slice "older than the recent window" and "most recent N".
#[derive(Debug, Clone, Copy)]
pub struct IndexedTurn<'a> {
    pub index: usize,
    pub turn: &'a ConversationTurn,
}

/// Per-notebook buckets of a conversation history, in encounter order.
#[derive(Debug, Default)]
pub struct NotebookStores<'a> {
    order: Vec<String>,
    buckets: HashMap<String, Vec<IndexedTurn<'a>>>,
}

impl<'a> NotebookStores<'a> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Known notebook ids, in first-encounter order
    #[must_use]
    pub fn notebook_ids(&self) -> &[String] {
        &self.order
    }

    /// Turns in a notebook, in history order. Unknown ids yield an empty slice.
    #[must_use]
    pub fn turns(&self, notebook_id: &str) -> &[IndexedTurn<'a>] {
        self.buckets
            .get(notebook_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn turn_count(&self, notebook_id: &str) -> usize {
        self.turns(notebook_id).len()
    }
}

/// Partitions a conversation history into per-notebook buckets.
///
/// An explicit non-default tag wins; otherwise the keyword classifier
/// decides. Every turn lands in exactly one bucket, order preserved.
#[must_use]
pub fn build_notebook_stores(history: &[ConversationTurn]) -> NotebookStores<'_> {
    let mut stores = NotebookStores::default();
    for (index, turn) in history.iter().enumerate() {
        let notebook_id = turn
            .notebook_id
            .as_deref()
            .map(normalize_notebook_id)
            .filter(|id| id != DEFAULT_NOTEBOOK_ID)
            .unwrap_or_else(|| classify_notebook_id_from_text(&turn.content));
        if !stores.buckets.contains_key(&notebook_id) {
            stores.order.push(notebook_id.clone());
        }
        stores
            .buckets
            .entry(notebook_id)
            .or_default()
            .push(IndexedTurn { index, turn });
    }
    stores
}

/// Reduces a raw notebook id to a usable key: lowercase, `[a-z0-9_-]` only.
/// Anything that reduces to nothing degrades to the default id.
#[must_use]
pub fn normalize_notebook_id(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|character| {
            character.is_ascii_alphanumeric() || *character == '-' || *character == '_'
        })
        .collect();
    if cleaned.is_empty() {
        DEFAULT_NOTEBOOK_ID.to_string()
    } else {
        cleaned
    }
}

/// Maps free text to one of the fixed notebook ids via keyword rules.
#[must_use]
pub fn classify_notebook_id_from_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    if is_client_text(&lowered) {
        return "clients".to_string();
    }
    if is_metrics_text(&lowered) {
        return "metrics".to_string();
    }
    if is_task_text(&lowered) {
        return "tasks".to_string();
    }
    if is_personal_text(&lowered) {
        return "personal".to_string();
    }
    DEFAULT_NOTEBOOK_ID.to_string()
}

fn is_client_text(lowered: &str) -> bool {
    let triggers = [
        "client",
        "invoice",
        "proposal",
        "contract",
        "billing",
        "retainer",
        "deliverable",
        "stakeholder",
    ];
    triggers.iter().any(|term| lowered.contains(term))
}

fn is_metrics_text(lowered: &str) -> bool {
    let triggers = [
        "points",
        "streak",
        "score",
        "metric",
        "velocity",
        "weekly total",
        "daily total",
    ];
    triggers.iter().any(|term| lowered.contains(term))
}

fn is_task_text(lowered: &str) -> bool {
    let triggers = [
        "task",
        "todo",
        "to-do",
        "deadline",
        "backlog",
        "subtask",
        "due date",
        "overdue",
        "priority",
        "checklist",
    ];
    triggers.iter().any(|term| lowered.contains(term))
}

fn is_personal_text(lowered: &str) -> bool {
    let triggers = [
        "gym",
        "workout",
        "family",
        "groceries",
        "vacation",
        "doctor",
        "birthday",
        "errand",
        "dinner",
    ];
    triggers.iter().any(|term| lowered.contains(term))
}
