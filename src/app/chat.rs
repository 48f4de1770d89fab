//! Chat request handling: context assembly, LLM calls, and the
//! decomposition tool round.

pub mod context;
pub mod decompose;
pub mod intent;

use color_eyre::Result;
use tracing::{debug, info};

use crate::agents::{Agent, AgentManager, ChatMessage};
use crate::app::chat::context::{ContextBlock, ContextRequest, build_merged_context_block};
use crate::app::chat::decompose::{
    DecompositionRequest, build_decomposition_rag_context, decompose_tool_definition,
    parse_decompose_call, should_force_decomposition,
};
use crate::app::chat::intent::classify_task_domain;
use crate::services::notebooks::ConversationTurn;
use crate::services::routing::{RoutingMetadata, RoutingOptions};
use crate::storage::SessionStore;

const CHAT_AGENT: &str = "chat";
const DECOMPOSE_AGENT: &str = "decompose";

/// The outcome of one chat exchange
#[derive(Debug)]
pub struct ChatReply {
    pub content: String,
    pub routing: RoutingMetadata,
    pub decomposed: bool,
}

/// Drives one conversation stream: holds the history snapshot, routes
/// context per turn, and talks to the LLM through the injected manager.
pub struct ChatEngine {
    manager: AgentManager,
    store: SessionStore,
    history: Vec<ConversationTurn>,
    options: RoutingOptions,
    avoidance: Option<String>,
}

impl ChatEngine {
    pub fn new(
        manager: AgentManager,
        store: SessionStore,
        options: RoutingOptions,
        avoidance: Option<String>,
    ) -> Result<Self> {
        let history = store.load_turns()?;
        info!(turns = history.len(), "session history loaded");
        Ok(Self {
            manager,
            store,
            history,
            options,
            avoidance,
        })
    }

    /// Pins all routing to one notebook until [`Self::clear_pin`]
    pub fn pin_notebook(&mut self, notebook_id: &str) {
        self.options.notebook_id = Some(notebook_id.to_string());
    }

    pub fn clear_pin(&mut self) {
        self.options.notebook_id = None;
        self.options.mode = None;
    }

    pub fn set_avoidance(&mut self, text: &str) {
        let trimmed = text.trim();
        self.avoidance = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
    }

    #[must_use]
    pub fn pinned_notebook(&self) -> Option<&str> {
        self.options.notebook_id.as_deref()
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Builds the context block for a message without calling the LLM
    #[must_use]
    pub fn build_context(&self, latest_user_message: &str) -> ContextBlock {
        build_merged_context_block(ContextRequest {
            history: &self.history,
            latest_user_message,
            avoidance_context: self.avoidance.as_deref(),
            options: &self.options,
        })
    }

    /// Runs one full exchange: context, LLM round(s), history append.
    pub fn send_message(&mut self, text: &str) -> Result<ChatReply> {
        let block = self.build_context(text);
        info!(
            mode = block.routing.mode.label(),
            notebooks = %block.routing.selected_notebook_ids.join(","),
            retrieved = block.retrieved_turns.len(),
            "context assembled"
        );

        let domain = classify_task_domain(text);
        let force_decomposition = should_force_decomposition(text, domain);
        debug!(?domain, force_decomposition, "intent classified");

        let agent = self.chat_agent()?;
        let mut system_prompt = format!("{}\n\n{}", agent.system_prompt, block.text);
        if force_decomposition {
            system_prompt.push_str(
                "\n\nThe user wants this task broken into subtasks. Call the decompose_task tool.",
            );
        }

        let mut messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(text)];
        let tools = if force_decomposition {
            Some(vec![decompose_tool_definition()])
        } else {
            None
        };
        let response = self.manager.chat_with_tools(&agent, &messages, tools)?;

        let mut decomposed = false;
        let content = match parse_decompose_call(&response.tool_calls) {
            Some((call_id, title)) => {
                decomposed = true;
                let subtasks = self.run_decomposition(&title, &block)?;
                messages.push(ChatMessage::assistant_with_tool_calls(
                    response.tool_calls.clone(),
                ));
                messages.push(ChatMessage::tool_result(call_id, subtasks.as_str()));
                let follow_up = self.manager.chat_with_tools(&agent, &messages, None)?;
                if follow_up.content.trim().is_empty() {
                    subtasks
                } else {
                    follow_up.content
                }
            }
            None => response.content,
        };

        let mut user_turn = ConversationTurn::user(text);
        if let Some(pinned) = &self.options.notebook_id {
            user_turn = user_turn.in_notebook(pinned.clone());
        }
        self.append_turn(user_turn)?;
        self.append_turn(ConversationTurn::assistant(content.as_str()))?;

        Ok(ChatReply {
            content,
            routing: block.routing,
            decomposed,
        })
    }

    fn run_decomposition(&self, title: &str, block: &ContextBlock) -> Result<String> {
        let rag_context = build_decomposition_rag_context(DecompositionRequest {
            latest_user_message: title,
            recent_turns: &block.recent_turns,
            retrieved_turns: &block.retrieved_turns,
            routing: &block.routing,
            max_chars: None,
        });
        let agent = match self.manager.get_agent(DECOMPOSE_AGENT) {
            Some(agent) => agent.clone(),
            None => self.chat_agent()?,
        };
        let messages = vec![
            ChatMessage::system(format!("{}\n\n{}", agent.system_prompt, rag_context)),
            ChatMessage::user(format!("Decompose this task: {}", title)),
        ];
        self.manager.chat(&agent, &messages)
    }

    fn chat_agent(&self) -> Result<Agent> {
        self.manager
            .get_agent(CHAT_AGENT)
            .cloned()
            .ok_or_else(|| color_eyre::eyre::eyre!("Agent '{}' not configured", CHAT_AGENT))
    }

    fn append_turn(&mut self, turn: ConversationTurn) -> Result<()> {
        self.store.append_turn(&turn)?;
        self.history.push(turn);
        Ok(())
    }
}
