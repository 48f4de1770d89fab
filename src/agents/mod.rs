pub mod openai_compat;

use color_eyre::Result;
use reqwest::blocking::Client;
use std::collections::HashMap;

use crate::config::Config;
use openai_compat::{ChatResponse, ToolCallResponse, ToolDefinition};

/// An AI agent with its configuration
#[derive(Debug, Clone)]
pub struct Agent {
    pub name: String,
    pub model: String,
    pub system_prompt: String,
}

/// A message in the conversation sent to the LLM
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// Tool calls made by the assistant (for native tool calling)
    pub tool_calls: Option<Vec<ToolCallResponse>>,
    /// The ID of the tool call this message responds to (role = Tool)
    pub tool_call_id: Option<String>,
}

/// Role of a message in the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// An assistant turn that carries the tool calls the model made
    pub fn assistant_with_tool_calls(calls: Vec<ToolCallResponse>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: String::new(),
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// A tool-result turn answering the given call id
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Manages AI agents and their interaction with an OpenAI-compatible backend
pub struct AgentManager {
    client: Client,
    chat_url: String,
    api_key: Option<String>,
    agents: HashMap<String, Agent>,
}

impl AgentManager {
    /// Creates a new agent manager from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let mut agents = HashMap::new();
        for (name, agent_config) in &config.agents {
            agents.insert(
                name.clone(),
                Agent {
                    name: name.clone(),
                    model: agent_config.model.clone(),
                    system_prompt: agent_config.system_prompt.clone(),
                },
            );
        }

        let api_key = if config.llm.api_key.trim().is_empty() {
            None
        } else {
            Some(config.llm.api_key.clone())
        };

        Ok(Self {
            client: openai_compat::build_client()?,
            chat_url: format!("{}/chat/completions", config.llm.base_url.trim_end_matches('/')),
            api_key,
            agents,
        })
    }

    /// Gets an agent by name
    #[must_use]
    pub fn get_agent(&self, name: &str) -> Option<&Agent> {
        self.agents.get(name)
    }

    /// Sends a plain chat request and returns the reply text
    pub fn chat(&self, agent: &Agent, messages: &[ChatMessage]) -> Result<String> {
        let response = self.chat_with_tools(agent, messages, None)?;
        Ok(response.content)
    }

    /// Sends a chat request, optionally advertising tools the model may call
    pub fn chat_with_tools(
        &self,
        agent: &Agent,
        messages: &[ChatMessage],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse> {
        let request = openai_compat::OpenAIChatRequest {
            model: agent.model.clone(),
            messages: openai_compat::convert_messages(messages),
            stream: false,
            tools,
        };
        let response = openai_compat::send_chat_request(
            &self.client,
            &self.chat_url,
            self.api_key.as_deref(),
            &request,
        )?;
        openai_compat::extract_chat_response(response)
    }
}
