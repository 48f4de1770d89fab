//! Wire types and transport for OpenAI-compatible chat-completions APIs,
//! including native tool calling.

use color_eyre::Result;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::thread::sleep;
use std::time::Duration;
use tracing::warn;

use crate::agents::{ChatMessage, MessageRole};

// -- Tool calling types --

/// A tool definition sent in the request to enable native function calling
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// The function schema within a tool definition
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: JsonValue,
}

/// A tool call returned by the model in its response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolCallResponse {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub call_type: String,
    pub function: FunctionCallResponse,
}

/// The function name and arguments within a tool call response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionCallResponse {
    pub name: String,
    /// JSON-encoded arguments string
    pub arguments: String,
}

/// Unified chat response that includes both content and optional tool calls
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallResponse>,
}

// -- Request/response types --

#[derive(Debug, Serialize)]
pub struct OpenAIChatRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls made by the assistant (present when role = "assistant")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
    /// The ID of the tool call this message is responding to (present when role = "tool")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChatResponse {
    pub choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIChoiceMessage,
}

/// The message inside a choice -- separate from OpenAIMessage to handle nullable content
#[derive(Debug, Deserialize)]
pub struct OpenAIChoiceMessage {
    /// Content may be null when the model only makes tool calls
    pub content: Option<String>,
    /// Tool calls requested by the model
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

// -- Conversion helpers --

/// Converts internal `ChatMessage` list to OpenAI-compatible messages
#[must_use]
pub fn convert_messages(messages: &[ChatMessage]) -> Vec<OpenAIMessage> {
    messages
        .iter()
        .map(|message| {
            let role = match message.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::Tool => "tool",
            };

            OpenAIMessage {
                role: role.to_string(),
                content: Some(message.content.clone()),
                tool_calls: message.tool_calls.clone(),
                tool_call_id: message.tool_call_id.clone(),
            }
        })
        .collect()
}

/// Extracts a full ChatResponse (content + tool_calls) from an OpenAI-style response
pub fn extract_chat_response(response: OpenAIChatResponse) -> Result<ChatResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| color_eyre::eyre::eyre!("chat response missing choices"))?;

    Ok(ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls: choice.message.tool_calls.unwrap_or_default(),
    })
}

/// Builds a `reqwest::blocking::Client` with standard timeouts
pub fn build_client() -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()?)
}

/// Posts a chat request, retrying transient failures (429 and 5xx) with a
/// short backoff. Other error statuses fail immediately.
pub fn send_chat_request(
    client: &Client,
    chat_url: &str,
    api_key: Option<&str>,
    request: &OpenAIChatRequest,
) -> Result<OpenAIChatResponse> {
    let mut last_error: Option<color_eyre::Report> = None;
    let delays = [200, 500, 1000];
    for (attempt, delay) in delays.iter().enumerate() {
        let mut builder = client.post(chat_url).json(request);
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }

        match builder.send() {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response.json()?);
                }

                let details = response.text().unwrap_or_default();
                if status.as_u16() == 429 || status.as_u16() >= 500 {
                    warn!(status = status.as_u16(), attempt, "chat API error, retrying");
                    last_error = Some(color_eyre::eyre::eyre!(
                        "chat API error ({}): {}",
                        status,
                        details
                    ));
                } else {
                    return Err(color_eyre::eyre::eyre!(
                        "chat API error: {} {}",
                        status,
                        details
                    ));
                }
            }
            Err(error) => {
                warn!(attempt, "chat request error: {}", error);
                last_error = Some(color_eyre::eyre::eyre!("chat request error: {}", error));
            }
        }

        if attempt < delays.len() - 1 {
            sleep(Duration::from_millis(*delay));
        }
    }

    Err(last_error
        .unwrap_or_else(|| color_eyre::eyre::eyre!("chat request failed after retries")))
}
