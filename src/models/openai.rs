//! OpenAI Chat Completions API type definitions.
//!
//! These types deserialize incoming requests from OpenAI-compatible clients
//! and serialize completion objects, model listings and streaming chunks back
//! to them.

// Author: kelexine (https://github.com/kelexine)

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// OpenAI chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// ID of the model to use.
    pub model: String,

    /// The conversation so far.
    pub messages: Vec<ChatMessage>,

    /// Whether to stream back partial progress as server-sent events.
    #[serde(default)]
    pub stream: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Number of choices to return (bounded by the candidates Gemini offers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Deprecated function definitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<FunctionDefinition>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<Value>,

    /// Extension: continue a server-side Gemini conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatCompletionRequest {
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Definitions from the deprecated `functions` field.
    pub fn legacy_functions(&self) -> Vec<&FunctionDefinition> {
        self.functions.iter().flatten().collect()
    }

    /// Function definitions carried by `tools` entries.
    pub fn tool_functions(&self) -> Vec<&FunctionDefinition> {
        self.tools
            .iter()
            .flatten()
            .filter_map(|t| t.function.as_ref())
            .collect()
    }

    /// Tool and function definitions, flattened.
    pub fn declared_functions(&self) -> Vec<&FunctionDefinition> {
        let mut out = self.legacy_functions();
        out.extend(self.tool_functions());
        out
    }

    pub fn has_tools(&self) -> bool {
        !self.declared_functions().is_empty()
    }
}

/// A chat message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,

    #[serde(default)]
    pub content: MessageContent,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role(Role::System, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, text)
    }

    fn with_role(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            name: None,
            function_call: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Newer clients send `developer` for system-level instructions.
    #[serde(alias = "developer")]
    System,
    User,
    Assistant,
    Tool,
    Function,
}

/// Message content is either a plain string or an array of blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Null(Option<()>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Null(None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Function definition for function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Tool definition for tool calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type", default = "default_tool_type")]
    pub tool_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDefinition>,
}

fn default_tool_type() -> String {
    "function".to_string()
}

/// A parsed tool call in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

/// Response for a non-streaming chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: Option<String>,
    /// Gemini "thoughts", when the model exposes them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Usage statistics. Gemini web does not report tokens, so these are
/// estimated at four characters per token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A model entry for `/v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_and_block_content() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "gemini-2.0-flash",
            "messages": [
                {"role": "system", "content": "Be brief"},
                {"role": "user", "content": [
                    {"type": "text", "text": "What is this?"},
                    {"type": "image_url", "image_url": {"url": "https://example.com/a.png"}}
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(req.messages.len(), 2);
        assert!(matches!(req.messages[0].content, MessageContent::Text(_)));
        match &req.messages[1].content {
            MessageContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                assert!(matches!(blocks[1], ContentBlock::ImageUrl { .. }));
            }
            other => panic!("expected blocks, got {:?}", other),
        }
        assert!(!req.is_stream());
    }

    #[test]
    fn test_null_content_and_tool_role() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{"id": "call_1", "type": "function",
                            "function": {"name": "f", "arguments": "{}"}}]
        }))
        .unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert!(matches!(msg.content, MessageContent::Null(None)));

        let tool: ChatMessage = serde_json::from_value(json!({
            "role": "tool", "tool_call_id": "call_1", "content": "42"
        }))
        .unwrap();
        assert_eq!(tool.role, Role::Tool);
    }

    #[test]
    fn test_declared_functions_merge_tools_and_functions() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
            "functions": [{"name": "legacy"}],
            "tools": [{"type": "function", "function": {"name": "get_weather"}}]
        }))
        .unwrap();

        let names: Vec<_> = req.declared_functions().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["legacy", "get_weather"]);
        assert!(req.has_tools());
    }
}
