// OpenAI streaming chunk types
// Author: kelexine (https://github.com/kelexine)

use super::openai::ToolCall;
use crate::error::{ErrorEnvelope, Result};
use serde::{Deserialize, Serialize};

/// Terminal sentinel of an OpenAI event stream.
pub const DONE_SSE: &str = "data: [DONE]\n\n";

/// SSE comment line used as a keep-alive; clients ignore it.
pub const KEEP_ALIVE_SSE: &str = ": keep-alive\n\n";

/// `chat.completion.chunk` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

/// Incremental message fields; absent fields are omitted from the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Streaming form of a tool call; carries its position in the call list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(flatten)]
    pub call: ToolCall,
}

impl ChatCompletionChunk {
    /// Format as a Server-Sent Event
    pub fn to_sse(&self) -> Result<String> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

/// Format an error envelope as a terminal stream event.
pub fn error_sse(envelope: &ErrorEnvelope) -> String {
    let data = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());
    format!("data: {}\n\n", data)
}
