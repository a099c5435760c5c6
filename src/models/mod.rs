//! Data models for the OpenAI-compatible API.
//!
//! This module contains:
//! - The inbound OpenAI Chat Completions types (`openai`)
//! - The model registry and alias resolution (`mapping`)
//! - Streaming chunk types and SSE framing (`streaming`)

// Author: kelexine (https://github.com/kelexine)

pub mod mapping;
pub mod openai;
pub mod streaming;

pub use mapping::{resolve_model, GeminiModel};
pub use openai::{
    AssistantMessage, ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse,
    ChatMessage, ContentBlock, FunctionCall, FunctionDefinition, MessageContent, Role, ToolCall,
    ToolDefinition, Usage,
};
pub use streaming::{ChatCompletionChunk, ChunkChoice, Delta, ToolCallDelta};
