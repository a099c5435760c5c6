// Request translation (OpenAI messages → Gemini prompt)
// Author: kelexine (https://github.com/kelexine)

use super::tools::tool_instruction_parts;
use crate::error::{ProxyError, Result};
use crate::gemini::FileRef;
use crate::models::openai::{ChatCompletionRequest, ChatMessage, ContentBlock, MessageContent, Role};
use tracing::debug;

/// Stand-in text for image blocks.
pub const IMAGE_PLACEHOLDER: &str = "[Image content - not supported in text mode]";

/// Closing line that nudges the model toward the tool convention.
const TOOL_CLOSING: &str =
    "Assistant: I'll help you with that. Let me use the appropriate tools to complete your request.";

/// Upper bound on `n`.
pub const MAX_CHOICES: u32 = 8;

/// A single Gemini prompt plus the attachments collected from the messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptPayload {
    pub prompt: String,
    pub files: Vec<FileRef>,
}

/// Reject malformed requests before any upstream call.
pub fn validate_request(req: &ChatCompletionRequest) -> Result<()> {
    if req.messages.is_empty() {
        return Err(ProxyError::invalid_param(
            "'messages' must contain at least one message",
            "messages",
        ));
    }

    fn check_range(value: Option<f32>, min: f32, max: f32, param: &str) -> Result<()> {
        match value {
            Some(v) if !(min..=max).contains(&v) => Err(ProxyError::invalid_param(
                format!("'{}' must be between {} and {}, got {}", param, min, max, v),
                param,
            )),
            _ => Ok(()),
        }
    }

    check_range(req.temperature, 0.0, 2.0, "temperature")?;
    check_range(req.top_p, 0.0, 1.0, "top_p")?;
    check_range(req.presence_penalty, -2.0, 2.0, "presence_penalty")?;
    check_range(req.frequency_penalty, -2.0, 2.0, "frequency_penalty")?;

    if req.max_tokens == Some(0) {
        return Err(ProxyError::invalid_param(
            "'max_tokens' must be at least 1",
            "max_tokens",
        ));
    }

    if let Some(n) = req.n {
        if n == 0 || n > MAX_CHOICES {
            return Err(ProxyError::invalid_param(
                format!("'n' must be between 1 and {}, got {}", MAX_CHOICES, n),
                "n",
            ));
        }
    }

    Ok(())
}

/// Flatten message content to text, collecting image references into `files`.
pub fn extract_text_content(content: &MessageContent, files: &mut Vec<FileRef>) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } if !text.is_empty() => Some(text.clone()),
                ContentBlock::ImageUrl { image_url } => {
                    files.push(image_url.url.clone());
                    Some(IMAGE_PLACEHOLDER.to_string())
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" "),
        MessageContent::Null(_) => String::new(),
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "System",
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::Tool | Role::Function => "Tool",
    }
}

fn render_messages(
    messages: &[ChatMessage],
    with_tools: bool,
    files: &mut Vec<FileRef>,
) -> Vec<String> {
    let mut parts = Vec::with_capacity(messages.len());
    for message in messages {
        let content = extract_text_content(&message.content, files);
        // The tool block already sets the system context.
        if with_tools
            && message.role == Role::System
            && content.to_lowercase().contains("tool")
        {
            continue;
        }
        parts.push(format!("{}: {}", role_label(message.role), content));
    }
    parts
}

/// Build the Gemini prompt for a request.
///
/// With `continuing` set, the upstream conversation already holds the
/// history, so only the messages after the last assistant turn are sent.
pub fn build_prompt(req: &ChatCompletionRequest, continuing: bool) -> PromptPayload {
    let with_tools = req.has_tools();

    let messages: &[ChatMessage] = if continuing {
        match req.messages.iter().rposition(|m| m.role == Role::Assistant) {
            Some(last) if last + 1 < req.messages.len() => &req.messages[last + 1..],
            Some(_) => &req.messages[req.messages.len() - 1..],
            None => &req.messages,
        }
    } else {
        &req.messages
    };

    let mut files = Vec::new();
    let mut parts = Vec::new();

    if with_tools {
        parts.extend(tool_instruction_parts(
            &req.legacy_functions(),
            &req.tool_functions(),
        ));
    }
    parts.extend(render_messages(messages, with_tools, &mut files));

    if with_tools {
        parts.push(TOOL_CLOSING.to_string());
    } else if !parts.last().is_some_and(|p| p.starts_with("User:")) {
        parts.push("Assistant:".to_string());
    }

    let prompt = parts.join("\n\n");
    debug!(
        "Built prompt from {} message(s), {} chars, tools: {}",
        messages.len(),
        prompt.len(),
        with_tools
    );

    PromptPayload { prompt, files }
}
