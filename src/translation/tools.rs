// Tool prompt convention and tool-call extraction
// Author: kelexine (https://github.com/kelexine)

use crate::models::openai::{FunctionCall, FunctionDefinition, ToolCall};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

static TOOL_CALL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)<tool_call>\s*<tool_name>(.*?)</tool_name>\s*<parameters>(.*?)</parameters>\s*</tool_call>",
    )
    .expect("valid tool call regex")
});

/// Content used when the reply consisted only of tool-call markup.
pub const TOOL_ONLY_PLACEHOLDER: &str = "I'll use the appropriate tools to help you with that.";

const TOOL_INSTRUCTION: &str = "You are an AI assistant with access to tools. When the user asks you \
to perform actions that require tools, you MUST use the appropriate tools instead of just describing \
what to do.

IMPORTANT: When you need to use a tool, respond with the tool call in this exact format:
<tool_call>
<tool_name>function_name</tool_name>
<parameters>
{
  \"parameter1\": \"value1\",
  \"parameter2\": \"value2\"
}
</parameters>
</tool_call>

Do NOT just describe what you would do - actually use the tools when appropriate.";

/// Outcome of scanning a reply for tool calls.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallParse {
    /// At least one well-formed call; markup removed from the text.
    Calls {
        calls: Vec<ToolCall>,
        remaining_text: String,
    },
    /// No usable call; the text is untouched.
    PlainText(String),
}

impl ToolCallParse {
    /// Message content and tool calls, in response order.
    pub fn into_parts(self) -> (String, Vec<ToolCall>) {
        match self {
            ToolCallParse::Calls {
                calls,
                remaining_text,
            } => (remaining_text, calls),
            ToolCallParse::PlainText(text) => (text, Vec::new()),
        }
    }
}

/// Prompt parts that describe the tool-call convention and the tools.
///
/// Returns the `System:` instruction followed by an `Available Functions:`
/// list for legacy `functions` and an `Available Tools:` list for `tools`,
/// each only when non-empty.
pub fn tool_instruction_parts(
    functions: &[&FunctionDefinition],
    tools: &[&FunctionDefinition],
) -> Vec<String> {
    let mut parts = vec![format!("System: {}", TOOL_INSTRUCTION)];
    parts.extend(definition_listing("Available Functions:", functions));
    parts.extend(definition_listing("Available Tools:", tools));
    parts
}

fn definition_listing(header: &str, definitions: &[&FunctionDefinition]) -> Option<String> {
    if definitions.is_empty() {
        return None;
    }

    let mut listing = String::from(header);
    for func in definitions {
        listing.push_str("\n- ");
        listing.push_str(&func.name);
        if let Some(description) = func.description.as_deref().filter(|d| !d.is_empty()) {
            listing.push_str(": ");
            listing.push_str(description);
        }
        if let Some(parameters) = &func.parameters {
            let pretty = serde_json::to_string_pretty(parameters).unwrap_or_default();
            listing.push_str("\n  Parameters: ");
            listing.push_str(&pretty);
        }
    }
    Some(listing)
}

/// `call_` followed by 24 hex characters.
pub fn generate_call_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("call_{}", &hex[..24])
}

/// Extract `<tool_call>` blocks from model text.
///
/// Blocks whose parameters are not valid JSON are skipped. If none survive,
/// the text is returned unchanged as `PlainText`.
pub fn parse_tool_calls(text: &str) -> ToolCallParse {
    let mut calls = Vec::new();

    for caps in TOOL_CALL_PATTERN.captures_iter(text) {
        let name = caps[1].trim();
        let raw_params = caps[2].trim();

        match serde_json::from_str::<Value>(raw_params) {
            Ok(arguments) if !name.is_empty() => {
                debug!("Parsed tool call: {}", name);
                calls.push(ToolCall {
                    id: generate_call_id(),
                    call_type: "function".to_string(),
                    function: FunctionCall {
                        name: name.to_string(),
                        arguments: arguments.to_string(),
                    },
                });
            }
            Ok(_) => warn!("Skipping tool call without a name"),
            Err(e) => warn!("Failed to parse parameters for tool call '{}': {}", name, e),
        }
    }

    if calls.is_empty() {
        return ToolCallParse::PlainText(text.to_string());
    }

    info!("Found {} tool call(s) in response", calls.len());

    let stripped = TOOL_CALL_PATTERN.replace_all(text, "");
    let remaining = stripped.trim();
    let remaining_text = if remaining.is_empty() {
        TOOL_ONLY_PLACEHOLDER.to_string()
    } else {
        remaining.to_string()
    };

    ToolCallParse::Calls {
        calls,
        remaining_text,
    }
}
