// Response translation (Gemini candidates → OpenAI completion)
// Author: kelexine (https://github.com/kelexine)

use super::tools::parse_tool_calls;
use crate::gemini::{Candidate, ModelOutput};
use crate::models::openai::{
    AssistantMessage, ChatCompletionChoice, ChatCompletionResponse, ToolCall, Usage,
};
use tracing::debug;

/// Per-request values shared by the buffered and streamed shapes.
#[derive(Debug, Clone)]
pub struct CompletionContext {
    pub id: String,
    pub created: i64,
    /// Model id as the client requested it.
    pub model: String,
    pub n: u32,
    pub tools_requested: bool,
    pub conversation_id: Option<String>,
}

impl CompletionContext {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: completion_id(),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            n: 1,
            tools_requested: false,
            conversation_id: None,
        }
    }
}

/// One assistant choice after rendering and tool extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedChoice {
    pub content: String,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl RenderedChoice {
    pub fn finish_reason(&self) -> &'static str {
        if self.tool_calls.is_empty() {
            "stop"
        } else {
            "tool_calls"
        }
    }
}

/// `chatcmpl-` followed by 29 hex characters.
pub fn completion_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("chatcmpl-{}", &hex[..29])
}

/// Rough token count: four characters per token.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() / 4) as u32
}

pub fn estimate_usage(prompt: &str, completion: &str) -> Usage {
    let prompt_tokens = estimate_tokens(prompt);
    let completion_tokens = estimate_tokens(completion);
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
    }
}

/// Candidate text followed by one markdown line per web image.
pub fn render_candidate(candidate: &Candidate) -> String {
    let mut content = candidate.text.clone();
    for image in &candidate.images {
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str(&format!("![{}]({})", image.title, image.url));
    }
    content
}

/// Render the first `n` candidates, extracting tool calls when requested.
pub fn render_choices(output: &ModelOutput, n: u32, tools_requested: bool) -> Vec<RenderedChoice> {
    let mut candidates: Vec<&Candidate> = Vec::with_capacity(output.candidates.len());
    if let Some(chosen) = output.chosen_candidate() {
        candidates.push(chosen);
    }
    candidates.extend(
        output
            .candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != output.chosen)
            .map(|(_, c)| c),
    );

    candidates
        .into_iter()
        .take(n.max(1) as usize)
        .map(|candidate| {
            let rendered = render_candidate(candidate);
            let (content, tool_calls) = if tools_requested {
                parse_tool_calls(&rendered).into_parts()
            } else {
                (rendered, Vec::new())
            };
            RenderedChoice {
                content,
                reasoning: candidate.thoughts.clone(),
                tool_calls,
            }
        })
        .collect()
}

/// Build the non-streaming `chat.completion` body.
pub fn translate_output(
    output: &ModelOutput,
    ctx: &CompletionContext,
    prompt: &str,
) -> ChatCompletionResponse {
    let rendered = render_choices(output, ctx.n, ctx.tools_requested);

    let completion_text: String = rendered.iter().map(|c| c.content.as_str()).collect();
    let usage = estimate_usage(prompt, &completion_text);

    let choices = rendered
        .into_iter()
        .enumerate()
        .map(|(index, choice)| {
            let finish_reason = choice.finish_reason().to_string();
            ChatCompletionChoice {
                index: index as u32,
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content: Some(choice.content),
                    reasoning_content: choice.reasoning,
                    tool_calls: (!choice.tool_calls.is_empty()).then_some(choice.tool_calls),
                },
                finish_reason: Some(finish_reason),
            }
        })
        .collect::<Vec<_>>();

    debug!(
        "Translated Gemini output into {} choice(s) for {}",
        choices.len(),
        ctx.id
    );

    ChatCompletionResponse {
        id: ctx.id.clone(),
        object: "chat.completion".to_string(),
        created: ctx.created,
        model: ctx.model.clone(),
        choices,
        usage,
        conversation_id: ctx.conversation_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::{ChatMetadata, WebImage};

    fn output(texts: &[&str]) -> ModelOutput {
        ModelOutput {
            metadata: ChatMetadata::default(),
            candidates: texts
                .iter()
                .enumerate()
                .map(|(i, t)| Candidate {
                    rcid: format!("rc_{}", i),
                    text: t.to_string(),
                    ..Default::default()
                })
                .collect(),
            chosen: 0,
        }
    }

    #[test]
    fn test_completion_id_format() {
        let id = completion_id();
        assert!(id.starts_with("chatcmpl-"));
        assert_eq!(id.len(), "chatcmpl-".len() + 29);
    }

    #[test]
    fn test_basic_translation() {
        let ctx = CompletionContext::new("gpt-4");
        let response = translate_output(&output(&["Hello world"]), &ctx, "User: Hi there!");

        assert_eq!(response.object, "chat.completion");
        assert_eq!(response.model, "gpt-4");
        assert_eq!(response.choices.len(), 1);
        let choice = &response.choices[0];
        assert_eq!(choice.message.content.as_deref(), Some("Hello world"));
        assert_eq!(choice.finish_reason.as_deref(), Some("stop"));
        assert!(choice.message.tool_calls.is_none());
        assert_eq!(response.usage.prompt_tokens, 3);
        assert_eq!(response.usage.completion_tokens, 2);
        assert_eq!(response.usage.total_tokens, 5);
    }

    #[test]
    fn test_n_limits_choices() {
        let mut ctx = CompletionContext::new("gemini-2.0-flash");
        ctx.n = 2;
        let response = translate_output(&output(&["a", "b", "c"]), &ctx, "");
        assert_eq!(response.choices.len(), 2);
        assert_eq!(response.choices[1].index, 1);
        assert_eq!(response.choices[1].message.content.as_deref(), Some("b"));
    }

    #[test]
    fn test_tool_calls_only_when_requested() {
        let text = "<tool_call><tool_name>f</tool_name><parameters>{}</parameters></tool_call>";

        let mut ctx = CompletionContext::new("gemini-2.0-flash");
        let plain = translate_output(&output(&[text]), &ctx, "");
        assert_eq!(plain.choices[0].message.content.as_deref(), Some(text));

        ctx.tools_requested = true;
        let tooled = translate_output(&output(&[text]), &ctx, "");
        assert_eq!(tooled.choices[0].finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(tooled.choices[0].message.tool_calls.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_images_and_thoughts() {
        let mut out = output(&["Here is a cat"]);
        out.candidates[0].thoughts = Some("reasoning".to_string());
        out.candidates[0].images.push(WebImage {
            title: "Cat".to_string(),
            url: "https://img/cat.png".to_string(),
            alt: String::new(),
        });

        let response = translate_output(&out, &CompletionContext::new("gemini-2.5-pro"), "");
        let message = &response.choices[0].message;
        assert_eq!(
            message.content.as_deref(),
            Some("Here is a cat\n![Cat](https://img/cat.png)")
        );
        assert_eq!(message.reasoning_content.as_deref(), Some("reasoning"));
    }
}
