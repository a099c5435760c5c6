// Synthetic SSE chunk sequence for streaming completions
// Author: kelexine (https://github.com/kelexine)

use super::response::{CompletionContext, RenderedChoice};
use crate::models::streaming::{ChatCompletionChunk, ChunkChoice, Delta, ToolCallDelta};
use tracing::debug;

/// One event of the synthetic stream.
#[derive(Debug, Clone)]
pub struct StreamStep {
    pub chunk: ChatCompletionChunk,
    /// Content steps are paced by the configured chunk delay.
    pub paced: bool,
}

/// Split `text` into pieces of at most `size` characters, never inside a
/// UTF-8 sequence.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Builds `chat.completion.chunk` objects that share one id and timestamp.
pub struct StreamTranslator {
    ctx: CompletionContext,
}

impl StreamTranslator {
    pub fn new(ctx: CompletionContext) -> Self {
        Self { ctx }
    }

    fn chunk(&self, index: u32, delta: Delta, finish_reason: Option<&str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.ctx.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.ctx.created,
            model: self.ctx.model.clone(),
            choices: vec![ChunkChoice {
                index,
                delta,
                finish_reason: finish_reason.map(str::to_string),
            }],
        }
    }

    /// The full event sequence for the rendered choices:
    /// role, reasoning, content pieces, tool calls, then the finish chunk.
    pub fn plan(&self, choices: &[RenderedChoice], chunk_size: usize) -> Vec<StreamStep> {
        let mut steps = Vec::new();

        for (index, choice) in choices.iter().enumerate() {
            let index = index as u32;

            steps.push(StreamStep {
                chunk: self.chunk(
                    index,
                    Delta {
                        role: Some("assistant".to_string()),
                        ..Default::default()
                    },
                    None,
                ),
                paced: false,
            });

            if let Some(reasoning) = &choice.reasoning {
                steps.push(StreamStep {
                    chunk: self.chunk(
                        index,
                        Delta {
                            reasoning_content: Some(reasoning.clone()),
                            ..Default::default()
                        },
                        None,
                    ),
                    paced: false,
                });
            }

            for piece in chunk_text(&choice.content, chunk_size) {
                steps.push(StreamStep {
                    chunk: self.chunk(
                        index,
                        Delta {
                            content: Some(piece),
                            ..Default::default()
                        },
                        None,
                    ),
                    paced: true,
                });
            }

            if !choice.tool_calls.is_empty() {
                let calls = choice
                    .tool_calls
                    .iter()
                    .enumerate()
                    .map(|(i, call)| ToolCallDelta {
                        index: i as u32,
                        call: call.clone(),
                    })
                    .collect();
                steps.push(StreamStep {
                    chunk: self.chunk(
                        index,
                        Delta {
                            tool_calls: Some(calls),
                            ..Default::default()
                        },
                        None,
                    ),
                    paced: false,
                });
            }

            steps.push(StreamStep {
                chunk: self.chunk(index, Delta::default(), Some(choice.finish_reason())),
                paced: false,
            });
        }

        debug!("Planned {} stream chunk(s) for {}", steps.len(), self.ctx.id);
        steps
    }
}
