// Translation module - OpenAI ↔ Gemini web translation
// Author: kelexine (https://github.com/kelexine)

pub mod request;
pub mod response;
pub mod streaming;
pub mod tools;

pub use request::{build_prompt, validate_request, PromptPayload};
pub use response::{render_choices, translate_output, CompletionContext, RenderedChoice};
pub use streaming::{chunk_text, StreamStep, StreamTranslator};
pub use tools::{parse_tool_calls, ToolCallParse};
