// Model registry (OpenAI ids → Gemini web models)
// Author: kelexine (https://github.com/kelexine)

use super::openai::{ModelInfo, ModelsResponse};
use crate::error::{ProxyError, Result};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Fixed `created` timestamp reported in model listings.
pub const MODEL_CREATED: i64 = 1677610602;

/// A Gemini web model the bridge can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeminiModel {
    pub id: &'static str,
    /// Value of the `x-goog-ext-525001261-jspb` header; `None` lets Gemini pick.
    pub header: Option<&'static str>,
}

const MODELS: &[GeminiModel] = &[
    GeminiModel {
        id: "gemini-2.0-flash",
        header: Some(r#"[1,null,null,null,"f299729663a2343f"]"#),
    },
    GeminiModel {
        id: "gemini-2.0-flash-thinking",
        header: Some(r#"[null,null,null,null,"7ca48d02d802f20a"]"#),
    },
    GeminiModel {
        id: "gemini-2.5-flash",
        header: Some(r#"[1,null,null,null,"35609594dbe934d8"]"#),
    },
    GeminiModel {
        id: "gemini-2.5-pro",
        header: Some(r#"[1,null,null,null,"2525e3954d185b3c"]"#),
    },
    GeminiModel {
        id: "unspecified",
        header: None,
    },
];

static ALIAS_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();

fn get_alias_map() -> &'static HashMap<&'static str, &'static str> {
    ALIAS_MAP.get_or_init(|| {
        let mut m = HashMap::new();

        // Common OpenAI ids that clients hardcode
        m.insert("gpt-4", "gemini-2.0-flash");
        m.insert("gpt-4-turbo", "gemini-2.0-flash");
        m.insert("gpt-3.5-turbo", "gemini-2.0-flash");

        m
    })
}

/// All supported models, default first.
pub fn supported_models() -> &'static [GeminiModel] {
    MODELS
}

/// Resolve a requested model id (or alias) to a Gemini model.
pub fn resolve_model(requested: &str) -> Result<GeminiModel> {
    let name = requested.trim();
    let target = get_alias_map().get(name).copied().unwrap_or(name);

    MODELS
        .iter()
        .find(|m| m.id == target)
        .copied()
        .ok_or_else(|| ProxyError::ModelNotFound(requested.to_string()))
}

/// Body for `GET /v1/models`.
pub fn models_response() -> ModelsResponse {
    ModelsResponse {
        object: "list".to_string(),
        data: MODELS
            .iter()
            .map(|m| ModelInfo {
                id: m.id.to_string(),
                object: "model".to_string(),
                created: MODEL_CREATED,
                owned_by: "google".to_string(),
            })
            .collect(),
    }
}
