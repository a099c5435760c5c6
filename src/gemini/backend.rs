// Gemini backend seam and reply types
// Author: kelexine (https://github.com/kelexine)

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Conversation identifiers returned by Gemini (`cid`, `rid`, `rcid`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatMetadata {
    pub conversation_id: Option<String>,
    pub response_id: Option<String>,
    pub choice_id: Option<String>,
}

impl ChatMetadata {
    pub fn is_empty(&self) -> bool {
        self.conversation_id.is_none() && self.response_id.is_none() && self.choice_id.is_none()
    }
}

/// Image found by Gemini's web search and attached to a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebImage {
    pub title: String,
    pub url: String,
    pub alt: String,
}

/// One reply draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub rcid: String,
    pub text: String,
    pub thoughts: Option<String>,
    pub images: Vec<WebImage>,
}

/// Parsed reply from a single generate call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelOutput {
    pub metadata: ChatMetadata,
    pub candidates: Vec<Candidate>,
    pub chosen: usize,
}

impl ModelOutput {
    pub fn chosen_candidate(&self) -> Option<&Candidate> {
        self.candidates.get(self.chosen)
    }

    /// Text of the chosen candidate.
    pub fn text(&self) -> &str {
        self.chosen_candidate().map(|c| c.text.as_str()).unwrap_or("")
    }

    pub fn thoughts(&self) -> Option<&str> {
        self.chosen_candidate().and_then(|c| c.thoughts.as_deref())
    }
}

/// A multi-turn Gemini conversation.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub metadata: ChatMetadata,
    pub model: String,
}

impl ChatSession {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            metadata: ChatMetadata::default(),
            model: model.into(),
        }
    }

    /// Adopt the identifiers of the latest reply so the next turn continues it.
    pub fn absorb(&mut self, output: &ModelOutput) {
        if let Some(cid) = &output.metadata.conversation_id {
            self.metadata.conversation_id = Some(cid.clone());
        }
        if let Some(rid) = &output.metadata.response_id {
            self.metadata.response_id = Some(rid.clone());
        }
        if let Some(candidate) = output.chosen_candidate() {
            if !candidate.rcid.is_empty() {
                self.metadata.choice_id = Some(candidate.rcid.clone());
            }
        }
    }
}

/// Snapshot of backend health for `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub initialized: bool,
    pub credentials_configured: bool,
    pub generation: u64,
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Attachment reference collected from image content blocks.
pub type FileRef = String;

/// Upstream conversational backend.
///
/// The HTTP layer only talks to this trait; the web transport implements it
/// and tests substitute an in-process fake.
#[async_trait]
pub trait GeminiBackend: Send + Sync {
    /// Startup hook: acquire session tokens and start background work.
    async fn init(&self) -> Result<()>;

    /// Teardown hook: stop background work.
    async fn close(&self);

    /// One-shot generation without conversation state.
    async fn generate_content(
        &self,
        prompt: &str,
        files: &[FileRef],
        model: &str,
    ) -> Result<ModelOutput>;

    /// Open a new conversation bound to `model`.
    async fn start_chat(&self, model: &str) -> Result<ChatSession>;

    /// Send a turn within `session`, updating its metadata from the reply.
    async fn send_message(
        &self,
        session: &mut ChatSession,
        prompt: &str,
        files: &[FileRef],
    ) -> Result<ModelOutput>;

    async fn status(&self) -> BackendStatus;
}
