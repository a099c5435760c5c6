// Shared fixtures for integration tests
// Author: kelexine (https://github.com/kelexine)

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use gem2openai::config::AppConfig;
use gem2openai::error::{ProxyError, Result};
use gem2openai::gemini::{
    BackendStatus, Candidate, ChatMetadata, ChatSession, FileRef, GeminiBackend, ModelOutput,
};
use gem2openai::server::{create_router, AppState};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

pub const API_KEY: &str = "sk-test-integration-key-0123456789";

/// In-process backend that returns canned replies.
#[derive(Default)]
pub struct FakeBackend {
    pub reply: Mutex<String>,
    pub thoughts: Mutex<Option<String>>,
    pub fail: AtomicBool,
    pub missing_credentials: AtomicBool,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
    pub sessions_seen: Mutex<Vec<ChatMetadata>>,
}

impl FakeBackend {
    pub fn replying(text: &str) -> Arc<Self> {
        let backend = Self::default();
        *backend.reply.lock() = text.to_string();
        Arc::new(backend)
    }

    fn output(&self) -> Result<ModelOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProxyError::Upstream("HTTP 500 from StreamGenerate".to_string()));
        }
        Ok(ModelOutput {
            metadata: ChatMetadata {
                conversation_id: Some("c_fake".to_string()),
                response_id: Some(format!("r_{}", call)),
                choice_id: None,
            },
            candidates: vec![Candidate {
                rcid: format!("rc_{}", call),
                text: self.reply.lock().clone(),
                thoughts: self.thoughts.lock().clone(),
                images: Vec::new(),
            }],
            chosen: 0,
        })
    }
}

#[async_trait]
impl GeminiBackend for FakeBackend {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}

    async fn generate_content(
        &self,
        prompt: &str,
        _files: &[FileRef],
        _model: &str,
    ) -> Result<ModelOutput> {
        self.prompts.lock().push(prompt.to_string());
        self.output()
    }

    async fn start_chat(&self, model: &str) -> Result<ChatSession> {
        Ok(ChatSession::new(model))
    }

    async fn send_message(
        &self,
        session: &mut ChatSession,
        prompt: &str,
        _files: &[FileRef],
    ) -> Result<ModelOutput> {
        self.prompts.lock().push(prompt.to_string());
        self.sessions_seen.lock().push(session.metadata.clone());
        let output = self.output()?;
        session.absorb(&output);
        Ok(output)
    }

    async fn status(&self) -> BackendStatus {
        BackendStatus {
            initialized: true,
            credentials_configured: !self.missing_credentials.load(Ordering::SeqCst),
            generation: 0,
            last_refresh: None,
        }
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.api_keys = vec![API_KEY.to_string()];
    config.gemini.stream_chunk_delay_ms = 0;
    config.gemini.stream_chunk_size = 5;
    config
}

pub fn test_state(config: AppConfig, backend: Arc<FakeBackend>) -> AppState {
    let backend: Arc<dyn GeminiBackend> = backend;
    AppState::new(config, backend)
}

pub async fn send(state: AppState, request: Request<Body>) -> Response<Body> {
    create_router(state).oneshot(request).await.unwrap()
}

pub fn chat_request(key: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("authorization", format!("Bearer {}", key));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}
