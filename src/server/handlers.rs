// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::auth::{UserContext, PERMISSION_CHAT, PERMISSION_MODELS};
use crate::error::{ProxyError, Result};
use crate::gemini::ModelOutput;
use crate::models::openai::{ChatCompletionRequest, ModelsResponse};
use crate::models::streaming::{error_sse, DONE_SSE, KEEP_ALIVE_SSE};
use crate::translation::{
    build_prompt, render_choices, translate_output, validate_request, CompletionContext,
    StreamStep, StreamTranslator,
};
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Header clients may use instead of the `conversation_id` body field.
pub const CONVERSATION_HEADER: &str = "x-conversation-id";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub service: String,
    pub timestamp: String,
    pub checks: BTreeMap<String, HealthCheck>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.backend.status().await;
    let mut checks = BTreeMap::new();

    let client_check = if status.initialized {
        HealthCheck {
            status: "ok".to_string(),
            message: "Gemini client initialized".to_string(),
        }
    } else {
        HealthCheck {
            status: "error".to_string(),
            message: "Gemini client not initialized".to_string(),
        }
    };
    checks.insert("gemini_client".to_string(), client_check);

    let credentials_check = if !status.credentials_configured {
        HealthCheck {
            status: "error".to_string(),
            message: "SECURE_1PSID / SECURE_1PSIDTS not configured".to_string(),
        }
    } else {
        let refreshed = status
            .last_refresh
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        HealthCheck {
            status: "ok".to_string(),
            message: format!(
                "Cookie generation {}, last refresh {}",
                status.generation, refreshed
            ),
        }
    };
    checks.insert("credentials".to_string(), credentials_check);

    let overall = if !status.credentials_configured {
        HealthStatus::Unhealthy
    } else if !status.initialized {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    Json(HealthResponse {
        status: overall,
        service: "openai-compatible-api".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks,
    })
}

/// Handler for `GET /v1/models`
pub async fn models_handler(Extension(user): Extension<UserContext>) -> Result<Json<ModelsResponse>> {
    let started = Instant::now();
    user.require(PERMISSION_MODELS)?;
    crate::metrics::record_request("/v1/models", 200, "none", started.elapsed());
    Ok(Json(crate::models::mapping::models_response()))
}

/// Handler for `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::gather_metrics(),
    )
}

fn conversation_id(req: &ChatCompletionRequest, headers: &HeaderMap) -> Option<String> {
    req.conversation_id
        .clone()
        .or_else(|| {
            headers
                .get(CONVERSATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

/// Handler for `POST /v1/chat/completions`
pub async fn chat_completions_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    let started = Instant::now();
    user.require(PERMISSION_CHAT)?;

    let body = body.map_err(|e| {
        warn!("Rejected chat request body: {}", e);
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ProxyError::PayloadTooLarge(super::routes::BODY_LIMIT_BYTES)
        } else {
            ProxyError::invalid_request(format!("Failed to read request body: {}", e))
        }
    })?;

    let req: ChatCompletionRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejected malformed chat request: {}", e);
        ProxyError::invalid_request(format!("Invalid request body: {}", e))
    })?;

    validate_request(&req)?;
    let model = crate::models::resolve_model(&req.model)?;

    info!(
        "Chat completion: user={}, model={} ({}), messages={}, stream={}",
        user.user_id,
        req.model,
        model.id,
        req.messages.len(),
        req.is_stream()
    );

    let conversation = conversation_id(&req, &headers);
    let result = run_completion(&state, &req, model.id, conversation.as_deref()).await;

    let (output, prompt) = match result {
        Ok(done) => done,
        Err(e) => {
            crate::metrics::record_request(
                "/v1/chat/completions",
                e.status_code().as_u16(),
                model.id,
                started.elapsed(),
            );
            return Err(e);
        }
    };

    let mut ctx = CompletionContext::new(req.model.clone());
    ctx.n = req.n.unwrap_or(1);
    ctx.tools_requested = req.has_tools();
    ctx.conversation_id = conversation.clone();

    let mut response = if req.is_stream() {
        stream_response(&state, &output, ctx)?
    } else {
        let completion = translate_output(&output, &ctx, &prompt);
        crate::metrics::record_tokens(
            model.id,
            completion.usage.prompt_tokens,
            completion.usage.completion_tokens,
        );
        Json(completion).into_response()
    };

    if let Some(id) = conversation {
        if let Ok(value) = HeaderValue::from_str(&id) {
            response.headers_mut().insert(CONVERSATION_HEADER, value);
        }
    }

    crate::metrics::record_request("/v1/chat/completions", 200, model.id, started.elapsed());
    Ok(response)
}

/// Calls the backend, statelessly or through a checked-out conversation.
async fn run_completion(
    state: &AppState,
    req: &ChatCompletionRequest,
    model: &str,
    conversation: Option<&str>,
) -> Result<(ModelOutput, String)> {
    let Some(id) = conversation else {
        let payload = build_prompt(req, false);
        debug!("Sending stateless prompt ({} chars)", payload.prompt.len());
        let output = state
            .backend
            .generate_content(&payload.prompt, &payload.files, model)
            .await?;
        return Ok((output, payload.prompt));
    };

    let (mut session, continuing) = match state.sessions.take(id) {
        Some(session) if session.model == model => (session, true),
        Some(_) => {
            debug!("Conversation {} switched model; starting fresh", id);
            (state.backend.start_chat(model).await?, false)
        }
        None => (state.backend.start_chat(model).await?, false),
    };

    let payload = build_prompt(req, continuing);
    debug!(
        "Sending turn for conversation {} ({} chars, continuing: {})",
        id,
        payload.prompt.len(),
        continuing
    );

    let result = state
        .backend
        .send_message(&mut session, &payload.prompt, &payload.files)
        .await;
    if result.is_ok() || continuing {
        state.sessions.put(id, session);
    }
    result.map(|output| (output, payload.prompt))
}

/// Synthetic SSE response over an already complete reply.
fn stream_response(state: &AppState, output: &ModelOutput, ctx: CompletionContext) -> Result<Response> {
    let choices = render_choices(output, ctx.n, ctx.tools_requested);
    let completion_id = ctx.id.clone();
    let steps = StreamTranslator::new(ctx).plan(&choices, state.config.gemini.stream_chunk_size);
    let delay = Duration::from_millis(state.config.gemini.stream_chunk_delay_ms);

    crate::metrics::record_sse_stream("opened");

    let sse_stream = sse_body(paced_chunks(steps, delay), completion_id);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(sse_stream))
        .map_err(|e| ProxyError::Internal(format!("Failed to build SSE response: {}", e)))
}

/// Frames chunk events with keep-alives; a failure becomes an error
/// event. Always ends with `[DONE]`.
fn sse_body<S>(
    chunks: S,
    completion_id: String,
) -> impl futures::Stream<Item = std::result::Result<String, Infallible>>
where
    S: futures::Stream<Item = Result<String>> + Send + 'static,
{
    async_stream::stream! {
        futures::pin_mut!(chunks);
        let mut failed = false;

        loop {
            tokio::select! {
                next = chunks.next() => {
                    match next {
                        Some(Ok(event)) => yield Ok::<String, Infallible>(event),
                        Some(Err(e)) => {
                            error!("Stream {} failed: {}", completion_id, e);
                            failed = true;
                            yield Ok(error_sse(&e.to_envelope()));
                            break;
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(KEEP_ALIVE_INTERVAL) => {
                    debug!("Yielding keep-alive for {}", completion_id);
                    yield Ok(KEEP_ALIVE_SSE.to_string());
                }
            }
        }

        yield Ok(DONE_SSE.to_string());
        crate::metrics::record_sse_stream(if failed { "error" } else { "completed" });
        debug!("SSE stream {} finished", completion_id);
    }
}

/// Serializes planned chunks, sleeping before each content piece.
fn paced_chunks(
    steps: Vec<StreamStep>,
    delay: Duration,
) -> impl futures::Stream<Item = Result<String>> {
    async_stream::stream! {
        for step in steps {
            if step.paced && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            yield step.chunk.to_sse();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_stream_failure_emits_error_then_done() {
        let chunks = stream::iter(vec![
            Ok("data: {\"chunk\":1}\n\n".to_string()),
            Err(ProxyError::Upstream("connection reset".to_string())),
            Ok("data: {\"chunk\":2}\n\n".to_string()),
        ]);

        let events: Vec<String> = sse_body(chunks, "chatcmpl-test".to_string())
            .map(|event| match event {
                Ok(event) => event,
                Err(never) => match never {},
            })
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], "data: {\"chunk\":1}\n\n");
        assert!(events[1].starts_with("data: {\"error\""));
        assert!(events[1].contains("upstream_unavailable"));
        assert!(!events[1].contains("connection reset"));
        assert_eq!(events[2], DONE_SSE);
    }

    #[tokio::test]
    async fn test_stream_success_ends_with_done() {
        let chunks = stream::iter(vec![Ok::<String, ProxyError>("data: {}\n\n".to_string())]);
        let events: Vec<_> = sse_body(chunks, "chatcmpl-test".to_string()).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], Ok(done) if done == DONE_SSE));
    }
}
