// HTTP surface tests against an in-process backend
// Author: kelexine (https://github.com/kelexine)

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;

fn hello() -> Value {
    json!({
        "model": "gemini-2.0-flash",
        "messages": [{"role": "user", "content": "Hello"}]
    })
}

#[tokio::test]
async fn test_chat_completion_success() {
    let backend = FakeBackend::replying("Hi there!");
    let state = test_state(test_config(), backend.clone());

    let response = send(state, chat_request(Some(API_KEY), hello())).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "gemini-2.0-flash");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "Hi there!");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert!(body["usage"]["total_tokens"].as_u64().unwrap() > 0);

    assert_eq!(backend.prompts.lock().as_slice(), ["User: Hello"]);
}

#[tokio::test]
async fn test_alias_model_is_echoed() {
    let backend = FakeBackend::replying("ok");
    let state = test_state(test_config(), backend);

    let mut body = hello();
    body["model"] = json!("gpt-4");
    let response = send(state, chat_request(Some(API_KEY), body)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["model"], "gpt-4");
}

#[tokio::test]
async fn test_missing_api_key() {
    let state = test_state(test_config(), FakeBackend::replying("unused"));
    let response = send(state, chat_request(None, hello())).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_api_key");
}

#[tokio::test]
async fn test_invalid_api_key() {
    let backend = FakeBackend::replying("unused");
    let state = test_state(test_config(), backend.clone());
    let response = send(state, chat_request(Some("sk-not-a-real-key"), hello())).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_messages_rejected() {
    let backend = FakeBackend::replying("unused");
    let state = test_state(test_config(), backend.clone());
    let response = send(
        state,
        chat_request(Some(API_KEY), json!({"model": "gemini-2.0-flash", "messages": []})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["param"], "messages");
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let state = test_state(test_config(), FakeBackend::replying("unused"));
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("authorization", format!("Bearer {}", API_KEY))
        .body(Body::from("{not json"))
        .unwrap();

    let response = send(state, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn test_lowercase_bearer_scheme_accepted() {
    let state = test_state(test_config(), FakeBackend::replying("Hi"));
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("authorization", format!("bearer {}", API_KEY))
        .body(Body::from(hello().to_string()))
        .unwrap();

    let response = send(state, request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_utf8_body_gets_error_envelope() {
    let state = test_state(test_config(), FakeBackend::replying("unused"));
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", API_KEY))
        .body(Body::from(vec![0xff, 0xfe, b'{']))
        .unwrap();

    let response = send(state, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_request");
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_oversized_body_gets_error_envelope() {
    let state = test_state(test_config(), FakeBackend::replying("unused"));
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", API_KEY))
        .body(Body::from(vec![b' '; 10 * 1024 * 1024 + 1]))
        .unwrap();

    let response = send(state, request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["error"]["code"], "request_too_large");
}

#[tokio::test]
async fn test_unknown_model_rejected() {
    let state = test_state(test_config(), FakeBackend::replying("unused"));
    let mut body = hello();
    body["model"] = json!("claude-3-opus");

    let response = send(state, chat_request(Some(API_KEY), body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "model_not_found");
}

#[tokio::test]
async fn test_upstream_failure_hides_details() {
    let backend = FakeBackend::replying("unused");
    backend.fail.store(true, Ordering::SeqCst);
    let state = test_state(test_config(), backend);

    let response = send(state, chat_request(Some(API_KEY), hello())).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let text = body_string(response).await;
    assert!(!text.contains("StreamGenerate"));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["error"]["type"], "service_unavailable");
}

#[tokio::test]
async fn test_streaming_failure_is_plain_error() {
    let backend = FakeBackend::replying("unused");
    backend.fail.store(true, Ordering::SeqCst);
    let state = test_state(test_config(), backend);

    let mut body = hello();
    body["stream"] = json!(true);
    let response = send(state, chat_request(Some(API_KEY), body)).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/json"));
}

#[tokio::test]
async fn test_streaming_matches_buffered() {
    let reply = "Streaming replies arrive in small pieces. ✓ done";
    let backend = FakeBackend::replying(reply);
    let state = test_state(test_config(), backend);

    let mut body = hello();
    body["stream"] = json!(true);
    let response = send(state, chat_request(Some(API_KEY), body)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let text = body_string(response).await;
    assert!(text.ends_with("data: [DONE]\n\n"));

    let events: Vec<&str> = text
        .split("\n\n")
        .filter_map(|e| e.strip_prefix("data: "))
        .filter(|e| *e != "[DONE]")
        .collect();
    assert!(events.len() > 3);

    let chunks: Vec<Value> = events
        .iter()
        .map(|e| serde_json::from_str(e).unwrap())
        .collect();

    let first_id = chunks[0]["id"].as_str().unwrap().to_string();
    assert!(chunks.iter().all(|c| c["id"] == first_id.as_str()));
    assert!(chunks.iter().all(|c| c["object"] == "chat.completion.chunk"));
    assert_eq!(chunks[0]["choices"][0]["delta"]["role"], "assistant");

    let content: String = chunks
        .iter()
        .filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
        .collect();
    assert_eq!(content, reply);

    let last = chunks.last().unwrap();
    assert_eq!(last["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn test_conversation_continues_upstream_session() {
    let backend = FakeBackend::replying("Noted.");
    let state = test_state(test_config(), backend.clone());

    let first = json!({
        "model": "gemini-2.0-flash",
        "conversation_id": "conv-1",
        "messages": [{"role": "user", "content": "My name is Ada"}]
    });
    let response = send(state.clone(), chat_request(Some(API_KEY), first)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-conversation-id").unwrap(), "conv-1");

    let second = json!({
        "model": "gemini-2.0-flash",
        "conversation_id": "conv-1",
        "messages": [
            {"role": "user", "content": "My name is Ada"},
            {"role": "assistant", "content": "Noted."},
            {"role": "user", "content": "What is my name?"}
        ]
    });
    let response = send(state.clone(), chat_request(Some(API_KEY), second)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let seen = backend.sessions_seen.lock().clone();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].is_empty());
    assert_eq!(seen[1].conversation_id.as_deref(), Some("c_fake"));
    assert_eq!(seen[1].choice_id.as_deref(), Some("rc_1"));

    let prompts = backend.prompts.lock().clone();
    assert_eq!(prompts[1], "User: What is my name?");
    assert_eq!(state.sessions.len(), 1);
}

#[tokio::test]
async fn test_tool_call_extraction() {
    let backend = FakeBackend::replying(
        r#"<tool_call><tool_name>get_weather</tool_name><parameters>{"city": "Paris"}</parameters></tool_call>"#,
    );
    let state = test_state(test_config(), backend);

    let body = json!({
        "model": "gemini-2.0-flash",
        "messages": [{"role": "user", "content": "Weather in Paris?"}],
        "tools": [{
            "type": "function",
            "function": {
                "name": "get_weather",
                "description": "Current weather",
                "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
            }
        }]
    });
    let response = send(state, chat_request(Some(API_KEY), body)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let choice = &body["choices"][0];
    assert_eq!(choice["finish_reason"], "tool_calls");
    let call = &choice["message"]["tool_calls"][0];
    assert_eq!(call["type"], "function");
    assert_eq!(call["function"]["name"], "get_weather");
    let args: Value = serde_json::from_str(call["function"]["arguments"].as_str().unwrap()).unwrap();
    assert_eq!(args["city"], "Paris");
}

#[tokio::test]
async fn test_permission_denied() {
    let state = test_state(test_config(), FakeBackend::replying("unused"));
    let limited = "sk-models-only-0123456789abcdef";
    state
        .keys
        .add_key(limited, "reader", Some(vec!["models.list".to_string()]));

    let response = send(state, chat_request(Some(limited), hello())).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["code"], "permission_denied");
}

#[tokio::test]
async fn test_rate_limit() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.per_minute = 1;
    config.rate_limit.burst = 1;
    let state = test_state(config, FakeBackend::replying("ok"));

    let first = send(state.clone(), chat_request(Some(API_KEY), hello())).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = send(state, chat_request(Some(API_KEY), hello())).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(second).await["error"]["type"], "rate_limit_error");
}

#[tokio::test]
async fn test_models_listing() {
    let state = test_state(test_config(), FakeBackend::replying("unused"));
    let request = Request::builder()
        .uri("/v1/models")
        .header("authorization", format!("Bearer {}", API_KEY))
        .body(Body::empty())
        .unwrap();

    let response = send(state, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["object"], "list");
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"gemini-2.0-flash"));
    assert!(ids.contains(&"gemini-2.5-pro"));
    assert!(body["data"].as_array().unwrap().iter().all(|m| m["owned_by"] == "google"));
}

#[tokio::test]
async fn test_models_requires_auth() {
    let state = test_state(test_config(), FakeBackend::replying("unused"));
    let request = Request::builder()
        .uri("/v1/models")
        .body(Body::empty())
        .unwrap();

    let response = send(state, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_is_open() {
    let state = test_state(test_config(), FakeBackend::replying("unused"));
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = send(state, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "openai-compatible-api");
    assert_eq!(body["checks"]["gemini_client"]["status"], "ok");
}

#[tokio::test]
async fn test_health_reports_missing_credentials() {
    let backend = FakeBackend::replying("unused");
    backend.missing_credentials.store(true, Ordering::SeqCst);
    let state = test_state(test_config(), backend);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = send(state, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"]["credentials"]["status"], "error");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let state = test_state(test_config(), FakeBackend::replying("ok"));
    send(state.clone(), chat_request(Some(API_KEY), hello())).await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = send(state, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_string(response).await;
    assert!(text.contains("requests_total"));
}
