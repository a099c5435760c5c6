// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{chat_completions_handler, health_handler, metrics_handler, models_handler};
use super::middleware::{
    auth_middleware, cors_layer, create_rate_limiter, rate_limit_middleware, request_id_layers,
    RequestLimiter,
};
use crate::auth::ApiKeyStore;
use crate::config::AppConfig;
use crate::gemini::GeminiBackend;
use crate::sessions::{InMemorySessionStore, SessionStore};
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size.
pub const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub backend: Arc<dyn GeminiBackend>,
    pub keys: Arc<ApiKeyStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub limiter: Option<RequestLimiter>,
}

impl AppState {
    /// State with key store, session store and limiter built from `config`.
    pub fn new(config: AppConfig, backend: Arc<dyn GeminiBackend>) -> Self {
        let keys = Arc::new(ApiKeyStore::from_config(&config.auth));
        let sessions: Arc<dyn SessionStore> =
            Arc::new(InMemorySessionStore::from_config(&config.sessions));
        let limiter = create_rate_limiter(&config.rate_limit);

        Self {
            config: Arc::new(config),
            backend,
            keys,
            sessions,
            limiter,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let (set_request_id, propagate_request_id) = request_id_layers();
    let cors = cors_layer(&state.config.server);

    let protected = Router::new()
        .route(
            "/v1/chat/completions",
            post(chat_completions_handler)
                .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware)),
        )
        .route("/v1/models", get(models_handler))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(protected)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state)
}
