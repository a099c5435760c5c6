// HTTP middleware
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::config::{RateLimitConfig, ServerConfig};
use crate::error::ProxyError;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::Response,
};
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{debug, warn};

/// Global request limiter
pub type RequestLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create request ID layers for the application
pub fn request_id_layers() -> (SetRequestIdLayer<MakeRequestUuid>, PropagateRequestIdLayer) {
    (
        SetRequestIdLayer::x_request_id(MakeRequestUuid),
        PropagateRequestIdLayer::x_request_id(),
    )
}

/// Build the limiter when rate limiting is enabled.
pub fn create_rate_limiter(config: &RateLimitConfig) -> Option<RequestLimiter> {
    if !config.enabled {
        return None;
    }

    let per_minute = NonZeroU32::new(config.per_minute.max(1)).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(config.burst.max(1)).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::per_minute(per_minute).allow_burst(burst);

    debug!(
        "Rate limiting enabled: {}/min, burst {}",
        config.per_minute, config.burst
    );
    Some(Arc::new(RateLimiter::direct(quota)))
}

/// CORS layer for the configured origins; `*` allows any.
pub fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.cors_origins.is_empty() || config.cors_origins.iter().any(|o| o.trim() == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(origins))
}

/// Middleware for bearer-token authentication.
///
/// On success the caller's `UserContext` is added to the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ProxyError> {
    let header = match request.headers().get(AUTHORIZATION) {
        Some(value) => value,
        None => {
            crate::metrics::record_auth_failure("missing");
            return Err(ProxyError::MissingApiKey);
        }
    };

    let token = header
        .to_str()
        .ok()
        .and_then(bearer_token)
        .ok_or_else(|| {
            crate::metrics::record_auth_failure("malformed");
            ProxyError::InvalidApiKey
        })?;

    let user = state.keys.authenticate(token).map_err(|e| {
        crate::metrics::record_auth_failure("invalid");
        e
    })?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Token from an `Authorization` value; the scheme name is case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Middleware for global rate limiting
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ProxyError> {
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            warn!("Rate limit exceeded for {}", request.uri().path());
            return Err(ProxyError::RateLimited);
        }
    }
    Ok(next.run(request).await)
}
