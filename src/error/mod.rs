// Error types for gem2openai
// Author: kelexine (https://github.com/kelexine)

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Missing API key")]
    MissingApiKey,

    #[error("Invalid API key provided")]
    InvalidApiKey,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
        param: Option<String>,
    },

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("The model '{0}' does not exist")]
    ModelNotFound(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Gemini session expired and cookie refresh failed: {0}")]
    CredentialsExpired(String),

    #[error("Missing Gemini credentials: {0}")]
    MissingCredentials(String),

    #[error("Gemini upstream error: {0}")]
    Upstream(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),
}

impl ProxyError {
    /// Shorthand for a 400 without a specific parameter.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        ProxyError::InvalidRequest {
            message: message.into(),
            param: None,
        }
    }

    /// Shorthand for a 400 pointing at one request field.
    pub fn invalid_param(message: impl Into<String>, param: &str) -> Self {
        ProxyError::InvalidRequest {
            message: message.into(),
            param: Some(param.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingApiKey | ProxyError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ProxyError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ProxyError::InvalidRequest { .. } | ProxyError::ModelNotFound(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::CredentialsExpired(_)
            | ProxyError::MissingCredentials(_)
            | ProxyError::Upstream(_)
            | ProxyError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the OpenAI-style error body.
    ///
    /// Server-side failures get a fixed message so upstream bodies and
    /// internal details never reach the client; the full error is logged.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let (message, error_type, param, code) = match self {
            ProxyError::MissingApiKey => (
                "You didn't provide an API key. Use 'Authorization: Bearer sk-...'".to_string(),
                "invalid_request_error",
                None,
                "invalid_api_key",
            ),
            ProxyError::InvalidApiKey => (
                "Invalid API key provided".to_string(),
                "invalid_request_error",
                None,
                "invalid_api_key",
            ),
            ProxyError::PermissionDenied(_) => (
                self.to_string(),
                "invalid_request_error",
                None,
                "permission_denied",
            ),
            ProxyError::InvalidRequest { message, param } => (
                message.clone(),
                "invalid_request_error",
                param.clone(),
                "invalid_request",
            ),
            ProxyError::PayloadTooLarge(_) => (
                self.to_string(),
                "invalid_request_error",
                None,
                "request_too_large",
            ),
            ProxyError::ModelNotFound(_) => (
                self.to_string(),
                "invalid_request_error",
                Some("model".to_string()),
                "model_not_found",
            ),
            ProxyError::RateLimited => (
                "Rate limit reached for requests. Please try again later.".to_string(),
                "rate_limit_error",
                None,
                "rate_limit_exceeded",
            ),
            ProxyError::CredentialsExpired(_) => (
                "The Gemini session has expired. Please retry shortly or refresh the cookies."
                    .to_string(),
                "service_unavailable",
                None,
                "credentials_expired",
            ),
            ProxyError::MissingCredentials(_) => (
                "Gemini credentials are not configured on this server.".to_string(),
                "service_unavailable",
                None,
                "missing_credentials",
            ),
            ProxyError::Upstream(_) | ProxyError::ServiceUnavailable(_) => (
                "The Gemini service is currently unavailable. Please retry shortly.".to_string(),
                "service_unavailable",
                None,
                "upstream_unavailable",
            ),
            _ => (
                "Internal server error".to_string(),
                "internal_error",
                None,
                "internal_error",
            ),
        };

        ErrorEnvelope {
            error: ErrorDetail {
                message,
                error_type: error_type.to_string(),
                param,
                code: code.to_string(),
            },
        }
    }
}

/// `{"error": {...}}` as returned by the OpenAI API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub param: Option<String>,
    pub code: String,
}

// Convert ProxyError to HTTP responses for Axum
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(
                "Request failed with {}: {}",
                status,
                crate::utils::logging::sanitize(&self.to_string())
            );
        }

        (status, axum::Json(self.to_envelope())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
