//! Configuration data structures for the gem2openai bridge.
//!
//! This module defines the schema for the application settings: the HTTP
//! server, the Gemini cookie credentials, the upstream web client, API key
//! authentication, rate limiting, conversation sessions and logging.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server settings (host, port, workers, CORS).
    #[serde(default)]
    pub server: ServerConfig,

    /// Gemini web session cookies and `.env` persistence.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Upstream Gemini web client settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// API key authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Request rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Stateful conversation sessions.
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the built-in HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The IP address or hostname the server should bind to.
    /// Default: `0.0.0.0`
    #[serde(default = "default_host")]
    pub host: String,

    /// The port number the server should listen on.
    /// Default: `8000`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads for the tokio runtime.
    /// Default: Number of logical CPU cores.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Allowed CORS origins. `*` allows any origin.
    /// Default: `["*"]`
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

/// Gemini browser-session cookies.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Value of the `__Secure-1PSID` cookie.
    #[serde(default)]
    pub secure_1psid: String,

    /// Value of the `__Secure-1PSIDTS` cookie (or its PSIDCC partner).
    #[serde(default)]
    pub secure_1psidts: String,

    /// `.env` file that receives rotated `SECURE_1PSIDTS` values.
    /// Default: `.env`
    #[serde(default = "default_env_path")]
    pub env_path: String,

    /// Whether rotated cookies are written back to `env_path`.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub persist_rotations: bool,
}

// Custom Debug impl that never logs cookies
impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("secure_1psid", &"[REDACTED]")
            .field("secure_1psidts", &"[REDACTED]")
            .field("env_path", &self.env_path)
            .field("persist_rotations", &self.persist_rotations)
            .finish()
    }
}

impl CredentialsConfig {
    pub fn is_configured(&self) -> bool {
        !self.secure_1psid.trim().is_empty() && !self.secure_1psidts.trim().is_empty()
    }
}

/// Settings for the upstream Gemini web client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Origin of the Gemini web app.
    /// Default: `https://gemini.google.com`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Google endpoint that rotates the PSIDTS cookie.
    /// Default: `https://accounts.google.com/RotateCookies`
    #[serde(default = "default_rotate_url")]
    pub rotate_url: String,

    /// Optional HTTP(S)/SOCKS proxy for upstream calls.
    #[serde(default)]
    pub proxy: Option<String>,

    /// The model used when a request does not name a supported one.
    /// Default: `gemini-2.0-flash`
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Request timeout in seconds.
    /// Default: `30`
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Rotate cookies in the background.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub auto_refresh: bool,

    /// Seconds between background cookie rotations.
    /// Default: `540`
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,

    /// Send a short prompt during startup to verify the session.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub verify_on_startup: bool,

    /// Characters per synthetic streaming chunk.
    /// Default: `15`
    #[serde(default = "default_chunk_size")]
    pub stream_chunk_size: usize,

    /// Delay between synthetic streaming chunks in milliseconds.
    /// Default: `50`
    #[serde(default = "default_chunk_delay")]
    pub stream_chunk_delay_ms: u64,
}

impl GeminiConfig {
    /// The proxy URL, treating `none`/`null`/empty as unset.
    pub fn effective_proxy(&self) -> Option<&str> {
        self.proxy
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty() && !matches!(p.to_ascii_lowercase().as_str(), "none" | "null"))
    }
}

/// Settings for bearer-token authentication.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Accepted API keys. Empty installs the development demo keys.
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Required key prefix.
    /// Default: `sk-`
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_keys", &format!("[{} keys]", self.api_keys.len()))
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

/// Settings for the global request rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Default: `false`
    #[serde(default)]
    pub enabled: bool,

    /// Sustained requests per minute.
    /// Default: `60`
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,

    /// Burst capacity.
    /// Default: `10`
    #[serde(default = "default_burst")]
    pub burst: u32,
}

/// Settings for the in-memory conversation session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum number of stored conversations.
    /// Default: `1000`
    #[serde(default = "default_max_sessions")]
    pub max_entries: usize,

    /// Idle time after which a conversation is forgotten.
    /// Default: `3600`
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: u64,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`, `compact`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Whether to mask cookies and API keys in logs.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub sanitize_tokens: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            secure_1psid: String::new(),
            secure_1psidts: String::new(),
            env_path: default_env_path(),
            persist_rotations: true,
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            rotate_url: default_rotate_url(),
            proxy: None,
            default_model: default_model(),
            timeout_seconds: default_timeout(),
            auto_refresh: true,
            refresh_interval_seconds: default_refresh_interval(),
            verify_on_startup: true,
            stream_chunk_size: default_chunk_size(),
            stream_chunk_delay_ms: default_chunk_delay(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            per_minute: default_per_minute(),
            burst: default_burst(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_sessions(),
            ttl_seconds: default_session_ttl(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            sanitize_tokens: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_env_path() -> String {
    ".env".to_string()
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://gemini.google.com".to_string()
}

fn default_rotate_url() -> String {
    "https://accounts.google.com/RotateCookies".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_refresh_interval() -> u64 {
    540 // 9 minutes
}

fn default_chunk_size() -> usize {
    15
}

fn default_chunk_delay() -> u64 {
    50
}

fn default_key_prefix() -> String {
    "sk-".to_string()
}

fn default_per_minute() -> u32 {
    60
}

fn default_burst() -> u32 {
    10
}

fn default_max_sessions() -> usize {
    1000
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
