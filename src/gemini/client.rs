// Gemini web client over browser session cookies
// Author: kelexine (https://github.com/kelexine)

use super::backend::{BackendStatus, ChatMetadata, ChatSession, FileRef, GeminiBackend, ModelOutput};
use super::credentials::{partner_cookie, CredentialManager, Credentials};
use super::parser::{self, SessionTokens};
use crate::config::{AppConfig, GeminiConfig};
use crate::error::{ProxyError, Result};
use crate::utils::logging::sanitize;
use async_trait::async_trait;
use reqwest::Client;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

const GENERATE_PATH: &str =
    "/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate";

const MODEL_HEADER: &str = "x-goog-ext-525001261-jspb";

/// Session tokens tied to the cookie generation they were scraped with.
struct CachedTokens {
    tokens: SessionTokens,
    generation: u64,
}

/// How a single upstream attempt failed.
enum CallError {
    /// Google no longer accepts the session; a cookie rotation may fix it.
    Stale { generation: u64, reason: String },
    /// Anything a rotation cannot fix.
    Fatal(ProxyError),
}

/// Client for the Gemini web app.
///
/// Each request reuses the scraped session tokens while the cookie
/// generation is unchanged. A stale session triggers one serialized cookie
/// rotation followed by one retry.
pub struct GeminiClient {
    http_client: Client,
    config: GeminiConfig,
    credentials: Arc<CredentialManager>,
    /// Single-flight token scrape.
    tokens: Mutex<Option<CachedTokens>>,
    request_id: AtomicU64,
    initialized: AtomicBool,
    rotation_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl GeminiClient {
    /// Create a client from configuration.
    ///
    /// No network traffic happens here; `init` performs the first scrape.
    ///
    /// # Errors
    ///
    /// `ProxyError::MissingCredentials` when either cookie is unset, or
    /// `ProxyError::Config` for an unusable proxy URL.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.gemini.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .use_rustls_tls();

        match config.gemini.effective_proxy() {
            Some(proxy) => {
                let proxy = reqwest::Proxy::all(proxy)
                    .map_err(|e| ProxyError::Config(format!("Invalid proxy URL: {}", e)))?;
                builder = builder.proxy(proxy);
                info!("Routing Gemini traffic through configured proxy");
            }
            None => debug!("No upstream proxy configured"),
        }

        let http_client = builder
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let credentials = Arc::new(CredentialManager::new(
            &config.credentials,
            &config.gemini,
            http_client.clone(),
        )?);

        let seed = (chrono::Utc::now().timestamp_millis() as u64 % 9000) * 100 + 100_000;

        Ok(Self {
            http_client,
            config: config.gemini.clone(),
            credentials,
            tokens: Mutex::new(None),
            request_id: AtomicU64::new(seed),
            initialized: AtomicBool::new(false),
            rotation_task: parking_lot::Mutex::new(None),
        })
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(100_000, Ordering::Relaxed)
    }

    /// Returns session tokens valid for the current cookie generation,
    /// scraping the app page when the cached set is missing or outdated.
    async fn session_tokens(&self) -> std::result::Result<(SessionTokens, u64), CallError> {
        let mut cached = self.tokens.lock().await;
        let (creds, generation) = self.credentials.snapshot().await;

        if let Some(entry) = cached.as_ref() {
            if entry.generation == generation {
                return Ok((entry.tokens.clone(), generation));
            }
        }

        let tokens = self.scrape_tokens(&creds, generation).await?;
        *cached = Some(CachedTokens {
            tokens: tokens.clone(),
            generation,
        });
        Ok((tokens, generation))
    }

    /// `GET {base}/app` and read the embedded tokens.
    async fn scrape_tokens(
        &self,
        creds: &Credentials,
        generation: u64,
    ) -> std::result::Result<SessionTokens, CallError> {
        let url = format!("{}/app", self.config.base_url);
        let cookie_hdr = creds.cookie_header();
        let http = &self.http_client;
        let url = url.as_str();
        let cookie_hdr = cookie_hdr.as_str();

        debug!("Scraping Gemini session tokens");

        let scraped = crate::utils::retry::with_retry("Token scrape", 2, move || async move {
            let response = http
                .get(url)
                .header("Cookie", cookie_hdr)
                .send()
                .await
                .map_err(|e| (0, format!("Gemini app page network error: {}", e)))?;

            let status = response.status();
            let rotated = partner_cookie(response.headers());
            let body = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err((status.as_u16(), body));
            }
            Ok((rotated, body))
        })
        .await;

        let (rotated, html) = match scraped {
            Ok(page) => page,
            Err((status @ (401 | 403), _)) => {
                return Err(CallError::Stale {
                    generation,
                    reason: format!("app page returned HTTP {}", status),
                })
            }
            Err((status, body)) => {
                return Err(CallError::Fatal(ProxyError::Upstream(format!(
                    "app page HTTP {}: {}",
                    status,
                    sanitize(&truncate(&body, 200))
                ))))
            }
        };

        if let Some(value) = rotated {
            self.credentials.absorb_partner_cookie(&value).await;
        }

        parser::extract_session_tokens(&html).ok_or(CallError::Stale {
            generation,
            reason: "access token missing from app page".to_string(),
        })
    }

    /// One StreamGenerate round trip with the current session.
    async fn try_generate(
        &self,
        prompt: &str,
        model: &str,
        metadata: &ChatMetadata,
    ) -> std::result::Result<ModelOutput, CallError> {
        let (tokens, generation) = self.session_tokens().await?;
        let (creds, _) = self.credentials.snapshot().await;

        let reqid = self.next_request_id().to_string();
        let url = reqwest::Url::parse_with_params(
            &format!("{}{}", self.config.base_url, GENERATE_PATH),
            &[
                ("bl", tokens.build_label.as_str()),
                ("f.sid", tokens.session_id.as_str()),
                ("hl", "en"),
                ("_reqid", reqid.as_str()),
                ("rt", "c"),
            ],
        )
        .map_err(|e| CallError::Fatal(ProxyError::Config(format!("Invalid Gemini URL: {}", e))))?;

        let freq = parser::build_freq(prompt, metadata);

        let mut request = self
            .http_client
            .post(url)
            .header("Cookie", creds.cookie_header())
            .header("X-Same-Domain", "1")
            .header("Origin", self.config.base_url.as_str())
            .header("Referer", format!("{}/", self.config.base_url));

        if let Some(header) = crate::models::resolve_model(model).ok().and_then(|m| m.header) {
            request = request.header(MODEL_HEADER, header);
        }

        let response = request
            .form(&[("f.req", freq.as_str()), ("at", tokens.at_token.as_str())])
            .send()
            .await
            .map_err(|e| {
                CallError::Fatal(ProxyError::Upstream(format!("StreamGenerate network error: {}", e)))
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(CallError::Stale {
                generation,
                reason: format!("StreamGenerate returned HTTP {}", status.as_u16()),
            });
        }

        let body = response.text().await.map_err(|e| {
            CallError::Fatal(ProxyError::Upstream(format!("Failed to read Gemini response: {}", e)))
        })?;

        if !status.is_success() {
            return Err(CallError::Fatal(ProxyError::Upstream(format!(
                "StreamGenerate HTTP {}: {}",
                status,
                sanitize(&truncate(&body, 200))
            ))));
        }

        parser::parse_response(&body).map_err(CallError::Fatal)
    }

    /// Runs `op`, rotating the cookies once if the session is stale.
    async fn with_fresh_session<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, CallError>>,
    {
        let (generation, reason) = match op().await {
            Ok(value) => return Ok(value),
            Err(CallError::Fatal(e)) => return Err(e),
            Err(CallError::Stale { generation, reason }) => (generation, reason),
        };

        warn!("Gemini session stale ({}); refreshing cookies", reason);
        if let Err(e) = self.credentials.refresh(generation).await {
            error!("Cookie refresh failed: {}", sanitize(&e.to_string()));
            return Err(ProxyError::CredentialsExpired(e.to_string()));
        }

        match op().await {
            Ok(value) => Ok(value),
            Err(CallError::Fatal(e)) => Err(e),
            Err(CallError::Stale { reason, .. }) => Err(ProxyError::CredentialsExpired(reason)),
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        files: &[FileRef],
        model: &str,
        metadata: &ChatMetadata,
    ) -> Result<ModelOutput> {
        if !files.is_empty() {
            warn!(
                "Ignoring {} attachment(s); file upload is not supported",
                files.len()
            );
        }

        let started = Instant::now();
        let result = self
            .with_fresh_session(move || self.try_generate(prompt, model, metadata))
            .await;

        crate::metrics::record_gemini_call(model, result.is_ok(), started.elapsed());
        match &result {
            Ok(output) => debug!(
                "Gemini replied with {} candidate(s), {} chars",
                output.candidates.len(),
                output.text().len()
            ),
            Err(e) => error!("Gemini call failed: {}", sanitize(&e.to_string())),
        }
        result
    }

    fn start_rotation_task(&self) {
        let manager = Arc::clone(&self.credentials);
        let period = Duration::from_secs(self.config.refresh_interval_seconds.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let generation = manager.generation().await;
                if let Err(e) = manager.refresh(generation).await {
                    warn!("Scheduled cookie rotation failed: {}", sanitize(&e.to_string()));
                }
            }
        });

        if let Some(previous) = self.rotation_task.lock().replace(handle) {
            previous.abort();
        }
        info!(
            "Started background cookie rotation every {}s",
            period.as_secs()
        );
    }
}

#[async_trait]
impl GeminiBackend for GeminiClient {
    async fn init(&self) -> Result<()> {
        info!("Initializing Gemini web client...");

        self.with_fresh_session(move || async move { self.session_tokens().await.map(|_| ()) })
            .await?;

        if self.config.verify_on_startup {
            info!("Testing connection with a short prompt...");
            let output = self
                .generate("Hello", &[], &self.config.default_model, &ChatMetadata::default())
                .await?;
            info!(
                "Gemini connection test successful: {}",
                truncate(output.text(), 50)
            );
        }

        if self.config.auto_refresh {
            self.start_rotation_task();
        }

        self.initialized.store(true, Ordering::SeqCst);
        info!("Gemini client initialized successfully");
        Ok(())
    }

    async fn close(&self) {
        let task = self.rotation_task.lock().take();
        if let Some(handle) = task {
            handle.abort();
            info!("Cookie rotation task stopped");
        }
        self.initialized.store(false, Ordering::SeqCst);
    }

    async fn generate_content(
        &self,
        prompt: &str,
        files: &[FileRef],
        model: &str,
    ) -> Result<ModelOutput> {
        self.generate(prompt, files, model, &ChatMetadata::default())
            .await
    }

    async fn start_chat(&self, model: &str) -> Result<ChatSession> {
        Ok(ChatSession::new(model))
    }

    async fn send_message(
        &self,
        session: &mut ChatSession,
        prompt: &str,
        files: &[FileRef],
    ) -> Result<ModelOutput> {
        let output = self
            .generate(prompt, files, &session.model, &session.metadata)
            .await?;
        session.absorb(&output);
        Ok(output)
    }

    async fn status(&self) -> BackendStatus {
        BackendStatus {
            initialized: self.initialized.load(Ordering::SeqCst),
            credentials_configured: self.credentials.is_configured().await,
            generation: self.credentials.generation().await,
            last_refresh: self.credentials.last_refresh().await,
        }
    }
}

impl Drop for GeminiClient {
    fn drop(&mut self) {
        if let Some(handle) = self.rotation_task.get_mut().take() {
            handle.abort();
        }
    }
}

/// First `max` characters of `s`.
fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
