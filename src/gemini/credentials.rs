//! Gemini session cookie management.
//!
//! The `CredentialManager` owns the `__Secure-1PSID`/`__Secure-1PSIDTS` pair
//! for the life of the process. Request handling only ever reads it; the
//! cookies change through rotation against Google's `RotateCookies`
//! endpoint, which is serialized with a double-checked lock keyed on a
//! generation counter so concurrent callers that observed the same stale
//! session trigger exactly one rotation.

// Author: kelexine (https://github.com/kelexine)

use crate::config::{CredentialsConfig, GeminiConfig};
use crate::error::{ProxyError, Result};
use crate::utils::logging::preview;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, SET_COOKIE};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Cookie names that carry the rotating half of the session.
const PARTNER_COOKIES: &[&str] = &[
    "__Secure-1PSIDTS",
    "__Secure-1PSIDCC",
    "Secure_1PSIDTS",
    "Secure_1PSIDCC",
];

/// Fixed body Google expects on `RotateCookies`.
const ROTATE_BODY: &str = r#"[000,"-0000000000000000000"]"#;

/// The Gemini cookie pair. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub secure_1psid: String,
    pub secure_1psidts: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("secure_1psid", &"[REDACTED]")
            .field("secure_1psidts", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    pub fn new(secure_1psid: impl Into<String>, secure_1psidts: impl Into<String>) -> Self {
        Self {
            secure_1psid: secure_1psid.into().trim().to_string(),
            secure_1psidts: secure_1psidts.into().trim().to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.secure_1psid.is_empty() && !self.secure_1psidts.is_empty()
    }

    /// `Cookie` header value for Google requests.
    pub fn cookie_header(&self) -> String {
        format!(
            "__Secure-1PSID={}; __Secure-1PSIDTS={}",
            self.secure_1psid, self.secure_1psidts
        )
    }

    fn ensure_complete(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.secure_1psid.is_empty() {
            missing.push("SECURE_1PSID");
        }
        if self.secure_1psidts.is_empty() {
            missing.push("SECURE_1PSIDTS");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProxyError::MissingCredentials(format!(
                "{} not set",
                missing.join(" and ")
            )))
        }
    }
}

struct CredentialState {
    credentials: Credentials,
    generation: u64,
    last_refresh: Option<DateTime<Utc>>,
}

/// Owns the session cookies and serializes their rotation.
pub struct CredentialManager {
    state: RwLock<CredentialState>,
    /// Held only by callers that need a rotation.
    refresh_lock: Mutex<()>,
    http: reqwest::Client,
    rotate_url: String,
    env_path: PathBuf,
    persist_rotations: bool,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("rotate_url", &self.rotate_url)
            .field("env_path", &self.env_path)
            .finish()
    }
}

impl CredentialManager {
    /// Builds a manager from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::MissingCredentials` when either cookie is empty.
    pub fn new(
        credentials: &CredentialsConfig,
        gemini: &GeminiConfig,
        http: reqwest::Client,
    ) -> Result<Self> {
        let creds = Credentials::new(&credentials.secure_1psid, &credentials.secure_1psidts);
        creds.ensure_complete()?;

        debug!(
            "Loaded Gemini cookies (PSID {}, PSIDTS {})",
            preview(&creds.secure_1psid, 8),
            preview(&creds.secure_1psidts, 8)
        );

        Ok(Self {
            state: RwLock::new(CredentialState {
                credentials: creds,
                generation: 0,
                last_refresh: None,
            }),
            refresh_lock: Mutex::new(()),
            http,
            rotate_url: gemini.rotate_url.clone(),
            env_path: PathBuf::from(&credentials.env_path),
            persist_rotations: credentials.persist_rotations,
        })
    }

    /// Current cookies and the generation they belong to.
    pub async fn snapshot(&self) -> (Credentials, u64) {
        let state = self.state.read().await;
        (state.credentials.clone(), state.generation)
    }

    /// Whether both cookies are currently present.
    pub async fn is_configured(&self) -> bool {
        self.state.read().await.credentials.is_complete()
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    pub async fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_refresh
    }

    /// Rotates the session unless another task already did so since
    /// `observed_generation` was read. Returns the generation now in effect.
    ///
    /// 1. Acquire the refresh mutex.
    /// 2. Re-check the generation; a newer one means the work is done.
    /// 3. Call `RotateCookies`, swap the cookies in and bump the generation.
    /// 4. Persist the new PSIDTS to `.env`.
    pub async fn refresh(&self, observed_generation: u64) -> Result<u64> {
        let _guard = self.refresh_lock.lock().await;

        let current = {
            let state = self.state.read().await;
            if state.generation != observed_generation {
                debug!(
                    "Cookies already rotated by another request (generation {})",
                    state.generation
                );
                return Ok(state.generation);
            }
            state.credentials.clone()
        };

        info!("Rotating Gemini cookies (generation {})", observed_generation);
        let rotated = match self.rotate(&current).await {
            Ok(rotated) => rotated,
            Err(e) => {
                crate::metrics::record_cookie_refresh(false);
                return Err(e);
            }
        };

        let generation = {
            let mut state = self.state.write().await;
            let changed = match rotated {
                Some(value) if !value.is_empty() && value != state.credentials.secure_1psidts => {
                    state.credentials.secure_1psidts = value;
                    true
                }
                _ => false,
            };
            state.generation += 1;
            state.last_refresh = Some(Utc::now());

            if changed {
                self.persist(&state.credentials.secure_1psidts);
            }
            state.generation
        };

        crate::metrics::record_cookie_refresh(true);
        info!("Gemini cookies refreshed (generation {})", generation);
        Ok(generation)
    }

    /// Adopts a partner cookie that Google set on an ordinary response.
    pub async fn absorb_partner_cookie(&self, value: &str) {
        let mut state = self.state.write().await;
        if value.is_empty() || state.credentials.secure_1psidts == value {
            return;
        }
        state.credentials.secure_1psidts = value.to_string();
        state.last_refresh = Some(Utc::now());
        self.persist(value);
        info!("Absorbed rotated PSIDTS: {}", preview(value, 12));
    }

    /// POSTs to `RotateCookies`; yields the new PSIDTS when Google issues one.
    async fn rotate(&self, current: &Credentials) -> Result<Option<String>> {
        let cookie_hdr = current.cookie_header();
        let cookie_hdr = cookie_hdr.as_str();
        let http = &self.http;
        let url = self.rotate_url.as_str();

        let request_logic = move || async move {
            let response = http
                .post(url)
                .header("Content-Type", "application/json")
                .header("Cookie", cookie_hdr)
                .body(ROTATE_BODY)
                .send()
                .await
                .map_err(|e| (0, format!("RotateCookies network error: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err((status.as_u16(), body));
            }

            Ok(partner_cookie(response.headers()))
        };

        crate::utils::retry::with_retry("Cookie rotation", 2, request_logic)
            .await
            .map_err(|(status, body)| match status {
                401 | 403 => ProxyError::CredentialsExpired(format!(
                    "RotateCookies rejected the session (HTTP {})",
                    status
                )),
                0 => ProxyError::Upstream(body),
                _ => ProxyError::Upstream(format!("RotateCookies HTTP {}: {}", status, body)),
            })
    }

    fn persist(&self, psidts: &str) {
        if !self.persist_rotations {
            return;
        }
        match update_env_file(&self.env_path, "SECURE_1PSIDTS", psidts) {
            Ok(()) => debug!("Updated {} with new PSIDTS", self.env_path.display()),
            Err(e) => error!(
                "Failed to persist rotated cookie to {}: {}",
                self.env_path.display(),
                e
            ),
        }
    }
}

/// Finds a rotated partner cookie among `Set-Cookie` headers.
pub fn partner_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| {
            let pair = raw.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            Some((name.trim(), value.trim()))
        })
        .find(|(name, value)| PARTNER_COOKIES.contains(name) && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Replaces `key=...` in a dotenv file, or appends it. Other lines are kept.
pub fn update_env_file(path: &Path, key: &str, value: &str) -> Result<()> {
    let prefix = format!("{}=", key);
    let mut updated = false;
    let mut lines: Vec<String> = Vec::new();

    if path.exists() {
        for line in fs::read_to_string(path)?.lines() {
            if line.starts_with(&prefix) {
                lines.push(format!("{}{}", prefix, value));
                updated = true;
            } else {
                lines.push(line.to_string());
            }
        }
    }
    if !updated {
        lines.push(format!("{}{}", prefix, value));
    }

    let mut contents = lines.join("\n");
    contents.push('\n');
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use tempfile::NamedTempFile;

    #[test]
    fn test_debug_is_redacted() {
        let creds = Credentials::new("g.a000secret", "sidts-secret");
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("secret"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[test]
    fn test_missing_credentials() {
        let err = Credentials::new("g.a000x", "  ").ensure_complete().unwrap_err();
        assert!(matches!(err, ProxyError::MissingCredentials(ref m) if m.contains("SECURE_1PSIDTS")));
        assert!(Credentials::new("a", "b").ensure_complete().is_ok());
    }

    #[tokio::test]
    async fn test_configured_until_cookies_go_missing() {
        let config = CredentialsConfig {
            secure_1psid: "g.a000psid".to_string(),
            secure_1psidts: "sidts-1".to_string(),
            persist_rotations: false,
            ..CredentialsConfig::default()
        };
        let manager =
            CredentialManager::new(&config, &GeminiConfig::default(), reqwest::Client::new())
                .unwrap();
        assert!(manager.is_configured().await);

        manager.absorb_partner_cookie("").await;
        assert!(manager.is_configured().await);

        manager.state.write().await.credentials.secure_1psidts.clear();
        assert!(!manager.is_configured().await);
    }

    #[test]
    fn test_partner_cookie_from_headers() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("NID=1; Path=/"));
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("__Secure-1PSIDTS=sidts-new; Domain=.google.com; Secure"),
        );
        assert_eq!(partner_cookie(&headers).as_deref(), Some("sidts-new"));
        assert!(partner_cookie(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_update_env_file_replaces_in_place() {
        let temp = NamedTempFile::new().unwrap();
        fs::write(
            temp.path(),
            "SECURE_1PSID=g.a000abc\nSECURE_1PSIDTS=sidts-old\nPORT=8000\n",
        )
        .unwrap();

        update_env_file(temp.path(), "SECURE_1PSIDTS", "sidts-new").unwrap();

        let contents = fs::read_to_string(temp.path()).unwrap();
        assert_eq!(
            contents,
            "SECURE_1PSID=g.a000abc\nSECURE_1PSIDTS=sidts-new\nPORT=8000\n"
        );
    }

    #[test]
    fn test_update_env_file_appends_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "PORT=8000\n").unwrap();

        update_env_file(&path, "SECURE_1PSIDTS", "sidts-x").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "PORT=8000\nSECURE_1PSIDTS=sidts-x\n"
        );

        let fresh = dir.path().join("fresh.env");
        update_env_file(&fresh, "SECURE_1PSIDTS", "sidts-y").unwrap();
        assert_eq!(fs::read_to_string(&fresh).unwrap(), "SECURE_1PSIDTS=sidts-y\n");
    }
}
