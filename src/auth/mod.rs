//! API key authentication.
//!
//! Keys are held only as SHA-256 digests. Each maps to a `UserContext`
//! carrying the permissions checked by the route handlers.

// Author: kelexine (https://github.com/kelexine)

use crate::config::AuthConfig;
use crate::error::{ProxyError, Result};
use crate::utils::logging::preview;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use parking_lot::RwLock;
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

pub const PERMISSION_CHAT: &str = "chat.completions";
pub const PERMISSION_MODELS: &str = "models.list";

/// Development keys installed when no keys are configured.
pub const DEMO_KEYS: &[&str] = &[
    "sk-demo1234567890abcdef1234567890abcdef1234567890abcdef",
    "sk-test1234567890abcdef1234567890abcdef1234567890abcdef",
];

fn default_permissions() -> Vec<String> {
    vec![PERMISSION_CHAT.to_string(), PERMISSION_MODELS.to_string()]
}

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserContext {
    pub user_id: String,
    pub api_key_id: String,
    pub permissions: Vec<String>,
}

impl UserContext {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// `PermissionDenied` unless the permission is held.
    pub fn require(&self, permission: &str) -> Result<()> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(ProxyError::PermissionDenied(format!(
                "API key lacks the '{}' permission",
                permission
            )))
        }
    }
}

/// Hex SHA-256 of a key.
pub fn digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// In-memory API key registry.
pub struct ApiKeyStore {
    keys: RwLock<HashMap<String, UserContext>>,
    prefix: String,
    rng: SystemRandom,
}

impl std::fmt::Debug for ApiKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyStore")
            .field("keys", &self.len())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl ApiKeyStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            prefix: prefix.into(),
            rng: SystemRandom::new(),
        }
    }

    /// Load configured keys, falling back to the demo keys when none are set.
    pub fn from_config(config: &AuthConfig) -> Self {
        let store = Self::new(config.key_prefix.clone());
        let configured: Vec<&str> = config
            .api_keys
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();

        for &key in &configured {
            if !key.starts_with(&store.prefix) {
                warn!(
                    "Ignoring configured API key without '{}' prefix: {}",
                    store.prefix,
                    preview(key, 4)
                );
                continue;
            }
            let user_id = format!("user_{}", &digest(key)[..8]);
            store.add_key(key, &user_id, None);
        }

        if store.is_empty() && !configured.is_empty() {
            error!(
                "None of the {} configured API key(s) carry the '{}' prefix; all requests will be rejected",
                configured.len(),
                store.prefix
            );
        } else if store.is_empty() {
            warn!("No API keys configured; installing development demo keys");
            for key in DEMO_KEYS {
                let user_id = format!("demo_user_{}", &digest(key)[..8]);
                store.add_key(key, &user_id, None);
                warn!("  demo key: {}", key);
            }
        }

        info!("Initialized {} API key(s)", store.len());
        store
    }

    /// Register `key` for `user_id`. Defaults to all permissions.
    pub fn add_key(&self, key: &str, user_id: &str, permissions: Option<Vec<String>>) {
        let hash = digest(key);
        let context = UserContext {
            user_id: user_id.to_string(),
            api_key_id: hash[..16].to_string(),
            permissions: permissions.unwrap_or_else(default_permissions),
        };
        self.keys.write().insert(hash, context);
    }

    /// Resolve a bearer token to its user.
    pub fn authenticate(&self, token: &str) -> Result<UserContext> {
        if token.is_empty() || !token.starts_with(&self.prefix) {
            warn!("Invalid token format: {}", preview(token, 10));
            return Err(ProxyError::InvalidApiKey);
        }

        match self.keys.read().get(&digest(token)) {
            Some(context) => {
                debug!("Authenticated user: {}", context.user_id);
                Ok(context.clone())
            }
            None => {
                warn!("Unknown API key: {}", preview(token, 10));
                Err(ProxyError::InvalidApiKey)
            }
        }
    }

    /// Create and register a fresh key: the prefix plus 32 random bytes,
    /// base64url encoded.
    pub fn generate_api_key(&self, user_id: &str, permissions: Option<Vec<String>>) -> Result<String> {
        let mut bytes = [0u8; 32];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| ProxyError::Internal("System RNG failure".to_string()))?;

        let key = format!("{}{}", self.prefix, URL_SAFE_NO_PAD.encode(bytes));
        self.add_key(&key, user_id, permissions);
        info!("Generated new API key for user: {}", user_id);
        Ok(key)
    }

    /// Remove a key. Returns whether it existed.
    pub fn revoke_api_key(&self, key: &str) -> bool {
        match self.keys.write().remove(&digest(key)) {
            Some(context) => {
                info!("Revoked API key for user: {}", context.user_id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
