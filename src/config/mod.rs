// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{ProxyError, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use std::path::{Path, PathBuf};

/// Flat environment variables understood for compatibility with plain `.env`
/// deployments, and the nested key each one sets.
const FLAT_ENV: &[(&str, &str)] = &[
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("SECURE_1PSID", "credentials.secure_1psid"),
    ("SECURE_1PSIDTS", "credentials.secure_1psidts"),
    ("PROXY", "gemini.proxy"),
    ("LOG_LEVEL", "logging.level"),
    ("LOG_FORMAT", "logging.format"),
    ("RATE_LIMIT_ENABLED", "rate_limit.enabled"),
    ("RATE_LIMIT_PER_MINUTE", "rate_limit.per_minute"),
    ("RATE_LIMIT_BURST", "rate_limit.burst"),
];

/// Comma-separated flat variables that map onto list keys.
const FLAT_LIST_ENV: &[(&str, &str)] = &[
    ("API_KEYS", "auth.api_keys"),
    ("CORS_ORIGINS", "server.cors_origins"),
];

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Flat environment variables (`HOST`, `SECURE_1PSID`, ...) (highest)
    /// 2. Nested environment variables (`GEM2OPENAI__SERVER__PORT`)
    /// 3. Config file
    /// 4. Defaults (lowest)
    ///
    /// The `.env` file is read first and never overrides variables that are
    /// already set in the process environment.
    pub fn load(config_path: Option<&Path>, env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => {
                if let Err(e) = dotenvy::from_path(path) {
                    if !e.not_found() {
                        return Err(ProxyError::Config(format!(
                            "Failed to read {}: {}",
                            path.display(),
                            e
                        )));
                    }
                }
            }
            None => {
                let _ = dotenvy::dotenv();
            }
        }

        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);

        let mut builder = layered_builder(
            File::from(config_path).required(false),
            nested_env(),
            |key| std::env::var(key).ok(),
        )?;

        if let Some(path) = env_file {
            builder = builder.set_override("credentials.env_path", path.to_string_lossy().to_string())?;
        }

        builder
            .build()
            .map_err(|e| ProxyError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ProxyError::Config(e.to_string()))
    }

    /// Check the settings that must be present before serving.
    pub fn validate(&self) -> Result<()> {
        if !self.credentials.is_configured() {
            let mut missing = Vec::new();
            if self.credentials.secure_1psid.trim().is_empty() {
                missing.push("SECURE_1PSID");
            }
            if self.credentials.secure_1psidts.trim().is_empty() {
                missing.push("SECURE_1PSIDTS");
            }
            return Err(ProxyError::MissingCredentials(format!(
                "{} not set; export browser cookies into .env",
                missing.join(", ")
            )));
        }
        if self.gemini.stream_chunk_size == 0 {
            return Err(ProxyError::Config(
                "gemini.stream_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.enabled && (self.rate_limit.per_minute == 0 || self.rate_limit.burst == 0) {
            return Err(ProxyError::Config(
                "rate_limit.per_minute and rate_limit.burst must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Non-sensitive configuration summary for startup logs.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        vec![
            ("host", self.server.host.clone()),
            ("port", self.server.port.to_string()),
            ("log_level", self.logging.level.clone()),
            ("proxy_enabled", self.gemini.effective_proxy().is_some().to_string()),
            ("default_model", self.gemini.default_model.clone()),
            ("rate_limit_enabled", self.rate_limit.enabled.to_string()),
            ("rate_limit_per_minute", self.rate_limit.per_minute.to_string()),
            ("cors_origins", self.server.cors_origins.join(",")),
            ("api_keys_configured", self.auth.api_keys.len().to_string()),
            ("credentials_configured", self.credentials.is_configured().to_string()),
        ]
    }

    /// Copy with cookies and API keys masked, for `--print-config`.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let mask = |value: &mut String| {
            if !value.is_empty() {
                *value = "[REDACTED]".to_string();
            }
        };
        mask(&mut copy.credentials.secure_1psid);
        mask(&mut copy.credentials.secure_1psidts);
        copy.auth
            .api_keys
            .iter_mut()
            .for_each(|key| *key = crate::utils::logging::preview(key, 7));
        copy
    }

    fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gem2openai")
            .join("config.toml")
    }
}

/// Layer the flat variables on top of the builder using `lookup`.
/// `GEM2OPENAI__SECTION__KEY` variables.
fn nested_env() -> Environment {
    Environment::with_prefix("GEM2OPENAI")
        .prefix_separator("__")
        .separator("__")
}

/// Defaults, then `file`, then `nested`, then flat variables from `lookup`.
fn layered_builder<S, F>(
    file: S,
    nested: Environment,
    lookup: F,
) -> Result<ConfigBuilder<DefaultState>>
where
    S: config::Source + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    let builder = Config::builder()
        .add_source(Config::try_from(&AppConfig::default())?)
        .add_source(file)
        .add_source(nested);
    apply_flat_env(builder, lookup)
}

fn apply_flat_env<F>(
    mut builder: ConfigBuilder<DefaultState>,
    lookup: F,
) -> Result<ConfigBuilder<DefaultState>>
where
    F: Fn(&str) -> Option<String>,
{
    for (var, key) in FLAT_ENV {
        let value = lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        builder = builder.set_override_option(*key, value)?;
    }

    for (var, key) in FLAT_LIST_ENV {
        if let Some(raw) = lookup(var) {
            let items = split_list(&raw);
            if !items.is_empty() {
                builder = builder.set_override(*key, items)?;
            }
        }
    }

    Ok(builder)
}

/// Split a comma-separated list, trimming and dropping empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
