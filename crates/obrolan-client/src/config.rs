//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client runs offline against the
//! in-memory backend with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use obrolan_shared::crypto::{derive_cache_key, key_from_slice, SymmetricKey};

/// Credentials of a Firebase project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseConfig {
    /// Env: `FIREBASE_API_KEY`
    pub api_key: String,
    /// Env: `FIREBASE_PROJECT_ID`
    pub project_id: String,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hosted backend.  `None` selects the in-memory backend.
    pub firebase: Option<FirebaseConfig>,

    /// Directory holding the local cache database.
    /// Env: `OBROLAN_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// Key sealing the local cache (hex-encoded, 64 chars).
    /// Env: `OBROLAN_CACHE_KEY`
    /// Default: derived from the data directory path.
    pub cache_key: Option<SymmetricKey>,

    /// How often Firestore live queries poll.
    /// Env: `OBROLAN_POLL_INTERVAL_MS`
    /// Default: 1500 ms.
    pub poll_interval: Duration,

    /// Timeout for every HTTP request to the hosted backend.
    /// Env: `OBROLAN_HTTP_TIMEOUT_SECS`
    /// Default: 15 s.
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            firebase: None,
            data_dir: None,
            cache_key: None,
            poll_interval: Duration::from_millis(1500),
            http_timeout: Duration::from_secs(15),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let api_key = var("FIREBASE_API_KEY").filter(|v| !v.trim().is_empty());
        let project_id = var("FIREBASE_PROJECT_ID").filter(|v| !v.trim().is_empty());
        match (api_key, project_id) {
            (Some(api_key), Some(project_id)) => {
                config.firebase = Some(FirebaseConfig {
                    api_key: api_key.trim().to_string(),
                    project_id: project_id.trim().to_string(),
                });
            }
            (None, None) => {}
            _ => {
                tracing::warn!(
                    "FIREBASE_API_KEY and FIREBASE_PROJECT_ID must both be set, using in-memory backend"
                );
            }
        }

        if let Some(dir) = var("OBROLAN_DATA_DIR").filter(|v| !v.is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(hex_key) = var("OBROLAN_CACHE_KEY") {
            match parse_hex_key(&hex_key) {
                Ok(key) => config.cache_key = Some(key),
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid OBROLAN_CACHE_KEY, using derived key");
                }
            }
        }

        if let Some(val) = var("OBROLAN_POLL_INTERVAL_MS") {
            match val.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid OBROLAN_POLL_INTERVAL_MS, using default"),
            }
        }

        if let Some(val) = var("OBROLAN_HTTP_TIMEOUT_SECS") {
            match val.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.http_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid OBROLAN_HTTP_TIMEOUT_SECS, using default"),
            }
        }

        config
    }

    /// The configured cache key, or one derived from `data_dir`.
    pub fn cache_key_for(&self, data_dir: &std::path::Path) -> SymmetricKey {
        self.cache_key
            .unwrap_or_else(|| derive_cache_key(data_dir.to_string_lossy().as_bytes()))
    }
}

fn parse_hex_key(value: &str) -> Result<SymmetricKey, String> {
    let value = value.trim();
    if value.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", value.len()));
    }
    let bytes = hex::decode(value).map_err(|e| e.to_string())?;
    key_from_slice(&bytes).map_err(|e| e.to_string())
}
