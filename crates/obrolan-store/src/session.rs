//! Last-known session persisted in the local cache.
//!
//! Two independent entries: the signed-in [`StoredUser`] under `"user"` (for
//! instant UI hydration) and the raw [`LoginCredentials`] under
//! `"credentials"` (for silent re-authentication).  Cache failures never
//! propagate: they are logged and reads degrade to "absent".

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use obrolan_shared::constants::{CACHE_KEY_CREDENTIALS, CACHE_KEY_USER};
use obrolan_shared::{derive_display_name, LoginCredentials, StoredUser, UserId};

use crate::kv::KeyValueStore;

/// Tolerant shape of a cached user; older entries may miss fields.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedUser {
    uid: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
}

#[derive(Clone)]
pub struct SessionCache {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionCache {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    // ------------------------------------------------------------------
    // User
    // ------------------------------------------------------------------

    pub fn save_user(&self, user: &StoredUser) {
        let result = serde_json::to_string(user)
            .map_err(|e| e.to_string())
            .and_then(|json| self.kv.set(CACHE_KEY_USER, &json).map_err(|e| e.to_string()));
        if let Err(error) = result {
            warn!(%error, "failed to save user to local cache");
        }
    }

    /// The cached user, with a missing display name re-derived from the email.
    pub fn stored_user(&self) -> Option<StoredUser> {
        let json = match self.kv.get_string(CACHE_KEY_USER) {
            Ok(Some(json)) if !json.is_empty() => json,
            Ok(_) => return None,
            Err(error) => {
                warn!(%error, "failed to read user from local cache");
                return None;
            }
        };

        match serde_json::from_str::<CachedUser>(&json) {
            Ok(cached) => {
                let display_name = match cached.display_name.filter(|n| !n.is_empty()) {
                    Some(name) => name,
                    None => derive_display_name(cached.email.as_deref(), None),
                };
                Some(StoredUser {
                    uid: UserId(cached.uid.unwrap_or_default()),
                    email: cached.email,
                    display_name,
                })
            }
            Err(error) => {
                warn!(%error, "cached user is not valid JSON");
                None
            }
        }
    }

    pub fn clear_user(&self) {
        if let Err(error) = self.kv.remove(CACHE_KEY_USER) {
            warn!(%error, "failed to remove user from local cache");
        }
    }

    // ------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------

    pub fn save_credentials(&self, creds: &LoginCredentials) {
        let result = serde_json::to_string(creds)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.kv
                    .set(CACHE_KEY_CREDENTIALS, &json)
                    .map_err(|e| e.to_string())
            });
        if let Err(error) = result {
            warn!(%error, "failed to save credentials to local cache");
        }
    }

    pub fn stored_credentials(&self) -> Option<LoginCredentials> {
        let json = match self.kv.get_string(CACHE_KEY_CREDENTIALS) {
            Ok(Some(json)) if !json.is_empty() => json,
            Ok(_) => return None,
            Err(error) => {
                warn!(%error, "failed to read credentials from local cache");
                return None;
            }
        };

        serde_json::from_str(&json)
            .map_err(|error| warn!(%error, "cached credentials are not valid JSON"))
            .ok()
    }

    pub fn clear_credentials(&self) {
        if let Err(error) = self.kv.remove(CACHE_KEY_CREDENTIALS) {
            warn!(%error, "failed to remove credentials from local cache");
        }
    }

    /// Persist both entries after a successful sign-in.
    pub fn persist(&self, user: &StoredUser, creds: &LoginCredentials) {
        self.save_user(user);
        self.save_credentials(creds);
    }

    /// Wipe both entries.
    pub fn clear(&self) {
        self.clear_user();
        self.clear_credentials();
    }
}
