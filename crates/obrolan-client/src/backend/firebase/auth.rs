//! Identity Toolkit REST client (email + password accounts).

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use obrolan_shared::UserId;

use crate::backend::firebase::ApiErrorBody;
use crate::backend::{AuthIdentity, AuthProvider};
use crate::error::{AuthError, BackendError};

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Refresh the ID token this long before it actually expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

// securetoken answers in snake_case
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Clone)]
struct TokenState {
    uid: UserId,
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

/// Firebase Authentication over REST.
pub struct FirebaseAuth {
    http: reqwest::Client,
    api_key: String,
    state: RwLock<Option<TokenState>>,
}

impl FirebaseAuth {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            state: RwLock::new(None),
        }
    }

    /// Uid of the signed-in user, if any.
    pub fn current_uid(&self) -> Option<UserId> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|t| t.uid.clone()))
    }

    /// A valid ID token for the signed-in user, refreshed when close to
    /// expiry.
    pub async fn id_token(&self) -> Result<String, BackendError> {
        let current = self
            .state
            .read()
            .map_err(|_| BackendError::Unavailable("auth state lock poisoned".into()))?
            .clone()
            .ok_or_else(|| BackendError::Unavailable("not signed in".into()))?;

        if current.expires_at - Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > Utc::now() {
            return Ok(current.id_token);
        }

        debug!(uid = %current.uid, "refreshing ID token");
        let response = self
            .http
            .post(format!("{SECURE_TOKEN_URL}?key={}", self.api_key))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", current.refresh_token.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(super::rejected(response).await);
        }
        let refreshed: RefreshResponse = response.json().await?;

        let next = TokenState {
            uid: current.uid,
            id_token: refreshed.id_token.clone(),
            refresh_token: refreshed.refresh_token,
            expires_at: expiry_from(&refreshed.expires_in),
        };
        if let Ok(mut state) = self.state.write() {
            *state = Some(next);
        }
        Ok(refreshed.id_token)
    }

    async fn password_call(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthIdentity, AuthError> {
        let response = self
            .http
            .post(format!(
                "{IDENTITY_TOOLKIT_URL}/accounts:{endpoint}?key={}",
                self.api_key
            ))
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_default();
            return Err(AuthError::Provider(provider_code(&message)));
        }

        let body: SignInResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Unexpected(e.to_string()))?;

        let uid = UserId(body.local_id);
        let state = TokenState {
            uid: uid.clone(),
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: expiry_from(&body.expires_in),
        };
        self.state
            .write()
            .map_err(|_| AuthError::Unexpected("auth state lock poisoned".into()))?
            .replace(state);

        info!(%uid, endpoint, "firebase auth succeeded");
        Ok(AuthIdentity {
            uid,
            email: body.email,
            display_name: body.display_name.filter(|n| !n.is_empty()),
        })
    }
}

#[async_trait]
impl AuthProvider for FirebaseAuth {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthIdentity, AuthError> {
        self.password_call("signUp", email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, AuthError> {
        self.password_call("signInWithPassword", email, password).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.state
            .write()
            .map_err(|_| AuthError::Unexpected("auth state lock poisoned".into()))?
            .take();
        Ok(())
    }
}

fn expiry_from(expires_in: &str) -> DateTime<Utc> {
    let secs = expires_in.trim().parse::<i64>().unwrap_or(3600);
    Utc::now() + Duration::seconds(secs)
}

/// Map an Identity Toolkit error message (e.g. `"WEAK_PASSWORD : Password
/// should be at least 6 characters"`) to the client SDK's error code.
fn provider_code(message: &str) -> String {
    let token = message
        .split([' ', ':'])
        .next()
        .unwrap_or_default();
    let code = match token {
        "EMAIL_EXISTS" => "email-already-in-use",
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            "invalid-credential"
        }
        "INVALID_EMAIL" | "MISSING_EMAIL" => "invalid-email",
        "MISSING_PASSWORD" => "missing-password",
        "WEAK_PASSWORD" => "weak-password",
        "USER_DISABLED" => "user-disabled",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "too-many-requests",
        "OPERATION_NOT_ALLOWED" => "operation-not-allowed",
        "" => "internal-error",
        other => return other.to_lowercase().replace('_', "-"),
    };
    code.to_string()
}
