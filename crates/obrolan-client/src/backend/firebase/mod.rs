//! Firebase adapters over plain HTTPS.
//!
//! [`FirebaseAuth`] talks to the Identity Toolkit REST API and keeps the
//! signed-in user's ID token; [`FirestoreRest`] uses that token for every
//! Firestore REST v1 call.  Live queries are emulated by polling `runQuery`
//! and only fire when the result set changes.

pub mod auth;
pub mod firestore;
pub mod value;

pub use auth::FirebaseAuth;
pub use firestore::FirestoreRest;

use serde::Deserialize;

use crate::error::BackendError;

/// Google API error envelope: `{"error": {"message": "...", "status": "..."}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Turn a non-success response into a [`BackendError`].
pub(crate) async fn rejected(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let message = match response.json::<ApiErrorBody>().await {
        Ok(body) => match body.error.status {
            Some(code) => format!("{code}: {}", body.error.message),
            None => body.error.message,
        },
        Err(_) => "unreadable error body".to_string(),
    };
    if status == 404 {
        return BackendError::NotFound(message);
    }
    BackendError::Rejected { status, message }
}
