use thiserror::Error;

use obrolan_shared::ValidationError;
use obrolan_store::StoreError;

/// Failure reported by the authentication provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Provider-defined rejection, e.g. `invalid-credential`,
    /// `email-already-in-use`, `weak-password`.
    #[error("Authentication failed (auth/{0})")]
    Provider(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected auth response: {0}")]
    Unexpected(String),
}

impl AuthError {
    pub fn provider(code: &str) -> Self {
        Self::Provider(code.to_string())
    }

    /// Provider error code, if this is a provider rejection.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Provider(code) => Some(code),
            _ => None,
        }
    }
}

/// Failure reported by the document store.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed document: {0}")]
    Decode(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Umbrella error for client operations.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No user with that email was found")]
    UserNotFound,

    #[error("{0}")]
    Auth(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Local cache error: {0}")]
    Store(#[from] StoreError),
}

impl ChatError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
