//! Documents exchanged with the hosted document store and the local cache.
//!
//! Every struct serializes in camelCase so the JSON matches the field names
//! used by the document store (`emailLower`, `lastSenderId`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_DISPLAY_NAME;
use crate::types::{MessageId, ThreadId, UserId};

// ---------------------------------------------------------------------------
// UserProfile
// ---------------------------------------------------------------------------

/// The durable per-user record in the `users` collection, keyed by uid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: UserId,
    pub email: Option<String>,
    /// Normalized (lowercase) email, used to start threads by email.
    pub email_lower: Option<String>,
    /// May be empty on profiles written by older clients; backfilled on login.
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// ThreadDoc
// ---------------------------------------------------------------------------

/// A two-participant conversation in the `threads` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadDoc {
    pub id: ThreadId,
    pub participants: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sender_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ThreadDoc {
    /// The participant that is not `me`.  A thread whose participants are
    /// both `me` (or which is missing the other entry) yields `None`.
    pub fn other_participant(&self, me: &UserId) -> Option<&UserId> {
        self.participants.iter().find(|uid| *uid != me)
    }

    pub fn has_participant(&self, uid: &UserId) -> bool {
        self.participants.iter().any(|p| p == uid)
    }
}

// ---------------------------------------------------------------------------
// MessageDoc
// ---------------------------------------------------------------------------

/// A single message in a thread's `messages` subcollection.  Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDoc {
    pub id: MessageId,
    pub text: String,
    pub sender_id: UserId,
    /// Server-assigned; the ordering key of the message subscription.
    pub created_at: DateTime<Utc>,
    pub read_by: Vec<UserId>,
}

// ---------------------------------------------------------------------------
// Local cache projections
// ---------------------------------------------------------------------------

/// Possibly-stale projection of [`UserProfile`] cached for instant UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    pub uid: UserId,
    pub email: Option<String>,
    pub display_name: String,
}

impl From<&UserProfile> for StoredUser {
    fn from(profile: &UserProfile) -> Self {
        Self {
            uid: profile.uid.clone(),
            email: profile.email.clone(),
            display_name: profile.display_name.clone(),
        }
    }
}

/// Raw credentials kept so the session can be silently re-established.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Trim and lowercase an email for lookups and comparisons.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Pick a display name: the supplied one if non-blank, else the local-part of
/// the email, else [`DEFAULT_DISPLAY_NAME`].
pub fn derive_display_name(email: Option<&str>, preferred: Option<&str>) -> String {
    if let Some(name) = preferred.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    email
        .and_then(|e| e.split('@').next())
        .filter(|local| !local.is_empty())
        .unwrap_or(DEFAULT_DISPLAY_NAME)
        .to_string()
}
