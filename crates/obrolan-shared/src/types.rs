use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::THREAD_ID_SEPARATOR;
use crate::error::ValidationError;

// User identity = provider-issued uid, stable for the lifetime of the account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a direct thread.
///
/// Always built from the two participant uids sorted lexicographically and
/// joined with [`THREAD_ID_SEPARATOR`], so one unordered pair maps to exactly
/// one thread and lookups never need a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Derive the thread id for a pair of participants.  Symmetric:
    /// `ThreadId::derive(a, b) == ThreadId::derive(b, a)`.
    pub fn derive(a: &UserId, b: &UserId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{first}{THREAD_ID_SEPARATOR}{second}"))
    }

    /// Wrap an id received from the document store or a navigation route.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the id back into its two participant uids.
    ///
    /// Only meaningful when neither uid contains the separator, which holds
    /// for provider-issued uids.
    pub fn halves(&self) -> Result<(UserId, UserId), ValidationError> {
        match self.0.split_once(THREAD_ID_SEPARATOR) {
            Some((a, b)) if !a.is_empty() && !b.is_empty() => {
                Ok((UserId::from(a), UserId::from(b)))
            }
            _ => Err(ValidationError::MalformedThreadId(self.0.clone())),
        }
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the deterministic thread id for two participants.
pub fn derive_thread_id(a: &UserId, b: &UserId) -> ThreadId {
    ThreadId::derive(a, b)
}

// Store-assigned message identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
