//! Firestore REST typed-value encoding for the three document kinds.
//!
//! Only the value types these documents use are handled: strings, string
//! arrays, timestamps and nulls.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use obrolan_shared::{MessageDoc, MessageId, ThreadDoc, ThreadId, UserId, UserProfile};

use crate::error::BackendError;

/// A document as returned by `GET` and `runQuery`.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    /// Full resource name, `projects/{p}/databases/(default)/documents/...`.
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Last path segment of the resource name.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }

    fn string(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .and_then(|v| v.get("stringValue"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn required_string(&self, key: &str) -> Result<String, BackendError> {
        self.string(key)
            .ok_or_else(|| BackendError::Decode(format!("{}: missing `{key}`", self.name)))
    }

    fn string_array(&self, key: &str) -> Vec<String> {
        self.fields
            .get(key)
            .and_then(|v| v.pointer("/arrayValue/values"))
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.get("stringValue").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.fields
            .get(key)
            .and_then(|v| v.get("timestampValue"))
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// One element of a `runQuery` response stream.
#[derive(Debug, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub document: Option<Document>,
}

pub fn string(value: &str) -> Value {
    json!({ "stringValue": value })
}

pub fn nullable_string(value: Option<&str>) -> Value {
    match value {
        Some(s) => string(s),
        None => json!({ "nullValue": null }),
    }
}

pub fn string_array<'a>(values: impl IntoIterator<Item = &'a str>) -> Value {
    let values: Vec<Value> = values.into_iter().map(string).collect();
    json!({ "arrayValue": { "values": values } })
}

pub fn decode_profile(doc: &Document) -> Result<UserProfile, BackendError> {
    let uid = doc.string("uid").unwrap_or_else(|| doc.id().to_string());
    Ok(UserProfile {
        uid: UserId(uid),
        email: doc.string("email"),
        email_lower: doc.string("emailLower"),
        display_name: doc.string("displayName").unwrap_or_default(),
        last_seen: doc.timestamp("lastSeen"),
        created_at: doc.timestamp("createdAt"),
        updated_at: doc.timestamp("updatedAt"),
    })
}

pub fn decode_thread(doc: &Document) -> Result<ThreadDoc, BackendError> {
    Ok(ThreadDoc {
        id: ThreadId::from_raw(doc.id()),
        participants: doc.string_array("participants").into_iter().map(UserId).collect(),
        last_message: doc.string("lastMessage"),
        last_sender_id: doc.string("lastSenderId").map(UserId),
        created_at: doc.timestamp("createdAt"),
        updated_at: doc.timestamp("updatedAt"),
    })
}

pub fn decode_message(doc: &Document) -> Result<MessageDoc, BackendError> {
    let created_at = doc
        .timestamp("createdAt")
        .ok_or_else(|| BackendError::Decode(format!("{}: missing `createdAt`", doc.name)))?;
    Ok(MessageDoc {
        id: MessageId(doc.id().to_string()),
        text: doc.required_string("text")?,
        sender_id: UserId(doc.required_string("senderId")?),
        created_at,
        read_by: doc.string_array("readBy").into_iter().map(UserId).collect(),
    })
}
