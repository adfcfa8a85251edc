//! Firestore REST v1 document store.
//!
//! Writes go through `documents:commit` so server timestamps can be applied
//! with `REQUEST_TIME` transforms and merges can carry an update mask.
//! Live queries poll `runQuery` on a tokio task and deliver a snapshot only
//! when it differs from the previous one.  The first failed poll ends the
//! query and is reported through `on_error`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use obrolan_shared::constants::{MESSAGES_SUBCOLLECTION, THREADS_COLLECTION, USERS_COLLECTION};
use obrolan_shared::{MessageDoc, MessageId, ThreadDoc, ThreadId, UserId, UserProfile};

use crate::backend::firebase::value::{self, Document, QueryResult};
use crate::backend::firebase::{rejected, FirebaseAuth};
use crate::backend::{
    DocumentStore, ErrorFn, NewMessage, NewProfile, SnapshotFn, Subscription, ThreadSummary,
};
use crate::error::BackendError;

const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

/// Firestore over REST, authenticated with the [`FirebaseAuth`] ID token.
#[derive(Clone)]
pub struct FirestoreRest {
    http: reqwest::Client,
    auth: Arc<FirebaseAuth>,
    root: String,
    poll_interval: Duration,
}

/// One entry of a `commit` request.
struct Write {
    path: String,
    fields: Map<String, Value>,
    mask: Option<Vec<&'static str>>,
    server_time: Vec<&'static str>,
    exists: Option<bool>,
}

impl FirestoreRest {
    pub fn new(
        http: reqwest::Client,
        auth: Arc<FirebaseAuth>,
        project_id: &str,
        poll_interval: Duration,
    ) -> Self {
        Self {
            http,
            auth,
            root: format!("projects/{project_id}/databases/(default)/documents"),
            poll_interval,
        }
    }

    fn write_json(&self, write: Write) -> Value {
        let mut out = json!({
            "update": {
                "name": format!("{}/{}", self.root, write.path),
                "fields": write.fields,
            }
        });
        if let Some(mask) = write.mask {
            out["updateMask"] = json!({ "fieldPaths": mask });
        }
        if !write.server_time.is_empty() {
            let transforms: Vec<Value> = write
                .server_time
                .iter()
                .map(|field| json!({ "fieldPath": field, "setToServerValue": "REQUEST_TIME" }))
                .collect();
            out["updateTransforms"] = Value::Array(transforms);
        }
        if let Some(exists) = write.exists {
            out["currentDocument"] = json!({ "exists": exists });
        }
        out
    }

    async fn get_document(&self, path: &str) -> Result<Option<Document>, BackendError> {
        let token = self.auth.id_token().await?;
        let response = self
            .http
            .get(format!("{FIRESTORE_URL}/{}/{path}", self.root))
            .bearer_auth(token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(Some(response.json().await?))
    }

    async fn commit(&self, write: Write) -> Result<(), BackendError> {
        let path = write.path.clone();
        let token = self.auth.id_token().await?;
        let response = self
            .http
            .post(format!("{FIRESTORE_URL}/{}:commit", self.root))
            .bearer_auth(token)
            .json(&json!({ "writes": [self.write_json(write)] }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        debug!(%path, "firestore commit ok");
        Ok(())
    }

    async fn run_query(
        &self,
        parent: Option<&str>,
        query: Value,
    ) -> Result<Vec<Document>, BackendError> {
        let url = match parent {
            Some(parent) => format!("{FIRESTORE_URL}/{}/{parent}:runQuery", self.root),
            None => format!("{FIRESTORE_URL}/{}:runQuery", self.root),
        };
        let token = self.auth.id_token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "structuredQuery": query }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        let results: Vec<QueryResult> = response.json().await?;
        Ok(results.into_iter().filter_map(|r| r.document).collect())
    }

    async fn query_threads(&self, uid: &UserId) -> Result<Vec<ThreadDoc>, BackendError> {
        let query = json!({
            "from": [{ "collectionId": THREADS_COLLECTION }],
            "where": { "fieldFilter": {
                "field": { "fieldPath": "participants" },
                "op": "ARRAY_CONTAINS",
                "value": value::string(uid.as_str()),
            }},
            "orderBy": [{ "field": { "fieldPath": "updatedAt" }, "direction": "DESCENDING" }],
        });
        self.run_query(None, query)
            .await?
            .iter()
            .map(value::decode_thread)
            .collect()
    }

    async fn query_messages(&self, thread_id: &ThreadId) -> Result<Vec<MessageDoc>, BackendError> {
        let query = json!({
            "from": [{ "collectionId": MESSAGES_SUBCOLLECTION }],
            "orderBy": [{ "field": { "fieldPath": "createdAt" }, "direction": "ASCENDING" }],
        });
        let parent = format!("{THREADS_COLLECTION}/{thread_id}");
        self.run_query(Some(&parent), query)
            .await?
            .iter()
            .map(value::decode_message)
            .collect()
    }

    fn spawn_poll<T, F, Fut>(
        &self,
        label: &'static str,
        fetch: F,
        on_next: SnapshotFn<T>,
        on_error: ErrorFn,
    ) -> Subscription
    where
        T: Clone + PartialEq + Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<T>, BackendError>> + Send,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            on_error(BackendError::Unavailable(
                "live queries need a tokio runtime".into(),
            ));
            return Subscription::closed();
        };

        let interval = self.poll_interval;
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<Vec<T>> = None;
            loop {
                ticker.tick().await;
                match fetch().await {
                    Ok(snapshot) => {
                        if last.as_ref() != Some(&snapshot) {
                            on_next(snapshot.clone());
                            last = Some(snapshot);
                        }
                    }
                    Err(error) => {
                        warn!(query = label, %error, "live query stopped");
                        on_error(error);
                        break;
                    }
                }
            }
        });
        Subscription::new(move || task.abort())
    }
}

/// Whether a create with `exists: false` failed because the document is
/// already there.
fn already_exists(error: &BackendError) -> bool {
    match error {
        BackendError::Rejected { message, .. } => {
            message.starts_with("ALREADY_EXISTS") || message.starts_with("FAILED_PRECONDITION")
        }
        _ => false,
    }
}

fn fields<const N: usize>(entries: [(&str, Value); N]) -> Map<String, Value> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[async_trait]
impl DocumentStore for FirestoreRest {
    async fn get_user(&self, uid: &UserId) -> Result<Option<UserProfile>, BackendError> {
        self.get_document(&format!("{USERS_COLLECTION}/{uid}"))
            .await?
            .as_ref()
            .map(value::decode_profile)
            .transpose()
    }

    async fn find_user_by_email(
        &self,
        email_lower: &str,
    ) -> Result<Option<UserProfile>, BackendError> {
        let query = json!({
            "from": [{ "collectionId": USERS_COLLECTION }],
            "where": { "fieldFilter": {
                "field": { "fieldPath": "emailLower" },
                "op": "EQUAL",
                "value": value::string(email_lower),
            }},
            "limit": 1,
        });
        self.run_query(None, query)
            .await?
            .first()
            .map(value::decode_profile)
            .transpose()
    }

    async fn create_user(&self, profile: NewProfile) -> Result<UserProfile, BackendError> {
        let uid = profile.uid.clone();
        self.commit(Write {
            path: format!("{USERS_COLLECTION}/{uid}"),
            fields: fields([
                ("uid", value::string(uid.as_str())),
                ("email", value::nullable_string(profile.email.as_deref())),
                (
                    "emailLower",
                    value::nullable_string(profile.email_lower.as_deref()),
                ),
                ("displayName", value::string(&profile.display_name)),
            ]),
            mask: None,
            server_time: vec!["lastSeen", "createdAt", "updatedAt"],
            exists: None,
        })
        .await?;

        self.get_user(&uid)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("{USERS_COLLECTION}/{uid}")))
    }

    async fn set_display_name(
        &self,
        uid: &UserId,
        display_name: &str,
    ) -> Result<(), BackendError> {
        self.commit(Write {
            path: format!("{USERS_COLLECTION}/{uid}"),
            fields: fields([("displayName", value::string(display_name))]),
            mask: Some(vec!["displayName"]),
            server_time: Vec::new(),
            exists: Some(true),
        })
        .await
    }

    async fn merge_thread(
        &self,
        id: &ThreadId,
        participants: &[UserId; 2],
    ) -> Result<(), BackendError> {
        let path = format!("{THREADS_COLLECTION}/{id}");
        let participant_value = value::string_array(participants.iter().map(UserId::as_str));

        // Write before reading: security rules only let participants read.
        let created = self
            .commit(Write {
                path: path.clone(),
                fields: fields([("participants", participant_value.clone())]),
                mask: None,
                server_time: vec!["createdAt", "updatedAt"],
                exists: Some(false),
            })
            .await;
        match created {
            Ok(()) => return Ok(()),
            Err(error) if already_exists(&error) => {
                debug!(%path, "thread exists, merging participants");
            }
            Err(other) => return Err(other),
        }

        self.commit(Write {
            path,
            fields: fields([("participants", participant_value)]),
            mask: Some(vec!["participants"]),
            server_time: vec!["updatedAt"],
            exists: None,
        })
        .await
    }

    async fn get_thread(&self, id: &ThreadId) -> Result<Option<ThreadDoc>, BackendError> {
        self.get_document(&format!("{THREADS_COLLECTION}/{id}"))
            .await?
            .as_ref()
            .map(value::decode_thread)
            .transpose()
    }

    async fn add_message(
        &self,
        thread_id: &ThreadId,
        message: NewMessage,
    ) -> Result<MessageId, BackendError> {
        let id = MessageId(Uuid::new_v4().simple().to_string());
        self.commit(Write {
            path: format!("{THREADS_COLLECTION}/{thread_id}/{MESSAGES_SUBCOLLECTION}/{id}"),
            fields: fields([
                ("text", value::string(&message.text)),
                ("senderId", value::string(message.sender_id.as_str())),
                (
                    "readBy",
                    value::string_array(message.read_by.iter().map(UserId::as_str)),
                ),
            ]),
            mask: None,
            server_time: vec!["createdAt"],
            exists: Some(false),
        })
        .await?;
        Ok(id)
    }

    async fn update_thread_summary(
        &self,
        thread_id: &ThreadId,
        summary: ThreadSummary,
    ) -> Result<(), BackendError> {
        self.commit(Write {
            path: format!("{THREADS_COLLECTION}/{thread_id}"),
            fields: fields([
                ("lastMessage", value::string(&summary.last_message)),
                ("lastSenderId", value::string(summary.last_sender_id.as_str())),
            ]),
            mask: Some(vec!["lastMessage", "lastSenderId"]),
            server_time: vec!["updatedAt"],
            exists: Some(true),
        })
        .await
    }

    fn subscribe_threads(
        &self,
        uid: &UserId,
        on_next: SnapshotFn<ThreadDoc>,
        on_error: ErrorFn,
    ) -> Subscription {
        let this = self.clone();
        let uid = uid.clone();
        self.spawn_poll(
            "threads",
            move || {
                let this = this.clone();
                let uid = uid.clone();
                async move { this.query_threads(&uid).await }
            },
            on_next,
            on_error,
        )
    }

    fn subscribe_messages(
        &self,
        thread_id: &ThreadId,
        on_next: SnapshotFn<MessageDoc>,
        on_error: ErrorFn,
    ) -> Subscription {
        let this = self.clone();
        let thread_id = thread_id.clone();
        self.spawn_poll(
            "messages",
            move || {
                let this = this.clone();
                let thread_id = thread_id.clone();
                async move { this.query_messages(&thread_id).await }
            },
            on_next,
            on_error,
        )
    }
}
