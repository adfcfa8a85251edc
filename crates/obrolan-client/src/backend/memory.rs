//! In-process auth provider and document store.
//!
//! Behaves like the hosted services where the client can observe it:
//! server-assigned timestamps from a strictly monotonic clock, merge and
//! update semantics, and live queries that re-deliver the full ordered
//! result set after every write that touches it.  Callbacks run on the
//! writer's task after the internal lock is released.
//!
//! A few test hooks ([`MemoryBackend::fail_next`],
//! [`MemoryBackend::drop_live_queries`]) simulate partial failures.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use obrolan_shared::{
    normalize_email, MessageDoc, MessageId, ThreadDoc, ThreadId, UserId, UserProfile,
};

use crate::backend::{
    AuthIdentity, AuthProvider, DocumentStore, ErrorFn, NewMessage, NewProfile, SnapshotFn,
    Subscription, ThreadSummary,
};
use crate::error::{AuthError, BackendError};

/// Minimum password length accepted by [`MemoryBackend::create_account`].
const MIN_PASSWORD_LEN: usize = 6;

/// Write that [`MemoryBackend::fail_next`] can make fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    MergeThread,
    AddMessage,
    ThreadSummary,
}

#[derive(Debug, Clone)]
struct Account {
    uid: UserId,
    email: String,
    password: String,
}

enum Watcher {
    Threads {
        uid: UserId,
        on_next: Arc<SnapshotFn<ThreadDoc>>,
        on_error: Arc<ErrorFn>,
    },
    Messages {
        thread_id: ThreadId,
        on_next: Arc<SnapshotFn<MessageDoc>>,
        on_error: Arc<ErrorFn>,
    },
}

enum Delivery {
    Threads(Arc<SnapshotFn<ThreadDoc>>, Vec<ThreadDoc>),
    Messages(Arc<SnapshotFn<MessageDoc>>, Vec<MessageDoc>),
}

impl Delivery {
    fn deliver(self) {
        match self {
            Delivery::Threads(on_next, snapshot) => on_next(snapshot),
            Delivery::Messages(on_next, snapshot) => on_next(snapshot),
        }
    }
}

#[derive(Default)]
struct Inner {
    last_tick: Option<DateTime<Utc>>,
    accounts: BTreeMap<String, Account>,
    signed_in: Option<UserId>,
    users: BTreeMap<UserId, UserProfile>,
    threads: HashMap<ThreadId, ThreadDoc>,
    messages: HashMap<ThreadId, Vec<MessageDoc>>,
    watchers: BTreeMap<u64, Watcher>,
    next_watcher: u64,
    fail_next: Option<FailPoint>,
}

impl Inner {
    /// Strictly increasing server clock.
    fn server_now(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let tick = match self.last_tick {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_tick = Some(tick);
        tick
    }

    fn take_failure(&mut self, point: FailPoint) -> Result<(), BackendError> {
        if self.fail_next == Some(point) {
            self.fail_next = None;
            return Err(BackendError::Unavailable(format!(
                "injected failure at {point:?}"
            )));
        }
        Ok(())
    }

    fn threads_for(&self, uid: &UserId) -> Vec<ThreadDoc> {
        let mut threads: Vec<ThreadDoc> = self
            .threads
            .values()
            .filter(|t| t.has_participant(uid))
            .cloned()
            .collect();
        // updatedAt descending, id as tiebreaker
        threads.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        threads
    }

    fn messages_for(&self, thread_id: &ThreadId) -> Vec<MessageDoc> {
        let mut messages = self.messages.get(thread_id).cloned().unwrap_or_default();
        messages.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        messages
    }

    /// Snapshots owed to thread live queries after the `thread_id` document
    /// changed.
    fn thread_deliveries(&self, thread_id: &ThreadId) -> Vec<Delivery> {
        let Some(thread) = self.threads.get(thread_id) else {
            return Vec::new();
        };
        self.watchers
            .values()
            .filter_map(|watcher| match watcher {
                Watcher::Threads { uid, on_next, .. } if thread.has_participant(uid) => {
                    Some(Delivery::Threads(on_next.clone(), self.threads_for(uid)))
                }
                _ => None,
            })
            .collect()
    }

    /// Snapshots owed to message live queries after a message was appended
    /// under `thread_id`.  The parent thread document need not exist.
    fn message_deliveries(&self, thread_id: &ThreadId) -> Vec<Delivery> {
        self.watchers
            .values()
            .filter_map(|watcher| match watcher {
                Watcher::Messages {
                    thread_id: watched,
                    on_next,
                    ..
                } if watched == thread_id => Some(Delivery::Messages(
                    on_next.clone(),
                    self.messages_for(thread_id),
                )),
                _ => None,
            })
            .collect()
    }

    fn register(&mut self, watcher: Watcher) -> u64 {
        let id = self.next_watcher;
        self.next_watcher += 1;
        self.watchers.insert(id, watcher);
        id
    }
}

/// In-memory backend implementing both [`AuthProvider`] and [`DocumentStore`].
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, BackendError> {
        self.inner
            .lock()
            .map_err(|_| BackendError::Unavailable("memory backend lock poisoned".into()))
    }

    fn lock_auth(&self) -> Result<MutexGuard<'_, Inner>, AuthError> {
        self.inner
            .lock()
            .map_err(|_| AuthError::Unexpected("memory backend lock poisoned".into()))
    }

    fn watch(&self, watcher: Watcher, initial: impl FnOnce(&Inner) -> Delivery) -> Subscription {
        let (id, delivery) = match self.inner.lock() {
            Ok(mut inner) => {
                let delivery = initial(&*inner);
                (inner.register(watcher), delivery)
            }
            Err(_) => {
                let on_error = match watcher {
                    Watcher::Threads { on_error, .. } | Watcher::Messages { on_error, .. } => {
                        on_error
                    }
                };
                on_error(BackendError::Unavailable("memory backend lock poisoned".into()));
                return Subscription::closed();
            }
        };
        delivery.deliver();

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut inner) = inner.lock() {
                    inner.watchers.remove(&id);
                    debug!(watcher = id, "live query closed");
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Test hooks
    // ------------------------------------------------------------------

    /// Register an account with a fixed uid (no profile document).
    pub fn add_account(&self, uid: &str, email: &str, password: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            let email = normalize_email(email);
            inner.accounts.insert(
                email.clone(),
                Account {
                    uid: UserId::from(uid),
                    email,
                    password: password.to_string(),
                },
            );
        }
    }

    /// Change an account's password, invalidating cached credentials.
    pub fn set_password(&self, email: &str, password: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(account) = inner.accounts.get_mut(&normalize_email(email)) {
                account.password = password.to_string();
            }
        }
    }

    /// Store a profile document verbatim.
    pub fn insert_profile(&self, profile: UserProfile) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.users.insert(profile.uid.clone(), profile);
        }
    }

    /// Make the next write of the given kind fail.
    pub fn fail_next(&self, point: FailPoint) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_next = Some(point);
        }
    }

    /// End every live query with an error, as a dropped connection would.
    pub fn drop_live_queries(&self, reason: &str) {
        let watchers = match self.inner.lock() {
            Ok(mut inner) => std::mem::take(&mut inner.watchers),
            Err(_) => return,
        };
        for watcher in watchers.into_values() {
            let on_error = match watcher {
                Watcher::Threads { on_error, .. } | Watcher::Messages { on_error, .. } => on_error,
            };
            on_error(BackendError::Unavailable(reason.to_string()));
        }
    }

    pub fn signed_in_uid(&self) -> Option<UserId> {
        self.inner.lock().ok().and_then(|i| i.signed_in.clone())
    }

    pub fn live_query_count(&self) -> usize {
        self.inner.lock().map(|i| i.watchers.len()).unwrap_or(0)
    }

    pub fn thread_count(&self) -> usize {
        self.inner.lock().map(|i| i.threads.len()).unwrap_or(0)
    }

    pub fn message_count(&self, thread_id: &ThreadId) -> usize {
        self.inner
            .lock()
            .map(|i| i.messages.get(thread_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthIdentity, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::provider("invalid-email"));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::provider("weak-password"));
        }

        let mut inner = self.lock_auth()?;
        if inner.accounts.contains_key(&email) {
            return Err(AuthError::provider("email-already-in-use"));
        }

        let uid = UserId(Uuid::new_v4().simple().to_string());
        inner.accounts.insert(
            email.clone(),
            Account {
                uid: uid.clone(),
                email: email.clone(),
                password: password.to_string(),
            },
        );
        inner.signed_in = Some(uid.clone());

        Ok(AuthIdentity {
            uid,
            email: Some(email),
            display_name: None,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, AuthError> {
        let mut inner = self.lock_auth()?;
        let account = inner
            .accounts
            .get(&normalize_email(email))
            .filter(|a| a.password == password)
            .cloned()
            .ok_or_else(|| AuthError::provider("invalid-credential"))?;

        inner.signed_in = Some(account.uid.clone());
        Ok(AuthIdentity {
            uid: account.uid,
            email: Some(account.email),
            display_name: None,
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let mut inner = self.lock_auth()?;
        inner.signed_in = None;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn get_user(&self, uid: &UserId) -> Result<Option<UserProfile>, BackendError> {
        Ok(self.lock()?.users.get(uid).cloned())
    }

    async fn find_user_by_email(
        &self,
        email_lower: &str,
    ) -> Result<Option<UserProfile>, BackendError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|p| p.email_lower.as_deref() == Some(email_lower))
            .cloned())
    }

    async fn create_user(&self, profile: NewProfile) -> Result<UserProfile, BackendError> {
        let mut inner = self.lock()?;
        let now = inner.server_now();
        let stored = UserProfile {
            uid: profile.uid,
            email: profile.email,
            email_lower: profile.email_lower,
            display_name: profile.display_name,
            last_seen: Some(now),
            created_at: Some(now),
            updated_at: Some(now),
        };
        inner.users.insert(stored.uid.clone(), stored.clone());
        Ok(stored)
    }

    async fn set_display_name(
        &self,
        uid: &UserId,
        display_name: &str,
    ) -> Result<(), BackendError> {
        let mut inner = self.lock()?;
        let profile = inner
            .users
            .get_mut(uid)
            .ok_or_else(|| BackendError::NotFound(format!("users/{uid}")))?;
        profile.display_name = display_name.to_string();
        Ok(())
    }

    async fn merge_thread(
        &self,
        id: &ThreadId,
        participants: &[UserId; 2],
    ) -> Result<(), BackendError> {
        let deliveries = {
            let mut inner = self.lock()?;
            inner.take_failure(FailPoint::MergeThread)?;
            let now = inner.server_now();
            let thread = inner.threads.entry(id.clone()).or_insert_with(|| ThreadDoc {
                id: id.clone(),
                participants: Vec::new(),
                last_message: None,
                last_sender_id: None,
                created_at: Some(now),
                updated_at: None,
            });
            thread.participants = participants.to_vec();
            thread.updated_at = Some(now);
            inner.thread_deliveries(id)
        };
        deliveries.into_iter().for_each(Delivery::deliver);
        Ok(())
    }

    async fn get_thread(&self, id: &ThreadId) -> Result<Option<ThreadDoc>, BackendError> {
        Ok(self.lock()?.threads.get(id).cloned())
    }

    async fn add_message(
        &self,
        thread_id: &ThreadId,
        message: NewMessage,
    ) -> Result<MessageId, BackendError> {
        let (id, deliveries) = {
            let mut inner = self.lock()?;
            inner.take_failure(FailPoint::AddMessage)?;
            let now = inner.server_now();
            let id = MessageId(Uuid::new_v4().simple().to_string());
            inner
                .messages
                .entry(thread_id.clone())
                .or_default()
                .push(MessageDoc {
                    id: id.clone(),
                    text: message.text,
                    sender_id: message.sender_id,
                    created_at: now,
                    read_by: message.read_by,
                });
            (id, inner.message_deliveries(thread_id))
        };
        deliveries.into_iter().for_each(Delivery::deliver);
        Ok(id)
    }

    async fn update_thread_summary(
        &self,
        thread_id: &ThreadId,
        summary: ThreadSummary,
    ) -> Result<(), BackendError> {
        let deliveries = {
            let mut inner = self.lock()?;
            inner.take_failure(FailPoint::ThreadSummary)?;
            let now = inner.server_now();
            let thread = inner
                .threads
                .get_mut(thread_id)
                .ok_or_else(|| BackendError::NotFound(format!("threads/{thread_id}")))?;
            thread.last_message = Some(summary.last_message);
            thread.last_sender_id = Some(summary.last_sender_id);
            thread.updated_at = Some(now);
            inner.thread_deliveries(thread_id)
        };
        deliveries.into_iter().for_each(Delivery::deliver);
        Ok(())
    }

    fn subscribe_threads(
        &self,
        uid: &UserId,
        on_next: SnapshotFn<ThreadDoc>,
        on_error: ErrorFn,
    ) -> Subscription {
        let on_next = Arc::new(on_next);
        let watched = uid.clone();
        let initial_cb = on_next.clone();
        self.watch(
            Watcher::Threads {
                uid: uid.clone(),
                on_next,
                on_error: Arc::new(on_error),
            },
            move |inner| Delivery::Threads(initial_cb, inner.threads_for(&watched)),
        )
    }

    fn subscribe_messages(
        &self,
        thread_id: &ThreadId,
        on_next: SnapshotFn<MessageDoc>,
        on_error: ErrorFn,
    ) -> Subscription {
        let on_next = Arc::new(on_next);
        let watched = thread_id.clone();
        let initial_cb = on_next.clone();
        self.watch(
            Watcher::Messages {
                thread_id: thread_id.clone(),
                on_next,
                on_error: Arc::new(on_error),
            },
            move |inner| Delivery::Messages(initial_cb, inner.messages_for(&watched)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn pair() -> [UserId; 2] {
        [UserId::from("u1"), UserId::from("u2")]
    }

    #[tokio::test]
    async fn test_create_account_rules() {
        let backend = MemoryBackend::new();
        assert_eq!(
            backend.create_account("nope", "secret1").await.unwrap_err(),
            AuthError::provider("invalid-email")
        );
        assert_eq!(
            backend.create_account("a@x.com", "123").await.unwrap_err(),
            AuthError::provider("weak-password")
        );

        let identity = backend.create_account("A@x.com", "secret1").await.unwrap();
        assert_eq!(identity.email.as_deref(), Some("a@x.com"));
        assert_eq!(backend.signed_in_uid(), Some(identity.uid));

        assert_eq!(
            backend.create_account("a@X.com", "secret1").await.unwrap_err(),
            AuthError::provider("email-already-in-use")
        );
    }

    #[tokio::test]
    async fn test_sign_in_and_out() {
        let backend = MemoryBackend::new();
        backend.add_account("u1", "a@x.com", "secret1");

        assert_eq!(
            backend.sign_in("a@x.com", "wrong").await.unwrap_err(),
            AuthError::provider("invalid-credential")
        );
        let identity = backend.sign_in("a@x.com", "secret1").await.unwrap();
        assert_eq!(identity.uid.as_str(), "u1");

        backend.sign_out().await.unwrap();
        assert!(backend.signed_in_uid().is_none());
    }

    #[tokio::test]
    async fn test_merge_keeps_created_at_and_summary() {
        let backend = MemoryBackend::new();
        let id = ThreadId::derive(&pair()[0], &pair()[1]);

        backend.merge_thread(&id, &pair()).await.unwrap();
        let first = backend.get_thread(&id).await.unwrap().unwrap();
        backend
            .update_thread_summary(
                &id,
                ThreadSummary {
                    last_message: "hi".into(),
                    last_sender_id: UserId::from("u1"),
                },
            )
            .await
            .unwrap();
        backend.merge_thread(&id, &pair()).await.unwrap();

        let second = backend.get_thread(&id).await.unwrap().unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.last_message.as_deref(), Some("hi"));
        assert_eq!(backend.thread_count(), 1);
    }

    #[tokio::test]
    async fn test_summary_on_missing_thread_fails() {
        let backend = MemoryBackend::new();
        let err = backend
            .update_thread_summary(
                &ThreadId::from_raw("u1_u9"),
                ThreadSummary {
                    last_message: "x".into(),
                    last_sender_id: UserId::from("u1"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_server_clock_is_strictly_increasing() {
        let backend = MemoryBackend::new();
        let id = ThreadId::from_raw("u1_u2");
        backend.merge_thread(&id, &pair()).await.unwrap();
        for i in 0..50 {
            backend
                .add_message(
                    &id,
                    NewMessage {
                        text: format!("m{i}"),
                        sender_id: UserId::from("u1"),
                        read_by: vec![UserId::from("u1")],
                    },
                )
                .await
                .unwrap();
        }
        let inner = backend.inner.lock().unwrap();
        let messages = inner.messages_for(&id);
        assert!(messages.windows(2).all(|w| w[0].created_at < w[1].created_at));
        assert_eq!(messages[49].text, "m49");
    }

    #[tokio::test]
    async fn test_thread_live_query_orders_by_updated_desc() {
        let backend = MemoryBackend::new();
        let seen: Arc<StdMutex<Vec<Vec<String>>>> = Arc::default();
        let sink = seen.clone();

        let sub = backend.subscribe_threads(
            &UserId::from("u1"),
            Box::new(move |threads| {
                let ids = threads.iter().map(|t| t.id.to_string()).collect();
                sink.lock().unwrap().push(ids);
            }),
            Box::new(|_| {}),
        );

        let a = ThreadId::from_raw("u1_u2");
        let b = ThreadId::from_raw("u1_u3");
        backend.merge_thread(&a, &pair()).await.unwrap();
        backend
            .merge_thread(&b, &[UserId::from("u1"), UserId::from("u3")])
            .await
            .unwrap();
        // a thread u1 is not in must not notify
        backend
            .merge_thread(
                &ThreadId::from_raw("u2_u3"),
                &[UserId::from("u2"), UserId::from("u3")],
            )
            .await
            .unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].is_empty());
        assert_eq!(seen[2], vec!["u1_u3".to_string(), "u1_u2".to_string()]);

        assert_eq!(backend.live_query_count(), 1);
        sub.unsubscribe();
        assert_eq!(backend.live_query_count(), 0);
    }

    #[tokio::test]
    async fn test_append_notifies_only_message_queries() {
        let backend = MemoryBackend::new();
        let id = ThreadId::from_raw("u1_u2");
        backend.merge_thread(&id, &pair()).await.unwrap();

        let thread_calls = Arc::new(StdMutex::new(0usize));
        let sink = thread_calls.clone();
        let _threads = backend.subscribe_threads(
            &UserId::from("u1"),
            Box::new(move |_| *sink.lock().unwrap() += 1),
            Box::new(|_| {}),
        );
        let message_calls = Arc::new(StdMutex::new(0usize));
        let sink = message_calls.clone();
        let _messages = backend.subscribe_messages(
            &id,
            Box::new(move |_| *sink.lock().unwrap() += 1),
            Box::new(|_| {}),
        );

        backend
            .add_message(
                &id,
                NewMessage {
                    text: "hi".into(),
                    sender_id: UserId::from("u1"),
                    read_by: vec![UserId::from("u1")],
                },
            )
            .await
            .unwrap();

        assert_eq!(*thread_calls.lock().unwrap(), 1);
        assert_eq!(*message_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_message_query_without_thread_document() {
        let backend = MemoryBackend::new();
        let id = ThreadId::from_raw("u1_u9");
        let seen: Arc<StdMutex<Vec<usize>>> = Arc::default();
        let sink = seen.clone();
        let _messages = backend.subscribe_messages(
            &id,
            Box::new(move |messages| sink.lock().unwrap().push(messages.len())),
            Box::new(|_| {}),
        );

        backend
            .add_message(
                &id,
                NewMessage {
                    text: "orphan".into(),
                    sender_id: UserId::from("u1"),
                    read_by: vec![UserId::from("u1")],
                },
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_failure_injection_is_one_shot() {
        let backend = MemoryBackend::new();
        let id = ThreadId::from_raw("u1_u2");
        backend.fail_next(FailPoint::MergeThread);
        assert!(backend.merge_thread(&id, &pair()).await.is_err());
        assert!(backend.merge_thread(&id, &pair()).await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_live_queries_reports_errors() {
        let backend = MemoryBackend::new();
        let errors = Arc::new(StdMutex::new(Vec::new()));
        let sink = errors.clone();
        let _sub = backend.subscribe_messages(
            &ThreadId::from_raw("u1_u2"),
            Box::new(|_| {}),
            Box::new(move |e| sink.lock().unwrap().push(e.to_string())),
        );

        backend.drop_live_queries("connection reset");
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert_eq!(backend.live_query_count(), 0);
    }
}
