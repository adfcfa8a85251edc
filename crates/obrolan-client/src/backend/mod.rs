//! Seams to the hosted services.
//!
//! [`AuthProvider`] and [`DocumentStore`] are the only way the rest of the
//! client talks to the backend, so tests can swap in [`MemoryBackend`] and
//! production code the Firebase REST adapters.

pub mod firebase;
pub mod memory;

use async_trait::async_trait;

use obrolan_shared::{MessageDoc, MessageId, ThreadDoc, ThreadId, UserId, UserProfile};

use crate::error::{AuthError, BackendError};

pub use memory::MemoryBackend;

/// Identity returned by the auth provider after sign-up or sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub uid: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn create_account(&self, email: &str, password: &str)
        -> Result<AuthIdentity, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Profile fields written on creation.  The store stamps `lastSeen`,
/// `createdAt` and `updatedAt` with its own clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfile {
    pub uid: UserId,
    pub email: Option<String>,
    pub email_lower: Option<String>,
    pub display_name: String,
}

/// Message fields written on append.  The store assigns the id and
/// `createdAt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub text: String,
    pub sender_id: UserId,
    pub read_by: Vec<UserId>,
}

/// Denormalized latest-message fields on a thread.  The store stamps
/// `updatedAt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummary {
    pub last_message: String,
    pub last_sender_id: UserId,
}

/// Receives the full, already-ordered result set of a live query.
pub type SnapshotFn<T> = Box<dyn Fn(Vec<T>) + Send + Sync>;

/// Receives the error that ended a live query.
pub type ErrorFn = Box<dyn Fn(BackendError) + Send + Sync>;

/// Handle to an open live query.
///
/// The query is released by [`Subscription::unsubscribe`] or when the handle
/// is dropped.
#[must_use = "dropping a Subscription closes the live query"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle for a query that never opened.
    pub fn closed() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("open", &self.cancel.is_some())
            .finish()
    }
}

/// Typed access to the `users` and `threads/{id}/messages` collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_user(&self, uid: &UserId) -> Result<Option<UserProfile>, BackendError>;

    /// First profile whose `emailLower` equals `email_lower`.
    async fn find_user_by_email(
        &self,
        email_lower: &str,
    ) -> Result<Option<UserProfile>, BackendError>;

    /// Write a full profile document (overwriting) and return it as stored.
    async fn create_user(&self, profile: NewProfile) -> Result<UserProfile, BackendError>;

    /// Update `displayName` on an existing profile.
    async fn set_display_name(&self, uid: &UserId, display_name: &str)
        -> Result<(), BackendError>;

    /// Upsert-merge `participants` and `updatedAt` on the thread; sets
    /// `createdAt` only when the thread is new.  Never touches the
    /// last-message fields.
    async fn merge_thread(
        &self,
        id: &ThreadId,
        participants: &[UserId; 2],
    ) -> Result<(), BackendError>;

    async fn get_thread(&self, id: &ThreadId) -> Result<Option<ThreadDoc>, BackendError>;

    async fn add_message(
        &self,
        thread_id: &ThreadId,
        message: NewMessage,
    ) -> Result<MessageId, BackendError>;

    /// Update the summary of an existing thread; fails with
    /// [`BackendError::NotFound`] if the thread does not exist.
    async fn update_thread_summary(
        &self,
        thread_id: &ThreadId,
        summary: ThreadSummary,
    ) -> Result<(), BackendError>;

    /// Live query: threads whose `participants` contains `uid`, ordered by
    /// `updatedAt` descending.
    fn subscribe_threads(
        &self,
        uid: &UserId,
        on_next: SnapshotFn<ThreadDoc>,
        on_error: ErrorFn,
    ) -> Subscription;

    /// Live query: messages of one thread ordered by `createdAt` ascending.
    fn subscribe_messages(
        &self,
        thread_id: &ThreadId,
        on_next: SnapshotFn<MessageDoc>,
        on_error: ErrorFn,
    ) -> Subscription;
}
