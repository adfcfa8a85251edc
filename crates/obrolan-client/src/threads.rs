//! Direct-message threads and their messages.
//!
//! A thread between two users lives at the id derived from their sorted
//! uids, so both sides always land on the same document.  Threads are
//! created lazily by merge-upsert; sending a message appends it and then
//! refreshes the thread's `lastMessage` summary in a second, independent
//! write.

use tracing::{debug, info};

use obrolan_shared::{
    normalize_email, MessageId, StoredUser, ThreadDoc, ThreadId, UserId, UserProfile,
    ValidationError,
};

use crate::backend::{DocumentStore, NewMessage, ThreadSummary};
use crate::error::{BackendError, ChatError};

/// A thread together with the profile of the other participant.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectThread {
    pub thread: ThreadDoc,
    pub other_user: UserProfile,
}

/// Upsert the thread between `uid_a` and `uid_b` and return it as stored.
///
/// Calling this again for the same pair keeps the existing summary fields.
pub async fn ensure_thread(
    store: &dyn DocumentStore,
    uid_a: &UserId,
    uid_b: &UserId,
) -> Result<ThreadDoc, ChatError> {
    if uid_a == uid_b {
        return Err(ValidationError::SameParticipants.into());
    }

    let id = ThreadId::derive(uid_a, uid_b);
    store
        .merge_thread(&id, &[uid_a.clone(), uid_b.clone()])
        .await?;

    let thread = store
        .get_thread(&id)
        .await?
        .ok_or_else(|| BackendError::NotFound(format!("threads/{id}")))?;
    debug!(thread_id = %id, "thread ensured");
    Ok(thread)
}

pub async fn get_thread_by_id(
    store: &dyn DocumentStore,
    thread_id: &ThreadId,
) -> Result<Option<ThreadDoc>, ChatError> {
    Ok(store.get_thread(thread_id).await?)
}

/// Open (or reopen) a chat with the user registered under `target_email`.
pub async fn start_direct_thread_by_email(
    store: &dyn DocumentStore,
    current_user: &StoredUser,
    target_email: &str,
) -> Result<DirectThread, ChatError> {
    let normalized = normalize_email(target_email);
    if normalized.is_empty() {
        return Err(ValidationError::EmptyTargetEmail.into());
    }
    if current_user
        .email
        .as_deref()
        .is_some_and(|own| normalize_email(own) == normalized)
    {
        return Err(ValidationError::SelfChat.into());
    }

    let other_user = store
        .find_user_by_email(&normalized)
        .await?
        .ok_or(ChatError::UserNotFound)?;

    let thread = ensure_thread(store, &current_user.uid, &other_user.uid).await?;
    info!(thread_id = %thread.id, with = %other_user.uid, "direct thread started");
    Ok(DirectThread { thread, other_user })
}

/// Append a message and refresh the thread summary.
///
/// The text is trimmed; a blank message is rejected before anything is
/// written.  If the summary update fails the message stays stored and the
/// error is returned.
pub async fn send_message(
    store: &dyn DocumentStore,
    thread_id: &ThreadId,
    sender_id: &UserId,
    text: &str,
) -> Result<MessageId, ChatError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyMessage.into());
    }

    let message_id = store
        .add_message(
            thread_id,
            NewMessage {
                text: trimmed.to_string(),
                sender_id: sender_id.clone(),
                read_by: vec![sender_id.clone()],
            },
        )
        .await?;

    store
        .update_thread_summary(
            thread_id,
            ThreadSummary {
                last_message: trimmed.to_string(),
                last_sender_id: sender_id.clone(),
            },
        )
        .await?;

    debug!(%thread_id, %message_id, sender = %sender_id, "message sent");
    Ok(message_id)
}
