//! Live queries over a user's threads and a thread's messages.
//!
//! Each callback receives the full, already-ordered result set and should
//! replace whatever it showed before.  Errors that end a live query are
//! logged and never reach the callback.

use tracing::error;

use obrolan_shared::{MessageDoc, ThreadDoc, ThreadId, UserId};

use crate::backend::{DocumentStore, Subscription};

/// Threads that include `uid`, most recently updated first.
pub fn subscribe_to_threads<F>(store: &dyn DocumentStore, uid: &UserId, callback: F) -> Subscription
where
    F: Fn(Vec<ThreadDoc>) + Send + Sync + 'static,
{
    let watched = uid.clone();
    store.subscribe_threads(
        uid,
        Box::new(callback),
        Box::new(move |e| error!(uid = %watched, error = %e, "realtime threads failed")),
    )
}

/// Messages of one thread, oldest first.
pub fn subscribe_to_messages<F>(
    store: &dyn DocumentStore,
    thread_id: &ThreadId,
    callback: F,
) -> Subscription
where
    F: Fn(Vec<MessageDoc>) + Send + Sync + 'static,
{
    let watched = thread_id.clone();
    store.subscribe_messages(
        thread_id,
        Box::new(callback),
        Box::new(move |e| error!(thread_id = %watched, error = %e, "realtime messages failed")),
    )
}
