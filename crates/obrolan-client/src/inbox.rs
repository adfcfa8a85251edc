//! Inbox view model: thread snapshots joined with the other participant's
//! profile.
//!
//! Profiles are fetched once per inbox subscription and kept in a
//! [`ProfileCache`].  A thread whose participants are both the current user
//! is shown with the user's own profile.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tracing::{debug, error};

use obrolan_shared::{normalize_email, StoredUser, ThreadDoc, ThreadId, UserId, UserProfile};

use crate::backend::{DocumentStore, Subscription};
use crate::error::{BackendError, ChatError};
use crate::realtime::subscribe_to_threads;
use crate::state::ChatClient;

/// One row of the inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadListItem {
    pub thread: ThreadDoc,
    /// `None` when the other participant has no profile document.
    pub other_user: Option<UserProfile>,
}

/// Header of an open conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadHeader {
    pub thread: ThreadDoc,
    pub other_user: Option<UserProfile>,
}

/// Profiles already fetched during this session, keyed by uid.
#[derive(Debug, Clone, Default)]
pub struct ProfileCache {
    profiles: Arc<Mutex<HashMap<UserId, UserProfile>>>,
}

impl ProfileCache {
    pub fn get(&self, uid: &UserId) -> Option<UserProfile> {
        self.profiles.lock().ok()?.get(uid).cloned()
    }

    pub fn insert(&self, profile: UserProfile) {
        if let Ok(mut profiles) = self.profiles.lock() {
            profiles.insert(profile.uid.clone(), profile);
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn own_profile(me: &StoredUser) -> UserProfile {
    UserProfile {
        uid: me.uid.clone(),
        email: me.email.clone(),
        email_lower: me.email.as_deref().map(normalize_email),
        display_name: me.display_name.clone(),
        last_seen: None,
        created_at: None,
        updated_at: None,
    }
}

fn other_id<'a>(thread: &'a ThreadDoc, me: &'a UserId) -> &'a UserId {
    thread.other_participant(me).unwrap_or(me)
}

/// Attach the other participant's profile to every thread, keeping order.
///
/// Profiles missing from `cache` are fetched concurrently, each uid once.
pub async fn hydrate_threads(
    store: &dyn DocumentStore,
    me: &StoredUser,
    threads: Vec<ThreadDoc>,
    cache: &ProfileCache,
) -> Result<Vec<ThreadListItem>, BackendError> {
    let mut missing: Vec<UserId> = Vec::new();
    let mut queued = HashSet::new();
    for thread in &threads {
        let other = other_id(thread, &me.uid);
        if *other != me.uid && cache.get(other).is_none() && queued.insert(other.clone()) {
            missing.push(other.clone());
        }
    }

    if !missing.is_empty() {
        debug!(count = missing.len(), "fetching inbox profiles");
        let fetched = join_all(missing.iter().map(|uid| store.get_user(uid))).await;
        for profile in fetched {
            if let Some(profile) = profile? {
                cache.insert(profile);
            }
        }
    }

    Ok(threads
        .into_iter()
        .map(|thread| {
            let other = other_id(&thread, &me.uid);
            let other_user = if *other == me.uid {
                Some(own_profile(me))
            } else {
                cache.get(other)
            };
            ThreadListItem { thread, other_user }
        })
        .collect())
}

/// Load a thread and the profile of the other participant.
///
/// Returns `None` when the thread does not exist.  A thread with no other
/// participant has no `other_user`.
pub async fn load_thread_header(
    store: &dyn DocumentStore,
    me: &UserId,
    thread_id: &ThreadId,
) -> Result<Option<ThreadHeader>, ChatError> {
    let Some(thread) = store.get_thread(thread_id).await? else {
        return Ok(None);
    };
    let other_user = match thread.other_participant(me) {
        Some(other) => store.get_user(other).await?,
        None => None,
    };
    Ok(Some(ThreadHeader { thread, other_user }))
}

/// Live inbox for `me`: every thread snapshot is hydrated on a tokio task
/// and handed to `callback`.
///
/// A snapshot whose hydration finishes after a newer snapshot arrived is
/// discarded, so the callback never goes back in time.  Needs a running
/// tokio runtime.
pub fn subscribe_to_inbox<F>(
    client: &ChatClient,
    me: StoredUser,
    callback: F,
) -> Result<Subscription, ChatError>
where
    F: Fn(Vec<ThreadListItem>) + Send + Sync + 'static,
{
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|_| BackendError::Unavailable("inbox needs a tokio runtime".into()))?;

    let store = client.store_handle();
    let cache = ProfileCache::default();
    let generation = Arc::new(AtomicU64::new(0));
    let open = Arc::new(AtomicBool::new(true));
    let callback = Arc::new(callback);
    let uid = me.uid.clone();

    let live = {
        let generation = generation.clone();
        let open = open.clone();
        subscribe_to_threads(client.store(), &uid, move |threads| {
            let current = generation.fetch_add(1, Ordering::SeqCst) + 1;
            let store = store.clone();
            let me = me.clone();
            let cache = cache.clone();
            let generation = generation.clone();
            let open = open.clone();
            let callback = callback.clone();
            runtime.spawn(async move {
                match hydrate_threads(store.as_ref(), &me, threads, &cache).await {
                    Ok(items) => {
                        if open.load(Ordering::SeqCst)
                            && generation.load(Ordering::SeqCst) == current
                        {
                            callback(items);
                        }
                    }
                    Err(e) => error!(uid = %me.uid, error = %e, "failed to load threads"),
                }
            });
        })
    };

    Ok(Subscription::new(move || {
        open.store(false, Ordering::SeqCst);
        live.unsubscribe();
    }))
}
