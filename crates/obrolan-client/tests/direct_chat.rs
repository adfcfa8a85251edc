//! End-to-end chat flows against the in-memory backend.

use std::sync::{Arc, Mutex};

use obrolan_client::backend::memory::FailPoint;
use obrolan_client::{
    ensure_thread, get_thread_by_id, login_user, register_user, send_message,
    start_direct_thread_by_email, subscribe_to_messages, subscribe_to_threads, AuthOutcome,
    ChatClient, ChatError, MemoryBackend, SessionManager, SessionState,
};
use obrolan_shared::{derive_thread_id, MessageDoc, StoredUser, ThreadDoc, UserId, ValidationError};
use obrolan_store::{KeyValueStore, MemoryKv};

async fn signed_up(backend: &MemoryBackend, uid: &str, email: &str) -> StoredUser {
    backend.add_account(uid, email, "secret1");
    let client = ChatClient::in_memory(backend.clone());
    match login_user(&client, email, "secret1").await {
        AuthOutcome::Success(user) => user,
        AuthOutcome::Failure(message) => panic!("login failed: {message}"),
    }
}

#[tokio::test]
async fn start_chat_and_exchange_message() {
    let backend = MemoryBackend::new();
    let alice = signed_up(&backend, "u1", "a@x.com").await;
    let bob = signed_up(&backend, "u2", "b@x.com").await;

    let direct = start_direct_thread_by_email(&backend, &alice, "B@X.com ")
        .await
        .unwrap();
    assert_eq!(direct.thread.id.as_str(), "u1_u2");
    assert_eq!(direct.thread.participants, vec![alice.uid.clone(), bob.uid.clone()]);
    assert_eq!(direct.other_user.uid, bob.uid);

    let received: Arc<Mutex<Vec<MessageDoc>>> = Arc::default();
    let sink = received.clone();
    let _messages = subscribe_to_messages(&backend, &direct.thread.id, move |snapshot| {
        *sink.lock().unwrap() = snapshot;
    });

    let inbox: Arc<Mutex<Vec<ThreadDoc>>> = Arc::default();
    let sink = inbox.clone();
    let _threads = subscribe_to_threads(&backend, &bob.uid, move |snapshot| {
        *sink.lock().unwrap() = snapshot;
    });

    send_message(&backend, &direct.thread.id, &alice.uid, "hello")
        .await
        .unwrap();

    let thread = get_thread_by_id(&backend, &direct.thread.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(thread.last_message.as_deref(), Some("hello"));
    assert_eq!(thread.last_sender_id.as_ref(), Some(&alice.uid));

    let messages = received.lock().unwrap().clone();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "hello");
    assert_eq!(messages[0].read_by, vec![alice.uid.clone()]);

    let bobs_inbox = inbox.lock().unwrap().clone();
    assert_eq!(bobs_inbox.len(), 1);
    assert_eq!(bobs_inbox[0].last_message.as_deref(), Some("hello"));
}

#[tokio::test]
async fn both_sides_share_one_thread() {
    let backend = MemoryBackend::new();
    let alice = signed_up(&backend, "u1", "a@x.com").await;
    let bob = signed_up(&backend, "u2", "b@x.com").await;

    let from_alice = start_direct_thread_by_email(&backend, &alice, "b@x.com")
        .await
        .unwrap();
    send_message(&backend, &from_alice.thread.id, &alice.uid, "hi bob")
        .await
        .unwrap();
    let from_bob = start_direct_thread_by_email(&backend, &bob, "a@x.com")
        .await
        .unwrap();

    assert_eq!(from_alice.thread.id, from_bob.thread.id);
    assert_eq!(from_bob.thread.id, derive_thread_id(&bob.uid, &alice.uid));
    assert_eq!(from_bob.thread.last_message.as_deref(), Some("hi bob"));
    assert_eq!(backend.thread_count(), 1);
}

#[tokio::test]
async fn rejected_inputs_write_nothing() {
    let backend = MemoryBackend::new();
    let alice = signed_up(&backend, "u1", "a@x.com").await;

    let own = start_direct_thread_by_email(&backend, &alice, "a@X.COM")
        .await
        .unwrap_err();
    assert!(matches!(own, ChatError::Validation(ValidationError::SelfChat)));

    let unknown = start_direct_thread_by_email(&backend, &alice, "nobody@x.com")
        .await
        .unwrap_err();
    assert!(matches!(unknown, ChatError::UserNotFound));
    assert_eq!(unknown.to_string(), "No user with that email was found");
    assert_eq!(backend.thread_count(), 0);

    let thread = ensure_thread(&backend, &alice.uid, &UserId::from("u2"))
        .await
        .unwrap();
    let blank = send_message(&backend, &thread.id, &alice.uid, "   ")
        .await
        .unwrap_err();
    assert_eq!(blank.to_string(), "Message cannot be empty");
    assert_eq!(backend.message_count(&thread.id), 0);
}

#[tokio::test]
async fn failed_message_write_leaves_summary_untouched() {
    let backend = MemoryBackend::new();
    let alice = signed_up(&backend, "u1", "a@x.com").await;
    let thread = ensure_thread(&backend, &alice.uid, &UserId::from("u2"))
        .await
        .unwrap();

    backend.fail_next(FailPoint::AddMessage);
    assert!(send_message(&backend, &thread.id, &alice.uid, "lost")
        .await
        .is_err());
    assert_eq!(backend.message_count(&thread.id), 0);

    let stored = get_thread_by_id(&backend, &thread.id).await.unwrap().unwrap();
    assert!(stored.last_message.is_none());
}

#[tokio::test]
async fn relaunch_restores_session() {
    let backend = MemoryBackend::new();
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::default());

    let first_run = ChatClient::with_cache(backend.clone(), kv.clone());
    let AuthOutcome::Success(user) = register_user(&first_run, "c@x.com", "secret1").await else {
        panic!("register failed");
    };

    let manager = SessionManager::new(ChatClient::with_cache(backend.clone(), kv));
    let mut states = manager.subscribe();
    let restored = manager.restore().await;

    assert_eq!(restored, SessionState::Authenticated(user.clone()));
    assert_eq!(*states.borrow_and_update(), SessionState::Authenticated(user));
}

#[tokio::test]
async fn relaunch_with_stale_password_signs_out() {
    let backend = MemoryBackend::new();
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::default());

    let first_run = ChatClient::with_cache(backend.clone(), kv.clone());
    assert!(register_user(&first_run, "c@x.com", "secret1")
        .await
        .is_success());
    backend.set_password("c@x.com", "changed!");

    let second_run = ChatClient::with_cache(backend, kv);
    let manager = SessionManager::new(second_run.clone());
    assert_eq!(manager.restore().await, SessionState::SignedOut);
    assert!(second_run.session().stored_user().is_none());
    assert!(second_run.session().stored_credentials().is_none());
}

#[tokio::test]
async fn dropped_live_query_is_only_logged() {
    let backend = MemoryBackend::new();
    let alice = signed_up(&backend, "u1", "a@x.com").await;
    let deliveries = Arc::new(Mutex::new(0usize));
    let sink = deliveries.clone();
    let _threads = subscribe_to_threads(&backend, &alice.uid, move |_| {
        *sink.lock().unwrap() += 1;
    });

    backend.drop_live_queries("network lost");
    ensure_thread(&backend, &alice.uid, &UserId::from("u2"))
        .await
        .unwrap();

    assert_eq!(*deliveries.lock().unwrap(), 1);
}
