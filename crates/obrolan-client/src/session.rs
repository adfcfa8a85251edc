//! Session lifecycle on top of the identity service and the local cache.
//!
//! ```text
//! Hydrating { cached } --login ok--> Authenticated(user)
//!          |
//!          +--no credentials, cached user--> Authenticated(cached)
//!          +--no credentials, no user------> SignedOut
//!          +--login failed-----------------> SignedOut
//! ```
//!
//! [`SessionManager::restore`] shows the cached user immediately, then
//! re-authenticates with the cached credentials.  A failed silent login
//! wipes the cache; without credentials the cached user is kept.

use tokio::sync::watch;
use tracing::{info, warn};

use obrolan_shared::StoredUser;

use crate::error::ChatError;
use crate::identity::{login_user, logout_user, register_user, AuthOutcome};
use crate::state::ChatClient;

/// Where the session currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Restoring at launch.  `cached` is the possibly-stale user from the
    /// local cache, usable for instant UI.
    Hydrating { cached: Option<StoredUser> },
    Authenticated(StoredUser),
    SignedOut,
}

impl SessionState {
    /// The user to display, if any.
    pub fn user(&self) -> Option<&StoredUser> {
        match self {
            Self::Hydrating { cached } => cached.as_ref(),
            Self::Authenticated(user) => Some(user),
            Self::SignedOut => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Hydrating { .. })
    }
}

/// Owns the session state and publishes every change.
pub struct SessionManager {
    client: ChatClient,
    state: watch::Sender<SessionState>,
}

impl SessionManager {
    pub fn new(client: ChatClient) -> Self {
        let (state, _) = watch::channel(SessionState::Hydrating { cached: None });
        Self { client, state }
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver that sees every subsequent state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn publish(&self, next: SessionState) {
        self.state.send_replace(next);
    }

    /// Restore the previous session from the local cache.
    pub async fn restore(&self) -> SessionState {
        let session = self.client.session();
        let cached = session.stored_user();
        self.publish(SessionState::Hydrating {
            cached: cached.clone(),
        });

        let Some(creds) = session.stored_credentials() else {
            let next = match cached {
                Some(user) => {
                    info!(uid = %user.uid, "no cached credentials, keeping cached user");
                    SessionState::Authenticated(user)
                }
                None => SessionState::SignedOut,
            };
            self.publish(next);
            return self.state();
        };

        match login_user(&self.client, &creds.email, &creds.password).await {
            AuthOutcome::Success(user) => {
                info!(uid = %user.uid, "session restored");
                self.publish(SessionState::Authenticated(user));
            }
            AuthOutcome::Failure(message) => {
                warn!(%message, "auto login failed, clearing cached session");
                session.clear();
                self.publish(SessionState::SignedOut);
            }
        }
        self.state()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<StoredUser, ChatError> {
        let user = login_user(&self.client, email, password)
            .await
            .into_result()
            .map_err(ChatError::Auth)?;
        self.publish(SessionState::Authenticated(user.clone()));
        Ok(user)
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<StoredUser, ChatError> {
        let user = register_user(&self.client, email, password)
            .await
            .into_result()
            .map_err(ChatError::Auth)?;
        self.publish(SessionState::Authenticated(user.clone()));
        Ok(user)
    }

    /// Sign out.  The session ends signed out with an empty cache even when
    /// the provider call fails.
    pub async fn logout(&self) {
        if let AuthOutcome::Failure(message) = logout_user(&self.client).await {
            warn!(%message, "provider sign-out failed");
        }
        self.client.session().clear();
        self.publish(SessionState::SignedOut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use obrolan_shared::{LoginCredentials, UserId};
    use obrolan_store::{MemoryKv, SessionCache};
    use tokio::sync::Notify;

    use crate::backend::{AuthIdentity, AuthProvider, MemoryBackend};
    use crate::error::AuthError;

    #[tokio::test]
    async fn test_restore_without_cache_signs_out() {
        let manager = SessionManager::new(ChatClient::in_memory(MemoryBackend::new()));
        assert!(manager.state().is_loading());
        assert_eq!(manager.restore().await, SessionState::SignedOut);
    }

    #[tokio::test]
    async fn test_login_publishes_state() {
        let backend = MemoryBackend::new();
        backend.add_account("u1", "a@x.com", "secret1");
        let manager = SessionManager::new(ChatClient::in_memory(backend));
        let mut rx = manager.subscribe();

        let user = manager.login("a@x.com", "secret1").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            *rx.borrow_and_update(),
            SessionState::Authenticated(user.clone())
        );
        assert_eq!(manager.state().user(), Some(&user));

        manager.logout().await;
        assert_eq!(manager.state(), SessionState::SignedOut);
        assert!(manager.client().session().stored_user().is_none());
    }

    #[tokio::test]
    async fn test_login_failure_is_auth_error() {
        let manager = SessionManager::new(ChatClient::in_memory(MemoryBackend::new()));
        let err = manager.login("a@x.com", "wrong").await.unwrap_err();
        assert!(matches!(err, ChatError::Auth(ref m) if m.contains("invalid-credential")));
        assert!(manager.state().is_loading());
    }

    #[tokio::test]
    async fn test_cached_user_without_credentials_is_kept() {
        let client = ChatClient::in_memory(MemoryBackend::new());
        let user = StoredUser {
            uid: UserId::from("u1"),
            email: None,
            display_name: "Pengguna".into(),
        };
        client.session().save_user(&user);

        let manager = SessionManager::new(client);
        let state = manager.restore().await;
        assert_eq!(state, SessionState::Authenticated(user.clone()));
        assert_eq!(state.user(), Some(&user));
        assert_eq!(manager.client().session().stored_user(), Some(user));
    }

    /// Auth provider whose `sign_in` waits until the test releases it.
    struct GatedAuth {
        inner: MemoryBackend,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl AuthProvider for GatedAuth {
        async fn create_account(
            &self,
            email: &str,
            password: &str,
        ) -> Result<AuthIdentity, AuthError> {
            self.inner.create_account(email, password).await
        }

        async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, AuthError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.sign_in(email, password).await
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            self.inner.sign_out().await
        }
    }

    #[tokio::test]
    async fn test_restore_shows_cached_user_while_logging_in() {
        let backend = MemoryBackend::new();
        backend.add_account("u1", "a@x.com", "secret1");
        let auth = Arc::new(GatedAuth {
            inner: backend.clone(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let client = ChatClient::new(
            auth.clone(),
            Arc::new(backend),
            SessionCache::new(Arc::new(MemoryKv::default())),
        );

        let cached = StoredUser {
            uid: UserId::from("u1"),
            email: Some("a@x.com".into()),
            display_name: "Andi (cached)".into(),
        };
        client.session().persist(
            &cached,
            &LoginCredentials {
                email: "a@x.com".into(),
                password: "secret1".into(),
            },
        );
        let manager = SessionManager::new(client);

        let (restored, ()) = tokio::join!(manager.restore(), async {
            auth.entered.notified().await;
            assert_eq!(
                manager.state(),
                SessionState::Hydrating {
                    cached: Some(cached.clone())
                }
            );
            assert!(manager.state().is_loading());
            auth.release.notify_one();
        });

        let SessionState::Authenticated(user) = restored else {
            panic!("restore did not authenticate");
        };
        assert_eq!(user.uid, cached.uid);
        assert_eq!(user.display_name, "a");
    }
}
