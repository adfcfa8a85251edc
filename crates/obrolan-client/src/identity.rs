//! Registration, login and logout, plus the user profile documents they
//! keep in sync.
//!
//! The auth functions never return `Err`: every failure is folded into
//! [`AuthOutcome::Failure`] carrying the message to show the user.

use tracing::{error, info};

use obrolan_shared::{
    derive_display_name, normalize_email, LoginCredentials, StoredUser, UserId, UserProfile,
};

use crate::backend::{AuthIdentity, DocumentStore, NewProfile};
use crate::error::{BackendError, ChatError};
use crate::state::ChatClient;

/// What is known about a user right after authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSeed {
    pub uid: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl From<AuthIdentity> for ProfileSeed {
    fn from(identity: AuthIdentity) -> Self {
        Self {
            uid: identity.uid,
            email: identity.email,
            display_name: identity.display_name,
        }
    }
}

/// Result of an auth operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome<T = StoredUser> {
    Success(T),
    Failure(String),
}

impl<T> AuthOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(message) => Err(message),
        }
    }
}

/// Make sure a profile document exists for `seed.uid`.
///
/// An existing profile is returned as stored, except that a blank
/// `displayName` is backfilled first.  A missing one is created with
/// server timestamps.
pub async fn ensure_user_profile(
    store: &dyn DocumentStore,
    seed: ProfileSeed,
) -> Result<UserProfile, BackendError> {
    let display_name = derive_display_name(seed.email.as_deref(), seed.display_name.as_deref());

    if let Some(mut existing) = store.get_user(&seed.uid).await? {
        if existing.display_name.trim().is_empty() {
            store.set_display_name(&seed.uid, &display_name).await?;
            existing.display_name = display_name;
        }
        return Ok(existing);
    }

    let email_lower = seed.email.as_deref().map(normalize_email);
    let profile = store
        .create_user(NewProfile {
            uid: seed.uid,
            email: seed.email,
            email_lower,
            display_name,
        })
        .await?;
    info!(uid = %profile.uid, "created user profile");
    Ok(profile)
}

pub async fn get_user_profile_by_id(
    store: &dyn DocumentStore,
    uid: &UserId,
) -> Result<Option<UserProfile>, BackendError> {
    store.get_user(uid).await
}

/// Look a profile up by email, ignoring case and surrounding whitespace.
pub async fn get_user_profile_by_email(
    store: &dyn DocumentStore,
    email: &str,
) -> Result<Option<UserProfile>, BackendError> {
    store.find_user_by_email(&normalize_email(email)).await
}

#[derive(Clone, Copy)]
enum Flow {
    Register,
    Login,
}

impl Flow {
    fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
        }
    }
}

async fn authenticate(
    client: &ChatClient,
    flow: Flow,
    email: &str,
    password: &str,
) -> Result<StoredUser, ChatError> {
    let identity = match flow {
        Flow::Register => client.auth().create_account(email, password).await,
        Flow::Login => client.auth().sign_in(email, password).await,
    }
    .map_err(|e| ChatError::Auth(e.to_string()))?;

    let profile = ensure_user_profile(client.store(), identity.into()).await?;
    let user = StoredUser::from(&profile);
    client.session().persist(
        &user,
        &LoginCredentials {
            email: email.to_string(),
            password: password.to_string(),
        },
    );
    Ok(user)
}

async fn run_flow(client: &ChatClient, flow: Flow, email: &str, password: &str) -> AuthOutcome {
    match authenticate(client, flow, email, password).await {
        Ok(user) => {
            info!(uid = %user.uid, email = ?user.email, flow = flow.as_str(), "authenticated");
            AuthOutcome::Success(user)
        }
        Err(e) => {
            error!(error = %e, flow = flow.as_str(), "authentication failed");
            AuthOutcome::Failure(e.to_string())
        }
    }
}

/// Create an account, ensure its profile and cache the session.
pub async fn register_user(client: &ChatClient, email: &str, password: &str) -> AuthOutcome {
    run_flow(client, Flow::Register, email, password).await
}

/// Sign in, ensure the profile and cache the session.
pub async fn login_user(client: &ChatClient, email: &str, password: &str) -> AuthOutcome {
    run_flow(client, Flow::Login, email, password).await
}

/// Sign out of the provider, then forget the cached session.
///
/// The cache is left untouched when the provider call fails.
pub async fn logout_user(client: &ChatClient) -> AuthOutcome<()> {
    match client.auth().sign_out().await {
        Ok(()) => {
            client.session().clear();
            info!("signed out");
            AuthOutcome::Success(())
        }
        Err(e) => {
            error!(error = %e, "sign-out failed");
            AuthOutcome::Failure(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[tokio::test]
    async fn test_profile_created_with_email_local_part() {
        let backend = MemoryBackend::new();
        let profile = ensure_user_profile(
            &backend,
            ProfileSeed {
                uid: UserId::from("u1"),
                email: Some("Andi@X.com".into()),
                display_name: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(profile.display_name, "Andi");
        assert_eq!(profile.email_lower.as_deref(), Some("andi@x.com"));
        assert!(profile.created_at.is_some());
        assert!(profile.last_seen.is_some());
    }

    #[tokio::test]
    async fn test_profile_without_email_uses_default_name() {
        let backend = MemoryBackend::new();
        let profile = ensure_user_profile(
            &backend,
            ProfileSeed {
                uid: UserId::from("u1"),
                email: None,
                display_name: Some("   ".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(profile.display_name, "Pengguna");
        assert!(profile.email_lower.is_none());
    }

    #[tokio::test]
    async fn test_existing_profile_is_backfilled_only_when_blank() {
        let backend = MemoryBackend::new();
        backend.insert_profile(UserProfile {
            uid: UserId::from("u1"),
            email: Some("sari@x.com".into()),
            email_lower: Some("sari@x.com".into()),
            display_name: String::new(),
            last_seen: None,
            created_at: None,
            updated_at: None,
        });

        let seed = ProfileSeed {
            uid: UserId::from("u1"),
            email: Some("sari@x.com".into()),
            display_name: None,
        };
        let first = ensure_user_profile(&backend, seed.clone()).await.unwrap();
        assert_eq!(first.display_name, "sari");

        let stored = get_user_profile_by_id(&backend, &UserId::from("u1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.display_name, "sari");

        let renamed = ProfileSeed {
            display_name: Some("Other".into()),
            ..seed
        };
        let second = ensure_user_profile(&backend, renamed).await.unwrap();
        assert_eq!(second.display_name, "sari");
    }

    #[tokio::test]
    async fn test_lookup_by_email_normalizes() {
        let backend = MemoryBackend::new();
        ensure_user_profile(
            &backend,
            ProfileSeed {
                uid: UserId::from("u2"),
                email: Some("b@x.com".into()),
                display_name: None,
            },
        )
        .await
        .unwrap();

        let found = get_user_profile_by_email(&backend, "  B@X.COM ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.uid, UserId::from("u2"));
        assert!(get_user_profile_by_email(&backend, "c@x.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_register_login_logout() {
        let client = ChatClient::in_memory(MemoryBackend::new());

        let user = match register_user(&client, "dewi@x.com", "secret1").await {
            AuthOutcome::Success(user) => user,
            AuthOutcome::Failure(message) => panic!("register failed: {message}"),
        };
        assert_eq!(user.display_name, "dewi");
        assert_eq!(client.session().stored_user(), Some(user.clone()));
        assert_eq!(
            client.session().stored_credentials().map(|c| c.password),
            Some("secret1".to_string())
        );

        assert!(logout_user(&client).await.is_success());
        assert!(client.session().stored_user().is_none());
        assert!(client.session().stored_credentials().is_none());

        let again = login_user(&client, "dewi@x.com", "secret1").await;
        assert_eq!(again, AuthOutcome::Success(user));
    }

    #[tokio::test]
    async fn test_failures_are_outcomes_with_provider_message() {
        let client = ChatClient::in_memory(MemoryBackend::new());

        let weak = register_user(&client, "e@x.com", "123").await;
        assert_eq!(
            weak,
            AuthOutcome::Failure("Authentication failed (auth/weak-password)".into())
        );

        let bad = login_user(&client, "nobody@x.com", "whatever").await;
        let message = bad.into_result().unwrap_err();
        assert!(message.contains("invalid-credential"));
        assert!(client.session().stored_credentials().is_none());
    }
}
