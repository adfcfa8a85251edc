//! # obrolan-client
//!
//! Direct-messaging client core: registration and login against a hosted
//! auth provider, a session cached on the device, one thread per pair of
//! users, and live queries over threads and messages.
//!
//! Everything is reached through a [`ChatClient`], built from a
//! [`ClientConfig`] or directly around a [`MemoryBackend`] in tests.

pub mod backend;
pub mod config;
pub mod error;
pub mod identity;
pub mod inbox;
pub mod realtime;
pub mod session;
pub mod state;
pub mod threads;

use tracing_subscriber::{fmt, EnvFilter};

pub use backend::{AuthProvider, DocumentStore, MemoryBackend, Subscription};
pub use config::{ClientConfig, FirebaseConfig};
pub use error::{AuthError, BackendError, ChatError};
pub use identity::{
    ensure_user_profile, get_user_profile_by_email, get_user_profile_by_id, login_user,
    logout_user, register_user, AuthOutcome, ProfileSeed,
};
pub use inbox::{hydrate_threads, load_thread_header, subscribe_to_inbox, ThreadListItem};
pub use realtime::{subscribe_to_messages, subscribe_to_threads};
pub use session::{SessionManager, SessionState};
pub use state::ChatClient;
pub use threads::{
    ensure_thread, get_thread_by_id, send_message, start_direct_thread_by_email, DirectThread,
};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` overrides the default filter.  Calling this twice is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("obrolan_client=debug,obrolan_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
