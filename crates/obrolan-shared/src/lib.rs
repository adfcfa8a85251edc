//! # obrolan-shared
//!
//! Types shared by the local store and the client: document models, the
//! deterministic thread id, constants, error types, and the symmetric
//! encryption used for values cached on the device.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod models;
pub mod types;

pub use error::{CryptoError, ValidationError};
pub use models::{
    derive_display_name, normalize_email, LoginCredentials, MessageDoc, StoredUser, ThreadDoc,
    UserProfile,
};
pub use types::{derive_thread_id, MessageId, ThreadId, UserId};
