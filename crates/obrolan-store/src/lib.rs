//! # obrolan-store
//!
//! Local encrypted key-value cache for the Obrolan client.
//!
//! Every value is sealed with XChaCha20-Poly1305 under a 256-bit cache key
//! before it reaches SQLite.  On top of the raw [`KeyValueStore`] sits the
//! [`SessionCache`], which keeps the last-known signed-in user and login
//! credentials.

pub mod database;
pub mod kv;
pub mod migrations;
pub mod session;

mod error;

pub use database::{default_data_dir, Database};
pub use error::StoreError;
pub use kv::{KeyValueStore, MemoryKv};
pub use session::SessionCache;
