//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation.
//!
//! Values are encrypted at the application layer with XChaCha20-Poly1305
//! under the cache key handed to the constructor, so plain SQLite is enough.
//! The `sqlcipher` feature additionally encrypts the file itself.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use directories::ProjectDirs;
use rusqlite::Connection;

use obrolan_shared::crypto::SymmetricKey;

use crate::error::{Result, StoreError};
use crate::migrations;

/// File name of the cache database inside the data directory.
pub const DB_FILE_NAME: &str = "obrolan-cache.db";

/// Wrapper around a [`rusqlite::Connection`] and the key its values are
/// encrypted with.
pub struct Database {
    conn: Mutex<Connection>,
    key: SymmetricKey,
}

/// Platform data directory for the cache:
/// - Linux:   `~/.local/share/obrolan`
/// - macOS:   `~/Library/Application Support/id.obrolan.obrolan`
/// - Windows: `{FOLDERID_RoamingAppData}\obrolan\obrolan\data`
pub fn default_data_dir() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("id", "obrolan", "obrolan").ok_or(StoreError::NoDataDir)?;
    Ok(project_dirs.data_dir().to_path_buf())
}

impl Database {
    /// Open (or create) the cache in the platform data directory.
    pub fn new(key: &SymmetricKey) -> Result<Self> {
        let data_dir = default_data_dir()?;
        Self::open_in_dir(&data_dir, key)
    }

    /// Open (or create) the cache file inside `data_dir`, creating the
    /// directory if needed.
    pub fn open_in_dir(data_dir: &Path, key: &SymmetricKey) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(DB_FILE_NAME);

        tracing::info!(path = %db_path.display(), "opening cache database");

        Self::open_at(&db_path, key)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path, key: &SymmetricKey) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::init(conn, key)
    }

    /// Open a throwaway database that lives only as long as the handle.
    pub fn open_in_memory(key: &SymmetricKey) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, key)
    }

    fn init(conn: Connection, key: &SymmetricKey) -> Result<Self> {
        #[cfg(feature = "sqlcipher")]
        conn.pragma_update(None, "key", format!("x'{}'", hex_key(key)))?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            key: *key,
        })
    }

    /// Lock and return the underlying connection.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub(crate) fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        let conn = self.conn().ok()?;
        let path = conn.path().filter(|p| !p.is_empty()).map(PathBuf::from);
        path
    }
}

#[cfg(feature = "sqlcipher")]
fn hex_key(key: &SymmetricKey) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}
