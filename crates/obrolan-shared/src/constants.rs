/// Document store collection holding one profile per uid
pub const USERS_COLLECTION: &str = "users";

/// Document store collection holding one document per direct thread
pub const THREADS_COLLECTION: &str = "threads";

/// Subcollection of a thread document holding its messages
pub const MESSAGES_SUBCOLLECTION: &str = "messages";

/// Separator between the two sorted uids of a thread id
pub const THREAD_ID_SEPARATOR: char = '_';

/// Display name used when neither a name nor an email local-part is known
pub const DEFAULT_DISPLAY_NAME: &str = "Pengguna";

/// Local cache key for the last-known signed-in user
pub const CACHE_KEY_USER: &str = "user";

/// Local cache key for the last-known login credentials
pub const CACHE_KEY_CREDENTIALS: &str = "credentials";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Key derivation context (BLAKE3) for the local cache key
pub const KDF_CONTEXT_CACHE_KEY: &str = "obrolan-cache-key-v1";
