use thiserror::Error;

/// Input rejected before anything is written to the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("The other participant's email is required")]
    EmptyTargetEmail,

    #[error("You cannot start a chat with yourself")]
    SelfChat,

    #[error("A direct thread needs two distinct participants")]
    SameParticipants,

    #[error("Malformed thread id: {0}")]
    MalformedThreadId(String),
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,
}
