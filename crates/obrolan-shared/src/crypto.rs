//! Symmetric encryption for values at rest in the local cache.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{KDF_CONTEXT_CACHE_KEY, NONCE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

// BLAKE3 KDF with domain separation
pub fn derive_cache_key(seed: &[u8]) -> SymmetricKey {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_CACHE_KEY);
    hasher.update(seed);
    *hasher.finalize().as_bytes()
}

pub fn key_from_slice(bytes: &[u8]) -> Result<SymmetricKey, CryptoError> {
    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = generate_symmetric_key();
        let plaintext = br#"{"email":"a@x.com","password":"secret"}"#;

        let encrypted = encrypt(&key, plaintext).unwrap();
        assert_ne!(&encrypted[NONCE_SIZE..], plaintext.as_slice());
        assert_eq!(decrypt(&key, &encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = encrypt(&generate_symmetric_key(), b"user").unwrap();
        assert!(decrypt(&generate_symmetric_key(), &encrypted).is_err());
    }

    #[test]
    fn test_short_input_fails() {
        let key = generate_symmetric_key();
        assert!(decrypt(&key, &[0u8; 5]).is_err());
    }

    #[test]
    fn test_cache_key_deterministic_per_seed() {
        assert_eq!(derive_cache_key(b"/data/a"), derive_cache_key(b"/data/a"));
        assert_ne!(derive_cache_key(b"/data/a"), derive_cache_key(b"/data/b"));
    }

    #[test]
    fn test_key_from_slice_length() {
        assert!(key_from_slice(&[1u8; 32]).is_ok());
        assert!(key_from_slice(&[1u8; 16]).is_err());
    }
}
