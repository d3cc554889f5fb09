// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Symmetric Encryption (XChaCha20-Poly1305)
//!
//! Authenticated encryption with a versioned ciphertext format so the
//! algorithm can change without breaking stored data.
//!
//! Ciphertext format: `algorithm_tag (1 byte) || nonce (24 bytes) || ciphertext || tag (16 bytes)`
//!   - Tag `0x02`: XChaCha20-Poly1305

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::XChaCha20Poly1305;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use zeroize::Zeroize;

/// Encryption error types.
#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed: data may be corrupted or wrong key")]
    DecryptionFailed,
    #[error("Ciphertext too short")]
    CiphertextTooShort,
    #[error("Unknown algorithm tag: {0:#04x}")]
    UnknownAlgorithm(u8),
}

/// Algorithm tag for XChaCha20-Poly1305.
const ALG_TAG_XCHACHA20: u8 = 0x02;

/// Nonce size for XChaCha20-Poly1305 (192 bits = 24 bytes).
const XCHACHA20_NONCE_SIZE: usize = 24;
/// Authentication tag size.
const TAG_SIZE: usize = 16;

/// 256-bit symmetric encryption key.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; 32],
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose key bytes in debug output
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl SymmetricKey {
    /// Generates a new random symmetric key.
    pub fn generate() -> Self {
        let rng = SystemRandom::new();
        let key = ring::rand::generate::<[u8; 32]>(&rng)
            .expect("System RNG should not fail")
            .expose();
        SymmetricKey { bytes: key }
    }

    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SymmetricKey { bytes }
    }

    /// Returns a reference to the key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// Encrypts data using XChaCha20-Poly1305.
///
/// Output format: `0x02 || nonce (24 bytes) || ciphertext || tag (16 bytes)`
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let rng = SystemRandom::new();

    let mut nonce_bytes = [0u8; XCHACHA20_NONCE_SIZE];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = chacha20poly1305::XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    // Tagged format: algorithm_tag || nonce || ciphertext+tag
    let mut output = Vec::with_capacity(1 + XCHACHA20_NONCE_SIZE + ciphertext.len());
    output.push(ALG_TAG_XCHACHA20);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);

    Ok(output)
}

/// Decrypts data, dispatching on the leading algorithm tag.
pub fn decrypt(key: &SymmetricKey, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if ciphertext.is_empty() {
        return Err(EncryptionError::CiphertextTooShort);
    }

    match ciphertext[0] {
        ALG_TAG_XCHACHA20 => decrypt_xchacha20(key, &ciphertext[1..]),
        other => Err(EncryptionError::UnknownAlgorithm(other)),
    }
}

/// Decrypts XChaCha20-Poly1305 data.
///
/// Input format: `nonce (24 bytes) || ciphertext || tag (16 bytes)`
fn decrypt_xchacha20(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let min_size = XCHACHA20_NONCE_SIZE + TAG_SIZE;
    if data.len() < min_size {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let nonce = chacha20poly1305::XNonce::from_slice(&data[..XCHACHA20_NONCE_SIZE]);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(nonce, &data[XCHACHA20_NONCE_SIZE..])
        .map_err(|_| EncryptionError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = SymmetricKey::generate();
        let plaintext = b"hello multi-device world";

        let ciphertext = encrypt(&key, plaintext).unwrap();
        assert_eq!(ciphertext[0], ALG_TAG_XCHACHA20);

        let decrypted = decrypt(&key, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = SymmetricKey::generate();
        let other = SymmetricKey::generate();

        let ciphertext = encrypt(&key, b"secret").unwrap();
        assert!(matches!(
            decrypt(&other, &ciphertext),
            Err(EncryptionError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let key = SymmetricKey::generate();
        let bogus = vec![0x7f; 64];
        assert!(matches!(
            decrypt(&key, &bogus),
            Err(EncryptionError::UnknownAlgorithm(0x7f))
        ));
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let key = SymmetricKey::generate();
        let mut ciphertext = encrypt(&key, b"payload").unwrap();
        ciphertext.truncate(10);
        assert!(matches!(
            decrypt(&key, &ciphertext),
            Err(EncryptionError::CiphertextTooShort)
        ));
    }
}
