// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! CryptoProvider Trait
//!
//! Pluggable capability boundary for all cryptographic operations the
//! control plane performs. The concrete algorithms live behind this trait;
//! the default implementation uses ring (Ed25519, HKDF, RNG), x25519-dalek
//! (key agreement) and XChaCha20-Poly1305 (AEAD).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use super::encryption::{self, EncryptionError, SymmetricKey};
use super::kdf::HKDF;
use super::signing::{PublicKey, Signature, SigningKeyPair};

/// Domain separation for key-wrapping derivation.
const KEY_WRAP_INFO: &[u8] = b"Sealink_KeyWrap";

/// Crypto capability errors.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Random number generation failed")]
    RngFailure,
    #[error("Generated key material failed self-check")]
    SelfCheckFailed,
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),
}

impl From<EncryptionError> for CryptoError {
    fn from(e: EncryptionError) -> Self {
        match e {
            EncryptionError::EncryptionFailed => CryptoError::EncryptionFailed,
            _ => CryptoError::DecryptionFailed,
        }
    }
}

/// Capability interface consumed by the control plane.
///
/// Implementations must be deterministic for `sign`/`verify`/`derive_key`
/// and may only fail `random_bytes` on platform RNG exhaustion.
pub trait CryptoProvider: Send + Sync {
    /// Fills `buf` with cryptographically secure random bytes.
    fn random_bytes(&self, buf: &mut [u8]) -> Result<(), CryptoError>;

    /// Generates a fresh Ed25519 signing seed.
    fn generate_signing_seed(&self) -> Result<[u8; 32], CryptoError>;

    /// Generates a fresh X25519 static secret.
    fn generate_exchange_secret(&self) -> Result<[u8; 32], CryptoError>;

    /// Returns the X25519 public key for a static secret.
    fn exchange_public_key(&self, secret: &[u8; 32]) -> [u8; 32];

    /// Returns the verifying key for a signing seed.
    fn signing_public_key(&self, seed: &[u8; 32]) -> [u8; 32];

    /// Signs a message with the keypair derived from `seed`.
    fn sign(&self, seed: &[u8; 32], message: &[u8]) -> Signature;

    /// Verifies a signature over a message.
    fn verify(&self, public_key: &PublicKey, message: &[u8], sig: &Signature) -> bool;

    /// Authenticated encryption.
    fn encrypt(&self, key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Authenticated decryption.
    fn decrypt(&self, key: &SymmetricKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Derives a symmetric key from input material with domain separation.
    fn derive_key(&self, salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> SymmetricKey;

    /// Wraps (encrypts) a symmetric key for another device.
    ///
    /// ECDH between `our_secret` and `their_public`, HKDF to a wrapping key,
    /// then AEAD over the key bytes.
    fn wrap_key(
        &self,
        our_secret: &[u8; 32],
        their_public: &[u8; 32],
        key: &SymmetricKey,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Unwraps a symmetric key received from another device.
    fn unwrap_key(
        &self,
        our_secret: &[u8; 32],
        their_public: &[u8; 32],
        wrapped: &[u8],
    ) -> Result<SymmetricKey, CryptoError>;

    /// Round-trips a probe through encrypt/decrypt with fresh material.
    ///
    /// Used after key generation to detect corrupted key material before it
    /// is distributed.
    fn self_check(&self) -> Result<(), CryptoError> {
        let mut seed = [0u8; 32];
        self.random_bytes(&mut seed)?;
        let key = SymmetricKey::from_bytes(seed);
        let probe = b"sealink-self-check";
        let ciphertext = self.encrypt(&key, probe)?;
        let plaintext = self.decrypt(&key, &ciphertext)?;
        if plaintext != probe {
            return Err(CryptoError::SelfCheckFailed);
        }
        Ok(())
    }
}

/// Default provider backed by ring / x25519-dalek / chacha20poly1305.
pub struct RingCryptoProvider {
    rng: SystemRandom,
}

impl RingCryptoProvider {
    pub fn new() -> Self {
        RingCryptoProvider {
            rng: SystemRandom::new(),
        }
    }

    fn shared_wrapping_key(&self, our_secret: &[u8; 32], their_public: &[u8; 32]) -> SymmetricKey {
        let secret = StaticSecret::from(*our_secret);
        let shared = secret.diffie_hellman(&X25519Public::from(*their_public));
        self.derive_key(None, shared.as_bytes(), KEY_WRAP_INFO)
    }
}

impl Default for RingCryptoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoProvider for RingCryptoProvider {
    fn random_bytes(&self, buf: &mut [u8]) -> Result<(), CryptoError> {
        self.rng.fill(buf).map_err(|_| CryptoError::RngFailure)
    }

    fn generate_signing_seed(&self) -> Result<[u8; 32], CryptoError> {
        let mut seed = [0u8; 32];
        self.random_bytes(&mut seed)?;
        Ok(seed)
    }

    fn generate_exchange_secret(&self) -> Result<[u8; 32], CryptoError> {
        let mut secret = [0u8; 32];
        self.random_bytes(&mut secret)?;
        Ok(secret)
    }

    fn exchange_public_key(&self, secret: &[u8; 32]) -> [u8; 32] {
        let secret = StaticSecret::from(*secret);
        *X25519Public::from(&secret).as_bytes()
    }

    fn signing_public_key(&self, seed: &[u8; 32]) -> [u8; 32] {
        *SigningKeyPair::from_seed(seed).public_key().as_bytes()
    }

    fn sign(&self, seed: &[u8; 32], message: &[u8]) -> Signature {
        SigningKeyPair::from_seed(seed).sign(message)
    }

    fn verify(&self, public_key: &PublicKey, message: &[u8], sig: &Signature) -> bool {
        public_key.verify(message, sig)
    }

    fn encrypt(&self, key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(encryption::encrypt(key, plaintext)?)
    }

    fn decrypt(&self, key: &SymmetricKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        encryption::decrypt(key, ciphertext).map_err(|_| CryptoError::DecryptionFailed)
    }

    fn derive_key(&self, salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> SymmetricKey {
        SymmetricKey::from_bytes(HKDF::derive_key(salt, ikm, info))
    }

    fn wrap_key(
        &self,
        our_secret: &[u8; 32],
        their_public: &[u8; 32],
        key: &SymmetricKey,
    ) -> Result<Vec<u8>, CryptoError> {
        let wrapping_key = self.shared_wrapping_key(our_secret, their_public);
        self.encrypt(&wrapping_key, key.as_bytes())
    }

    fn unwrap_key(
        &self,
        our_secret: &[u8; 32],
        their_public: &[u8; 32],
        wrapped: &[u8],
    ) -> Result<SymmetricKey, CryptoError> {
        let wrapping_key = self.shared_wrapping_key(our_secret, their_public);
        let bytes = self.decrypt(&wrapping_key, wrapped)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyMaterial("wrapped key is not 32 bytes".into()))?;
        Ok(SymmetricKey::from_bytes(bytes))
    }
}

/// Deterministic provider for tests.
///
/// "Randomness" is a counter fed through SHA-256, signatures are keyed
/// digests verifiable because the mock publishes the seed as the public key.
/// Failure injection flags let tests force specific error paths.
pub struct MockCryptoProvider {
    counter: AtomicU64,
    pub fail_encrypt: AtomicBool,
    pub fail_decrypt: AtomicBool,
    pub fail_self_check: AtomicBool,
}

impl MockCryptoProvider {
    pub fn new() -> Self {
        MockCryptoProvider {
            counter: AtomicU64::new(1),
            fail_encrypt: AtomicBool::new(false),
            fail_decrypt: AtomicBool::new(false),
            fail_self_check: AtomicBool::new(false),
        }
    }

    fn next_block(&self) -> [u8; 32] {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let hash = digest::digest(&digest::SHA256, &n.to_le_bytes());
        hash.as_ref().try_into().expect("SHA-256 output is 32 bytes")
    }

    fn mock_signature(seed: &[u8; 32], message: &[u8]) -> [u8; 64] {
        let mut input = Vec::with_capacity(32 + message.len());
        input.extend_from_slice(seed);
        input.extend_from_slice(message);
        let first = digest::digest(&digest::SHA256, &input);
        let second = digest::digest(&digest::SHA256, first.as_ref());
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(first.as_ref());
        out[32..].copy_from_slice(second.as_ref());
        out
    }
}

impl Default for MockCryptoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoProvider for MockCryptoProvider {
    fn random_bytes(&self, buf: &mut [u8]) -> Result<(), CryptoError> {
        let mut offset = 0;
        while offset < buf.len() {
            let block = self.next_block();
            let take = (buf.len() - offset).min(32);
            buf[offset..offset + take].copy_from_slice(&block[..take]);
            offset += take;
        }
        Ok(())
    }

    fn generate_signing_seed(&self) -> Result<[u8; 32], CryptoError> {
        Ok(self.next_block())
    }

    fn generate_exchange_secret(&self) -> Result<[u8; 32], CryptoError> {
        Ok(self.next_block())
    }

    // Mock identity function: public key == secret, so tests can verify
    // wrap/unwrap symmetry without real ECDH.
    fn exchange_public_key(&self, secret: &[u8; 32]) -> [u8; 32] {
        *secret
    }

    // The mock publishes the seed as the public key.
    fn signing_public_key(&self, seed: &[u8; 32]) -> [u8; 32] {
        *seed
    }

    fn sign(&self, seed: &[u8; 32], message: &[u8]) -> Signature {
        Signature::from_bytes(Self::mock_signature(seed, message))
    }

    fn verify(&self, public_key: &PublicKey, message: &[u8], sig: &Signature) -> bool {
        // The mock's "public key" is the seed itself.
        let expected = Self::mock_signature(public_key.as_bytes(), message);
        sig.as_bytes() == &expected
    }

    fn encrypt(&self, key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.fail_encrypt.load(Ordering::SeqCst) {
            return Err(CryptoError::EncryptionFailed);
        }
        let mut out = Vec::with_capacity(plaintext.len() + 1);
        out.push(0xee);
        out.extend(plaintext.iter().zip(key.as_bytes().iter().cycle()).map(|(p, k)| p ^ k));
        Ok(out)
    }

    fn decrypt(&self, key: &SymmetricKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.fail_decrypt.load(Ordering::SeqCst) {
            return Err(CryptoError::DecryptionFailed);
        }
        if ciphertext.first() != Some(&0xee) {
            return Err(CryptoError::DecryptionFailed);
        }
        Ok(ciphertext[1..]
            .iter()
            .zip(key.as_bytes().iter().cycle())
            .map(|(c, k)| c ^ k)
            .collect())
    }

    fn derive_key(&self, salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> SymmetricKey {
        SymmetricKey::from_bytes(HKDF::derive_key(salt, ikm, info))
    }

    fn wrap_key(
        &self,
        our_secret: &[u8; 32],
        their_public: &[u8; 32],
        key: &SymmetricKey,
    ) -> Result<Vec<u8>, CryptoError> {
        // Symmetric mock "ECDH": xor of the two sides, same from either end.
        let mut shared = [0u8; 32];
        for i in 0..32 {
            shared[i] = our_secret[i] ^ their_public[i];
        }
        let wrapping_key = self.derive_key(None, &shared, KEY_WRAP_INFO);
        self.encrypt(&wrapping_key, key.as_bytes())
    }

    fn unwrap_key(
        &self,
        our_secret: &[u8; 32],
        their_public: &[u8; 32],
        wrapped: &[u8],
    ) -> Result<SymmetricKey, CryptoError> {
        let mut shared = [0u8; 32];
        for i in 0..32 {
            shared[i] = our_secret[i] ^ their_public[i];
        }
        let wrapping_key = self.derive_key(None, &shared, KEY_WRAP_INFO);
        let bytes = self.decrypt(&wrapping_key, wrapped)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyMaterial("wrapped key is not 32 bytes".into()))?;
        Ok(SymmetricKey::from_bytes(bytes))
    }

    fn self_check(&self) -> Result<(), CryptoError> {
        if self.fail_self_check.load(Ordering::SeqCst) {
            return Err(CryptoError::SelfCheckFailed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_provider_self_check() {
        let provider = RingCryptoProvider::new();
        assert!(provider.self_check().is_ok());
    }

    #[test]
    fn test_ring_wrap_unwrap_roundtrip() {
        let provider = RingCryptoProvider::new();
        let alice_secret = provider.generate_exchange_secret().unwrap();
        let bob_secret = provider.generate_exchange_secret().unwrap();
        let alice_public = provider.exchange_public_key(&alice_secret);
        let bob_public = provider.exchange_public_key(&bob_secret);

        let key = SymmetricKey::generate();
        let wrapped = provider.wrap_key(&alice_secret, &bob_public, &key).unwrap();
        let unwrapped = provider.unwrap_key(&bob_secret, &alice_public, &wrapped).unwrap();

        assert_eq!(key.as_bytes(), unwrapped.as_bytes());
    }

    #[test]
    fn test_mock_sign_verify() {
        let provider = MockCryptoProvider::new();
        let seed = provider.generate_signing_seed().unwrap();
        let sig = provider.sign(&seed, b"nonce");
        // Mock public key is the seed itself
        assert!(provider.verify(&PublicKey::from_bytes(seed), b"nonce", &sig));
        assert!(!provider.verify(&PublicKey::from_bytes(seed), b"other", &sig));
    }

    #[test]
    fn test_mock_failure_injection() {
        let provider = MockCryptoProvider::new();
        provider.fail_encrypt.store(true, Ordering::SeqCst);
        let key = SymmetricKey::from_bytes([1u8; 32]);
        assert!(provider.encrypt(&key, b"data").is_err());
    }

    #[test]
    fn test_mock_self_check_injection() {
        let provider = MockCryptoProvider::new();
        assert!(provider.self_check().is_ok());
        provider.fail_self_check.store(true, Ordering::SeqCst);
        assert!(matches!(
            provider.self_check(),
            Err(CryptoError::SelfCheckFailed)
        ));
    }
}
