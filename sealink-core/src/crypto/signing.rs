// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Ed25519 signing and verification via ring.

use ring::signature::{self, Ed25519KeyPair, KeyPair as _};
use zeroize::Zeroize;

/// An Ed25519 signature (64 bytes).
#[derive(Clone, Copy)]
pub struct Signature {
    bytes: [u8; 64],
}

impl Signature {
    /// Creates a signature from raw bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Signature { bytes }
    }

    /// Returns the signature bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.bytes[..8]))
    }
}

/// An Ed25519 public key used for verification.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    bytes: [u8; 32],
}

impl PublicKey {
    /// Creates a public key from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PublicKey { bytes }
    }

    /// Returns the public key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Verifies a signature over a message.
    pub fn verify(&self, message: &[u8], sig: &Signature) -> bool {
        let key = signature::UnparsedPublicKey::new(&signature::ED25519, self.bytes);
        key.verify(message, sig.as_bytes()).is_ok()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.bytes))
    }
}

/// An Ed25519 keypair.
///
/// The seed is retained so the pair can be persisted and re-derived; it is
/// zeroized on drop.
pub struct SigningKeyPair {
    seed: [u8; 32],
    keypair: Ed25519KeyPair,
}

impl SigningKeyPair {
    /// Generates a new random keypair.
    pub fn generate() -> Self {
        let rng = ring::rand::SystemRandom::new();
        let seed = ring::rand::generate::<[u8; 32]>(&rng)
            .expect("System RNG should not fail")
            .expose();
        Self::from_seed(&seed)
    }

    /// Derives a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let keypair = Ed25519KeyPair::from_seed_unchecked(seed)
            .expect("32-byte seed is always a valid Ed25519 seed");
        SigningKeyPair {
            seed: *seed,
            keypair,
        }
    }

    /// Returns the seed bytes.
    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    /// Returns the public key.
    pub fn public_key(&self) -> PublicKey {
        let bytes: [u8; 32] = self
            .keypair
            .public_key()
            .as_ref()
            .try_into()
            .expect("Ed25519 public key is 32 bytes");
        PublicKey::from_bytes(bytes)
    }

    /// Signs a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.keypair.sign(message);
        let bytes: [u8; 64] = sig
            .as_ref()
            .try_into()
            .expect("Ed25519 signature is 64 bytes");
        Signature::from_bytes(bytes)
    }
}

impl Drop for SigningKeyPair {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public_key", &self.public_key())
            .field("seed", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let pair = SigningKeyPair::generate();
        let sig = pair.sign(b"challenge nonce");
        assert!(pair.public_key().verify(b"challenge nonce", &sig));
    }

    #[test]
    fn test_tampered_message_fails() {
        let pair = SigningKeyPair::generate();
        let sig = pair.sign(b"challenge nonce");
        assert!(!pair.public_key().verify(b"challenge n0nce", &sig));
    }

    #[test]
    fn test_seed_determinism() {
        let seed = [7u8; 32];
        let a = SigningKeyPair::from_seed(&seed);
        let b = SigningKeyPair::from_seed(&seed);
        assert_eq!(a.public_key(), b.public_key());
    }
}
