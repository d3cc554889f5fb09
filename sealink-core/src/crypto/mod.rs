// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod encryption;
pub mod kdf;
pub mod provider;
pub mod signing;

pub use encryption::{decrypt, encrypt, EncryptionError, SymmetricKey};
pub use kdf::HKDF;
pub use provider::{CryptoError, CryptoProvider, MockCryptoProvider, RingCryptoProvider};
pub use signing::{PublicKey, Signature, SigningKeyPair};
