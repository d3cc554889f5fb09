// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! HKDF-SHA256 key derivation with domain separation.

use ring::hkdf;

/// HKDF output length marker for a 32-byte key.
struct OkmLen32;

impl hkdf::KeyType for OkmLen32 {
    fn len(&self) -> usize {
        32
    }
}

/// HKDF-SHA256 wrapper producing 32-byte keys.
pub struct HKDF;

impl HKDF {
    /// Derives a 32-byte key from input keying material.
    ///
    /// `salt` is optional (None uses a zero salt per RFC 5869), `info`
    /// provides domain separation between derivation contexts.
    pub fn derive_key(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> [u8; 32] {
        let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, salt.unwrap_or(&[]));
        let prk = salt.extract(ikm);
        let info_refs = [info];
        let okm = prk
            .expand(&info_refs, OkmLen32)
            .expect("HKDF expand with 32-byte output cannot fail");

        let mut out = [0u8; 32];
        okm.fill(&mut out)
            .expect("HKDF fill with matching length cannot fail");
        out
    }
}
