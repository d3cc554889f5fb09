// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Verification Challenges
//!
//! A challenge is a time-bounded proof-of-possession exchange used to
//! elevate a device from pending to trusted. State machine per challenge:
//! `Issued -> {Verified | Expired | Failed}`, terminal once resolved.

use serde::{Deserialize, Serialize};

use crate::device::hex_array_32;

/// How a challenge is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    /// Signature over the nonce with the device's private key.
    SecurityKey,
    /// Out-of-band code (email/SMS) compared by exact match.
    VerificationCode,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::SecurityKey => "security_key",
            VerificationMethod::VerificationCode => "verification_code",
        }
    }
}

/// Challenge lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    /// Live, awaiting resolution.
    Issued,
    /// Resolved successfully. Terminal.
    Verified,
    /// Deadline passed before resolution. Terminal.
    Expired,
    /// Resolution failed, or a newer challenge superseded this one. Terminal.
    Failed,
}

impl ChallengeState {
    /// Returns whether the challenge can still be resolved.
    pub fn is_live(&self) -> bool {
        matches!(self, ChallengeState::Issued)
    }
}

/// A single verification challenge.
///
/// The legacy camelCase field spelling from the v1 API is accepted on input
/// only; serialization always emits the canonical snake_case schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationChallenge {
    /// Unique challenge ID.
    pub challenge_id: String,
    /// The device being verified.
    #[serde(with = "hex_array_32")]
    pub device_id: [u8; 32],
    /// Verification method.
    #[serde(rename = "verification_type", alias = "verificationType")]
    pub method: VerificationMethod,
    /// Random nonce to be signed (security-key method).
    #[serde(with = "hex_array_32")]
    pub nonce: [u8; 32],
    /// When the challenge was issued (Unix seconds).
    pub issued_at: u64,
    /// Deadline; `None` means the challenge never expires.
    #[serde(rename = "expires_at", alias = "expiresAt")]
    pub expires_at: Option<u64>,
    /// Current state.
    pub state: ChallengeState,
    /// Expected out-of-band code (verification-code method only). Not
    /// serialized: the code travels out of band, never with the challenge.
    #[serde(skip)]
    pub(crate) expected_code: Option<String>,
    /// Public key the nonce signature is checked against.
    #[serde(skip)]
    pub(crate) verifying_key: [u8; 32],
}

impl VerificationChallenge {
    /// Returns whether the deadline has passed at `now`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(deadline) => now > deadline,
            None => false,
        }
    }
}

/// Caller's answer to a challenge.
#[derive(Debug, Clone)]
pub enum VerificationResponse {
    /// Signature over the challenge nonce (security-key and QR scan flows).
    Signature([u8; 64]),
    /// Out-of-band code entered by the user.
    Code(String),
}

/// Outcome of a resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Challenge verified; the device may now be trusted.
    Verified,
    /// Wrong code entered; the challenge stays live for another attempt.
    /// Callers are expected to rate-limit retries.
    CodeMismatch,
}
