// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Verification Engine
//!
//! Issues and resolves the challenges that move a device from pending to
//! trusted. Expiry is enforced here at resolution time; any client-side
//! countdown is cosmetic only.

mod challenge;
mod qr;

pub use challenge::{
    ChallengeState, Resolution, VerificationChallenge, VerificationMethod, VerificationResponse,
};
pub use qr::{QrPayload, VerificationQr};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use uuid::Uuid;

use crate::crypto::{CryptoProvider, PublicKey, Signature};
use crate::device::Device;

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Verification errors.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Unknown challenge: {0}")]
    UnknownChallenge(String),

    #[error("Challenge has expired")]
    ChallengeExpired,

    #[error("Challenge already resolved")]
    AlreadyResolved,

    #[error("Response does not match challenge method")]
    MethodMismatch,

    #[error("Invalid signature over challenge nonce")]
    InvalidSignature,

    #[error("Invalid QR format")]
    InvalidQrFormat,

    #[error("Unsupported QR protocol version")]
    InvalidProtocolVersion,

    #[error("QR encoding failed: {0}")]
    QrEncoding(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Random number generation failed")]
    RngFailure,
}

/// Rate limiter for verification-code attempts.
///
/// Resolution itself does not enforce single attempts; callers consult this
/// limiter to throttle repeated wrong codes within a rolling window.
#[derive(Debug, Clone)]
pub struct VerificationRateLimiter {
    /// Maximum attempts allowed per hour.
    pub max_attempts_per_hour: u32,
}

impl Default for VerificationRateLimiter {
    fn default() -> Self {
        Self {
            max_attempts_per_hour: 10,
        }
    }
}

impl VerificationRateLimiter {
    pub fn new(max_attempts_per_hour: u32) -> Self {
        Self {
            max_attempts_per_hour,
        }
    }

    /// Returns `true` if another attempt is allowed.
    ///
    /// `attempt_count` is the number of attempts already made in the window
    /// starting at `window_start` (Unix seconds).
    pub fn check_rate_limit(&self, attempt_count: u32, window_start: u64) -> bool {
        let now = current_timestamp();
        let window_expired = now.saturating_sub(window_start) >= 3600;

        if window_expired {
            true
        } else {
            attempt_count < self.max_attempts_per_hour
        }
    }
}

/// Issues and resolves verification challenges.
///
/// Owns challenge records; trust transitions are written back into the
/// device registry by the caller after a `Verified` resolution.
pub struct VerificationEngine {
    provider: Arc<dyn CryptoProvider>,
    challenges: HashMap<String, VerificationChallenge>,
}

impl VerificationEngine {
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        VerificationEngine {
            provider,
            challenges: HashMap::new(),
        }
    }

    /// Issues a new challenge for a device.
    ///
    /// Supersedes any live challenge for the same device and method: the
    /// prior one is marked failed and can no longer be resolved.
    pub fn initiate(
        &mut self,
        device: &Device,
        method: VerificationMethod,
        timeout_secs: Option<u64>,
    ) -> Result<VerificationChallenge, VerifyError> {
        // Invariant: at most one live challenge per device+method.
        for existing in self.challenges.values_mut() {
            if existing.device_id == device.id
                && existing.method == method
                && existing.state.is_live()
            {
                existing.state = ChallengeState::Failed;
            }
        }

        let mut nonce = [0u8; 32];
        self.provider
            .random_bytes(&mut nonce)
            .map_err(|_| VerifyError::RngFailure)?;

        let expected_code = match method {
            VerificationMethod::VerificationCode => Some(self.generate_code()?),
            VerificationMethod::SecurityKey => None,
        };

        let issued_at = current_timestamp();
        let challenge = VerificationChallenge {
            challenge_id: Uuid::new_v4().to_string(),
            device_id: device.id,
            method,
            nonce,
            issued_at,
            expires_at: timeout_secs.map(|t| issued_at + t),
            state: ChallengeState::Issued,
            expected_code,
            verifying_key: device.verifying_key,
        };

        self.challenges
            .insert(challenge.challenge_id.clone(), challenge.clone());
        Ok(challenge)
    }

    /// Generates a six-digit out-of-band code.
    fn generate_code(&self) -> Result<String, VerifyError> {
        let mut bytes = [0u8; 4];
        self.provider
            .random_bytes(&mut bytes)
            .map_err(|_| VerifyError::RngFailure)?;
        let n = u32::from_le_bytes(bytes) % 1_000_000;
        Ok(format!("{:06}", n))
    }

    /// Returns a challenge by ID.
    pub fn challenge(&self, challenge_id: &str) -> Option<&VerificationChallenge> {
        self.challenges.get(challenge_id)
    }

    /// Returns the live challenge for a device and method, if any.
    pub fn live_challenge_for(
        &self,
        device_id: &[u8; 32],
        method: VerificationMethod,
    ) -> Option<&VerificationChallenge> {
        self.challenges
            .values()
            .find(|c| &c.device_id == device_id && c.method == method && c.state.is_live())
    }

    /// Returns the out-of-band code for a live code challenge.
    ///
    /// The caller delivers this through a side channel (email/SMS); it is
    /// never embedded in the challenge payload itself.
    pub fn out_of_band_code(&self, challenge_id: &str) -> Option<&str> {
        self.challenges
            .get(challenge_id)
            .and_then(|c| c.expected_code.as_deref())
    }

    /// Attempts to resolve a challenge.
    ///
    /// Expiry is checked first: a correct response after the deadline still
    /// fails, and the challenge transitions to `Expired`. A wrong code
    /// returns `Resolution::CodeMismatch` and leaves the challenge live; a
    /// bad signature is a terminal failure.
    pub fn resolve(
        &mut self,
        challenge_id: &str,
        response: &VerificationResponse,
    ) -> Result<Resolution, VerifyError> {
        self.resolve_at(challenge_id, response, current_timestamp())
    }

    /// Resolution with an explicit clock (for testing expiry).
    pub fn resolve_at(
        &mut self,
        challenge_id: &str,
        response: &VerificationResponse,
        now: u64,
    ) -> Result<Resolution, VerifyError> {
        let challenge = self
            .challenges
            .get_mut(challenge_id)
            .ok_or_else(|| VerifyError::UnknownChallenge(challenge_id.to_string()))?;

        if !challenge.state.is_live() {
            return Err(VerifyError::AlreadyResolved);
        }

        if challenge.is_expired_at(now) {
            challenge.state = ChallengeState::Expired;
            return Err(VerifyError::ChallengeExpired);
        }

        match (challenge.method, response) {
            (VerificationMethod::SecurityKey, VerificationResponse::Signature(sig_bytes)) => {
                let key = PublicKey::from_bytes(challenge.verifying_key);
                let signature = Signature::from_bytes(*sig_bytes);
                if self.provider.verify(&key, &challenge.nonce, &signature) {
                    challenge.state = ChallengeState::Verified;
                    Ok(Resolution::Verified)
                } else {
                    challenge.state = ChallengeState::Failed;
                    Err(VerifyError::InvalidSignature)
                }
            }
            (VerificationMethod::VerificationCode, VerificationResponse::Code(code)) => {
                let expected = challenge.expected_code.as_deref().unwrap_or("");
                if expected == code {
                    challenge.state = ChallengeState::Verified;
                    Ok(Resolution::Verified)
                } else {
                    // Wrong code is a failed attempt, not a failed
                    // resolution: the challenge stays live.
                    Ok(Resolution::CodeMismatch)
                }
            }
            _ => {
                challenge.state = ChallengeState::Failed;
                Err(VerifyError::MethodMismatch)
            }
        }
    }

    /// Generates a signed QR code resolving the given challenge.
    pub fn generate_qr(
        &self,
        challenge_id: &str,
        verification_url: &str,
        signing_key: &crate::crypto::SigningKeyPair,
    ) -> Result<VerificationQr, VerifyError> {
        if self.challenges.get(challenge_id).is_none() {
            return Err(VerifyError::UnknownChallenge(challenge_id.to_string()));
        }
        VerificationQr::generate(verification_url, challenge_id, signing_key)
    }

    /// Drops resolved challenges older than `max_age_secs`.
    pub fn prune_resolved(&mut self, max_age_secs: u64) {
        let cutoff = current_timestamp().saturating_sub(max_age_secs);
        self.challenges
            .retain(|_, c| c.state.is_live() || c.issued_at >= cutoff);
    }
}
