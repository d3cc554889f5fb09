// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Verification QR Codes
//!
//! Generation and parsing of scannable verification payloads. Scanning the
//! code on an already-trusted device is equivalent to answering the
//! underlying challenge with a security-key signature.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::VerifyError;
use crate::crypto::{PublicKey, Signature, SigningKeyPair};

/// QR code magic bytes to identify Sealink verification codes.
const MAGIC: &[u8; 4] = b"SLVQ";

/// Protocol version for verification QR codes.
const QR_VERSION: u8 = 1;

/// Scannable payload carried inside the QR frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrPayload {
    /// URL the scanning device posts its resolution to.
    #[serde(rename = "verification_url", alias = "verificationUrl")]
    pub verification_url: String,
    /// The challenge this QR resolves.
    #[serde(rename = "challenge_id", alias = "challengeId")]
    pub challenge_id: String,
}

/// A signed, time-bounded verification QR code.
#[derive(Debug, Clone)]
pub struct VerificationQr {
    version: u8,
    payload: QrPayload,
    /// Identity public key of the issuer.
    issuer_key: [u8; 32],
    /// Unix timestamp when generated.
    timestamp: u64,
    /// Signature over version || issuer_key || timestamp || payload JSON.
    signature: [u8; 64],
}

impl VerificationQr {
    /// Generates a signed QR for a challenge.
    pub fn generate(
        verification_url: &str,
        challenge_id: &str,
        signing_key: &SigningKeyPair,
    ) -> Result<Self, VerifyError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::generate_with_timestamp(verification_url, challenge_id, signing_key, timestamp)
    }

    /// Generates a QR with a specific timestamp (for testing).
    pub fn generate_with_timestamp(
        verification_url: &str,
        challenge_id: &str,
        signing_key: &SigningKeyPair,
        timestamp: u64,
    ) -> Result<Self, VerifyError> {
        let payload = QrPayload {
            verification_url: verification_url.to_string(),
            challenge_id: challenge_id.to_string(),
        };
        let payload_json =
            serde_json::to_vec(&payload).map_err(|e| VerifyError::Serialization(e.to_string()))?;

        let issuer_key = *signing_key.public_key().as_bytes();

        let message = Self::signing_data(QR_VERSION, &issuer_key, timestamp, &payload_json);
        let signature = signing_key.sign(&message);

        Ok(VerificationQr {
            version: QR_VERSION,
            payload,
            issuer_key,
            timestamp,
            signature: *signature.as_bytes(),
        })
    }

    /// Returns the payload.
    pub fn payload(&self) -> &QrPayload {
        &self.payload
    }

    /// Returns the issuer's public key bytes.
    pub fn issuer_key(&self) -> &[u8; 32] {
        &self.issuer_key
    }

    /// Returns the generation timestamp.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Verifies the signature against the embedded issuer key.
    pub fn verify_signature(&self) -> bool {
        let payload_json = match serde_json::to_vec(&self.payload) {
            Ok(json) => json,
            Err(_) => return false,
        };
        let message = Self::signing_data(self.version, &self.issuer_key, self.timestamp, &payload_json);
        let public_key = PublicKey::from_bytes(self.issuer_key);
        public_key.verify(&message, &Signature::from_bytes(self.signature))
    }

    fn signing_data(version: u8, issuer_key: &[u8; 32], timestamp: u64, payload: &[u8]) -> Vec<u8> {
        let mut message = Vec::new();
        message.push(version);
        message.extend_from_slice(issuer_key);
        message.extend_from_slice(&timestamp.to_be_bytes());
        message.extend_from_slice(payload);
        message
    }

    /// Encodes the QR data string: base64(MAGIC || version || issuer_key || timestamp || payload_len || payload || signature).
    pub fn to_data_string(&self) -> Result<String, VerifyError> {
        let payload_json =
            serde_json::to_vec(&self.payload).map_err(|e| VerifyError::Serialization(e.to_string()))?;

        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        data.push(self.version);
        data.extend_from_slice(&self.issuer_key);
        data.extend_from_slice(&self.timestamp.to_be_bytes());
        data.extend_from_slice(&(payload_json.len() as u32).to_be_bytes());
        data.extend_from_slice(&payload_json);
        data.extend_from_slice(&self.signature);

        Ok(BASE64.encode(&data))
    }

    /// Parses QR data from a scanned string.
    pub fn from_data_string(data: &str) -> Result<Self, VerifyError> {
        let bytes = BASE64.decode(data).map_err(|_| VerifyError::InvalidQrFormat)?;

        // MAGIC(4) + version(1) + issuer(32) + timestamp(8) + len(4) + sig(64)
        const FIXED: usize = 4 + 1 + 32 + 8 + 4 + 64;
        if bytes.len() < FIXED {
            return Err(VerifyError::InvalidQrFormat);
        }
        if &bytes[0..4] != MAGIC {
            return Err(VerifyError::InvalidQrFormat);
        }
        let version = bytes[4];
        if version != QR_VERSION {
            return Err(VerifyError::InvalidProtocolVersion);
        }

        let issuer_key: [u8; 32] = bytes[5..37].try_into().expect("slice length checked");
        let timestamp = u64::from_be_bytes(bytes[37..45].try_into().expect("slice length checked"));
        let payload_len =
            u32::from_be_bytes(bytes[45..49].try_into().expect("slice length checked")) as usize;

        if bytes.len() != FIXED + payload_len {
            return Err(VerifyError::InvalidQrFormat);
        }
        let payload_json = &bytes[49..49 + payload_len];
        let signature: [u8; 64] = bytes[49 + payload_len..]
            .try_into()
            .map_err(|_| VerifyError::InvalidQrFormat)?;

        let payload: QrPayload =
            serde_json::from_slice(payload_json).map_err(|_| VerifyError::InvalidQrFormat)?;

        let qr = VerificationQr {
            version,
            payload,
            issuer_key,
            timestamp,
            signature,
        };

        if !qr.verify_signature() {
            return Err(VerifyError::InvalidSignature);
        }

        Ok(qr)
    }

    /// Renders to a QR code for display.
    pub fn to_qr_code(&self) -> Result<QrCode, VerifyError> {
        let data = self.to_data_string()?;
        QrCode::new(data.as_bytes()).map_err(|e| VerifyError::QrEncoding(e.to_string()))
    }
}
