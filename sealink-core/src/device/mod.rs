// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device Trust Management
//!
//! Owns the set of devices associated with one identity, their trust state
//! and security scores. Trust elevation goes through the verification
//! engine; revocation is permanent for a given registration.

mod registry;

pub use registry::{DeviceRegistry, KeyRotation, RevocationCertificate, MAX_DEVICES};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Device-related errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Maximum devices ({MAX_DEVICES}) reached")]
    MaxDevicesReached,
    #[error("Device not found")]
    DeviceNotFound,
    #[error("Cannot revoke last trusted device")]
    CannotRevokeLastDevice,
    #[error("Device already exists")]
    DeviceAlreadyExists,
    #[error("Device is revoked and cannot change trust state")]
    DeviceRevoked,
    #[error("Invalid registry signature")]
    InvalidRegistrySignature,
    #[error("Device name cannot be empty")]
    EmptyDeviceName,
    #[error("Key rotation failed for device {0}")]
    RotationFailed(String),
}

/// Kind of hardware a device runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Mobile,
    Desktop,
    Tablet,
    Web,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Desktop => "desktop",
            DeviceType::Tablet => "tablet",
            DeviceType::Web => "web",
        }
    }
}

/// Whether a device is authorized to hold conversation key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustState {
    /// Registered but not yet verified.
    Pending,
    /// Verified; receives wrapped conversation keys.
    Trusted,
    /// Explicitly removed; never returns to Trusted without re-registration.
    Revoked,
}

/// A device entry in the registry (public information only).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    /// Unique device ID (32 random bytes).
    #[serde(with = "hex_array_32")]
    pub id: [u8; 32],
    /// Human-readable name.
    pub name: String,
    /// Hardware kind.
    pub device_type: DeviceType,
    /// Current trust state.
    pub trust: TrustState,
    /// Aggregate security score, 50..=100 once computed.
    pub security_score: u8,
    /// Device's X25519 public key for receiving wrapped keys.
    #[serde(with = "hex_array_32")]
    pub exchange_public_key: [u8; 32],
    /// Device's Ed25519 public key for security-key challenges.
    #[serde(with = "hex_array_32")]
    pub verifying_key: [u8; 32],
    /// Creation timestamp (Unix seconds).
    pub created_at: u64,
    /// Last activity timestamp (Unix seconds).
    pub last_used_at: u64,
    /// Revocation timestamp, if revoked.
    pub revoked_at: Option<u64>,
}

impl Device {
    /// Returns the device ID as a hex string.
    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// Returns whether this device may hold key material.
    pub fn is_trusted(&self) -> bool {
        self.trust == TrustState::Trusted
    }

    /// Returns whether this device is still registered (not revoked).
    pub fn is_active(&self) -> bool {
        self.trust != TrustState::Revoked
    }
}

/// Request payload for registering a new device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub device_type: DeviceType,
}

/// Serde shim for `[u8; 32]` as hex strings.
pub(crate) mod hex_array_32 {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

/// Serde shim for `[u8; 64]` as hex strings.
pub(crate) mod hex_array_64 {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 64 bytes"))
    }
}
