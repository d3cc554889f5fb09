// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Signed Device Registry
//!
//! The registry is the single owner of Device records. Every mutation bumps
//! the version counter and re-signs the canonical encoding with the identity
//! signing key, so peers can verify which devices are live.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::{hex_array_32, hex_array_64, Device, DeviceError, TrustState};
use crate::crypto::{CryptoProvider, PublicKey, Signature, SigningKeyPair, SymmetricKey};

/// Maximum number of linked devices per identity.
pub const MAX_DEVICES: usize = 10;

/// Security score floor. More untrusted devices never look worse than this.
const SCORE_FLOOR: u8 = 50;

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Registry of all devices linked to an identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRegistry {
    /// All registered devices, including revoked ones.
    devices: Vec<Device>,
    /// The acting device's ID.
    #[serde(with = "hex_array_32")]
    own_device_id: [u8; 32],
    /// Version counter (increments on each change).
    version: u64,
    /// Conversation key generation. Bumped by every completed rotation;
    /// sync refuses to decrypt with a stale generation.
    key_generation: u64,
    /// Signature over the registry by the identity signing key.
    #[serde(with = "hex_array_64")]
    signature: [u8; 64],
}

/// Result of a completed key rotation.
///
/// Built in full before the registry commits the new generation, so a
/// failure while wrapping leaves the old generation intact.
pub struct KeyRotation {
    /// The generation this rotation produced.
    pub generation: u64,
    /// The new conversation key for the acting device.
    pub new_key: SymmetricKey,
    /// `(device_id, wrapped_key)` for every trusted device.
    pub wrapped: Vec<([u8; 32], Vec<u8>)>,
}

impl DeviceRegistry {
    /// Creates a new registry containing only the acting device.
    pub fn new(own_device: Device, signing_key: &SigningKeyPair) -> Self {
        let own_device_id = own_device.id;
        let mut registry = DeviceRegistry {
            devices: vec![own_device],
            own_device_id,
            version: 1,
            key_generation: 0,
            signature: [0u8; 64],
        };
        registry.recompute_scores();
        registry.sign(signing_key);
        registry
    }

    /// Returns the registry version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the current conversation key generation.
    pub fn key_generation(&self) -> u64 {
        self.key_generation
    }

    /// Returns all devices (including revoked).
    pub fn all_devices(&self) -> &[Device] {
        &self.devices
    }

    /// Returns only devices that may hold key material.
    pub fn trusted_devices(&self) -> Vec<&Device> {
        self.devices.iter().filter(|d| d.is_trusted()).collect()
    }

    /// Returns the number of non-revoked devices.
    pub fn active_count(&self) -> usize {
        self.devices.iter().filter(|d| d.is_active()).count()
    }

    /// Returns the number of active-but-untrusted devices.
    pub fn untrusted_count(&self) -> usize {
        self.devices
            .iter()
            .filter(|d| d.trust == TrustState::Pending)
            .count()
    }

    /// Finds a device by ID.
    pub fn find_device(&self, device_id: &[u8; 32]) -> Option<&Device> {
        self.devices.iter().find(|d| &d.id == device_id)
    }

    /// Returns whether the given ID is the acting device.
    ///
    /// Callers use this on revocation: revoking one's own device must lock
    /// the whole session, which is a UI concern outside the registry.
    pub fn is_own_device(&self, device_id: &[u8; 32]) -> bool {
        &self.own_device_id == device_id
    }

    /// Returns the acting device's ID.
    pub fn own_device_id(&self) -> &[u8; 32] {
        &self.own_device_id
    }

    /// Aggregate security score: `max(50, 100 - 10 * untrusted_count)`.
    pub fn security_score(&self) -> u8 {
        let untrusted = self.untrusted_count() as u32;
        let penalty = 10u32.saturating_mul(untrusted);
        (100u32.saturating_sub(penalty)).max(SCORE_FLOOR as u32) as u8
    }

    fn recompute_scores(&mut self) {
        let score = self.security_score();
        for device in &mut self.devices {
            device.security_score = score;
        }
    }

    /// Adds a newly registered device in `Pending` state.
    pub fn register_device(
        &mut self,
        mut device: Device,
        signing_key: &SigningKeyPair,
    ) -> Result<(), DeviceError> {
        if device.name.is_empty() {
            return Err(DeviceError::EmptyDeviceName);
        }
        if self.active_count() >= MAX_DEVICES {
            return Err(DeviceError::MaxDevicesReached);
        }
        if self.find_device(&device.id).is_some() {
            return Err(DeviceError::DeviceAlreadyExists);
        }

        device.trust = TrustState::Pending;
        device.revoked_at = None;
        self.devices.push(device);
        self.version += 1;
        self.recompute_scores();
        self.sign(signing_key);
        Ok(())
    }

    /// Elevates a pending device to trusted.
    ///
    /// Returns `Ok(true)` when the state changed. Calling on an already
    /// trusted device is a no-op; calling on a revoked device is a no-op
    /// and the device stays revoked.
    pub fn trust_device(
        &mut self,
        device_id: &[u8; 32],
        signing_key: &SigningKeyPair,
    ) -> Result<bool, DeviceError> {
        let device = self
            .devices
            .iter_mut()
            .find(|d| &d.id == device_id)
            .ok_or(DeviceError::DeviceNotFound)?;

        match device.trust {
            TrustState::Pending => {
                device.trust = TrustState::Trusted;
                device.last_used_at = current_timestamp();
                self.version += 1;
                self.recompute_scores();
                self.sign(signing_key);
                Ok(true)
            }
            TrustState::Trusted | TrustState::Revoked => Ok(false),
        }
    }

    /// Revokes a device and returns a certificate peers can verify.
    ///
    /// Revocation is permanent: a revoked ID can never re-enter trusted
    /// state; a fresh registration gets a fresh ID.
    pub fn revoke_device(
        &mut self,
        device_id: &[u8; 32],
        reason: &str,
        signing_key: &SigningKeyPair,
    ) -> Result<RevocationCertificate, DeviceError> {
        let device = self
            .devices
            .iter()
            .find(|d| &d.id == device_id)
            .ok_or(DeviceError::DeviceNotFound)?;

        if device.is_active() && self.active_count() <= 1 {
            return Err(DeviceError::CannotRevokeLastDevice);
        }

        let revoked_at = current_timestamp();
        let device = self
            .devices
            .iter_mut()
            .find(|d| &d.id == device_id)
            .ok_or(DeviceError::DeviceNotFound)?;

        if device.trust != TrustState::Revoked {
            device.trust = TrustState::Revoked;
            device.revoked_at = Some(revoked_at);
            self.version += 1;
            self.recompute_scores();
            self.sign(signing_key);
        }

        Ok(RevocationCertificate::create(
            device_id,
            reason.to_string(),
            signing_key,
        ))
    }

    /// Updates a device's last-used timestamp.
    pub fn touch(&mut self, device_id: &[u8; 32]) {
        if let Some(device) = self.devices.iter_mut().find(|d| &d.id == device_id) {
            device.last_used_at = current_timestamp();
        }
    }

    /// Rotates the conversation key and re-wraps it for all trusted devices.
    ///
    /// All-or-nothing: every trusted device's wrap must succeed before the
    /// generation is committed. On any wrap failure the registry is left
    /// unchanged and the caller reports `EncryptionFailed`.
    pub fn rotate_keys(
        &mut self,
        provider: &dyn CryptoProvider,
        own_exchange_secret: &[u8; 32],
        signing_key: &SigningKeyPair,
    ) -> Result<KeyRotation, DeviceError> {
        let mut key_bytes = [0u8; 32];
        provider
            .random_bytes(&mut key_bytes)
            .map_err(|e| DeviceError::RotationFailed(e.to_string()))?;
        let new_key = SymmetricKey::from_bytes(key_bytes);

        // Wrap for every trusted device before committing anything.
        let mut wrapped = Vec::new();
        for device in self.trusted_devices() {
            let wrap = provider
                .wrap_key(own_exchange_secret, &device.exchange_public_key, &new_key)
                .map_err(|_| DeviceError::RotationFailed(device.id_hex()))?;
            wrapped.push((device.id, wrap));
        }

        self.key_generation += 1;
        self.version += 1;
        self.sign(signing_key);

        Ok(KeyRotation {
            generation: self.key_generation,
            new_key,
            wrapped,
        })
    }

    /// Signs the registry with the identity signing key.
    fn sign(&mut self, signing_key: &SigningKeyPair) {
        let data = self.signing_data();
        let signature = signing_key.sign(&data);
        self.signature = *signature.as_bytes();
    }

    /// Verifies the registry signature.
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        let data = self.signing_data();
        let signature = Signature::from_bytes(self.signature);
        public_key.verify(&data, &signature)
    }

    /// Canonical byte encoding covered by the signature.
    fn signing_data(&self) -> Vec<u8> {
        // version || generation || device_count || [id || exchange_pk || trust]*
        let mut data = Vec::new();
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(&self.key_generation.to_le_bytes());
        data.extend_from_slice(&(self.devices.len() as u32).to_le_bytes());
        for device in &self.devices {
            data.extend_from_slice(&device.id);
            data.extend_from_slice(&device.exchange_public_key);
            data.push(match device.trust {
                TrustState::Pending => 0,
                TrustState::Trusted => 1,
                TrustState::Revoked => 2,
            });
        }
        data
    }

    /// Serializes the registry to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Registry serialization should not fail")
    }

    /// Deserializes a registry from JSON.
    pub fn from_json(json: &str) -> Result<Self, DeviceError> {
        serde_json::from_str(json).map_err(|_| DeviceError::InvalidRegistrySignature)
    }
}

/// A signed certificate proving that a device has been revoked.
///
/// Shared with peers so they stop wrapping keys for the revoked device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationCertificate {
    /// ID of the revoked device.
    #[serde(with = "hex_array_32")]
    device_id: [u8; 32],
    /// Reason for revocation (may be empty).
    reason: String,
    /// Timestamp when revoked.
    revoked_at: u64,
    /// Signature by the identity signing key.
    #[serde(with = "hex_array_64")]
    signature: [u8; 64],
}

impl RevocationCertificate {
    /// Creates and signs a new revocation certificate.
    pub fn create(device_id: &[u8; 32], reason: String, signing_key: &SigningKeyPair) -> Self {
        let mut certificate = RevocationCertificate {
            device_id: *device_id,
            reason,
            revoked_at: current_timestamp(),
            signature: [0u8; 64],
        };
        certificate.sign(signing_key);
        certificate
    }

    pub fn device_id(&self) -> &[u8; 32] {
        &self.device_id
    }

    pub fn revoked_at(&self) -> u64 {
        self.revoked_at
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Verifies the certificate signature.
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        let data = self.signing_data();
        let signature = Signature::from_bytes(self.signature);
        public_key.verify(&data, &signature)
    }

    fn sign(&mut self, signing_key: &SigningKeyPair) {
        let data = self.signing_data();
        let signature = signing_key.sign(&data);
        self.signature = *signature.as_bytes();
    }

    fn signing_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"REVOKE:");
        data.extend_from_slice(&self.device_id);
        data.extend_from_slice(&self.revoked_at.to_le_bytes());
        data.extend_from_slice(self.reason.as_bytes());
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceType;

    fn test_device(id_byte: u8, name: &str) -> Device {
        Device {
            id: [id_byte; 32],
            name: name.to_string(),
            device_type: DeviceType::Desktop,
            trust: TrustState::Pending,
            security_score: 0,
            exchange_public_key: [id_byte; 32],
            verifying_key: [id_byte; 32],
            created_at: 0,
            last_used_at: 0,
            revoked_at: None,
        }
    }

    fn test_registry() -> (DeviceRegistry, SigningKeyPair) {
        let signing_key = SigningKeyPair::from_seed(&[42u8; 32]);
        let mut own = test_device(1, "laptop");
        own.trust = TrustState::Trusted;
        let registry = DeviceRegistry::new(own, &signing_key);
        (registry, signing_key)
    }

    #[test]
    fn test_trust_pending_device() {
        let (mut registry, key) = test_registry();
        registry.register_device(test_device(2, "phone"), &key).unwrap();

        assert_eq!(registry.find_device(&[2u8; 32]).unwrap().trust, TrustState::Pending);
        assert!(registry.trust_device(&[2u8; 32], &key).unwrap());
        assert_eq!(registry.find_device(&[2u8; 32]).unwrap().trust, TrustState::Trusted);
    }

    #[test]
    fn test_revoked_device_never_re_trusted() {
        let (mut registry, key) = test_registry();
        registry.register_device(test_device(2, "phone"), &key).unwrap();
        registry.trust_device(&[2u8; 32], &key).unwrap();
        registry.revoke_device(&[2u8; 32], "lost", &key).unwrap();

        let changed = registry.trust_device(&[2u8; 32], &key).unwrap();
        assert!(!changed);
        assert_eq!(registry.find_device(&[2u8; 32]).unwrap().trust, TrustState::Revoked);
    }

    #[test]
    fn test_security_score_floor() {
        let (mut registry, key) = test_registry();
        assert_eq!(registry.security_score(), 100);

        for i in 2..=6 {
            registry.register_device(test_device(i, "extra"), &key).unwrap();
        }
        // 5 untrusted devices hit the floor
        assert_eq!(registry.untrusted_count(), 5);
        assert_eq!(registry.security_score(), 50);
    }

    #[test]
    fn test_cannot_revoke_last_device() {
        let (mut registry, key) = test_registry();
        let own_id = *registry.own_device_id();
        assert!(matches!(
            registry.revoke_device(&own_id, "", &key),
            Err(DeviceError::CannotRevokeLastDevice)
        ));
    }

    #[test]
    fn test_registry_signature_survives_roundtrip() {
        let (registry, key) = test_registry();
        let json = registry.to_json();
        let restored = DeviceRegistry::from_json(&json).unwrap();
        assert!(restored.verify(&key.public_key()));
    }

    #[test]
    fn test_revocation_certificate_verifies() {
        let (mut registry, key) = test_registry();
        registry.register_device(test_device(2, "phone"), &key).unwrap();
        let cert = registry.revoke_device(&[2u8; 32], "stolen", &key).unwrap();
        assert!(cert.verify(&key.public_key()));
        assert_eq!(cert.reason(), "stolen");
    }
}
