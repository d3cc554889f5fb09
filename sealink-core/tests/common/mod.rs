//! Shared test helpers.
//!
//! Devices built here use the deterministic mock provider conventions:
//! exchange public key == exchange secret, verifying key == signing seed.

#![allow(dead_code)]

use sealink_core::{
    CryptoProvider, Device, DeviceType, LogEntry, SymmetricKey, TrustState,
};

/// A device whose key material is the given byte repeated.
pub fn mock_device(byte: u8, name: &str) -> Device {
    Device {
        id: [byte; 32],
        name: name.to_string(),
        device_type: DeviceType::Desktop,
        trust: TrustState::Pending,
        security_score: 0,
        exchange_public_key: [byte; 32],
        verifying_key: [byte; 32],
        created_at: 1_000,
        last_used_at: 1_000,
        revoked_at: None,
    }
}

/// The exchange secret matching `mock_device(byte, _)`.
pub fn mock_secret(byte: u8) -> [u8; 32] {
    [byte; 32]
}

/// Builds a log entry encrypted with the given key.
pub fn encrypted_entry(
    provider: &dyn CryptoProvider,
    key: &SymmetricKey,
    conversation_id: &str,
    message_id: &str,
    timestamp: u64,
    sequence: u64,
    key_id: &str,
    key_generation: u64,
    plaintext: &[u8],
) -> LogEntry {
    LogEntry {
        conversation_id: conversation_id.to_string(),
        message_id: message_id.to_string(),
        timestamp,
        sequence,
        ciphertext: provider.encrypt(key, plaintext).expect("mock encrypt"),
        key_id: key_id.to_string(),
        key_generation,
    }
}

/// A log entry whose ciphertext no key can decrypt.
pub fn garbage_entry(
    conversation_id: &str,
    message_id: &str,
    timestamp: u64,
    sequence: u64,
    key_id: &str,
) -> LogEntry {
    LogEntry {
        conversation_id: conversation_id.to_string(),
        message_id: message_id.to_string(),
        timestamp,
        sequence,
        // Missing mock framing byte, so decrypt always fails.
        ciphertext: vec![0xff, 0x00, 0x01],
        key_id: key_id.to_string(),
        key_generation: 0,
    }
}
