//! Device Registry Tests
//!
//! Trust lifecycle, security scoring, signed snapshots and atomic key
//! rotation.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;

use common::{mock_device, mock_secret};
use sealink_core::{
    CryptoProvider, DeviceError, DeviceRegistry, MockCryptoProvider, SigningKeyPair, TrustState,
    MAX_DEVICES,
};

fn registry_with_own() -> (DeviceRegistry, SigningKeyPair) {
    let signing_key = SigningKeyPair::from_seed(&[0x42u8; 32]);
    let mut own = mock_device(1, "phone");
    own.trust = TrustState::Trusted;
    (DeviceRegistry::new(own, &signing_key), signing_key)
}

#[test]
fn test_new_device_starts_pending() {
    let (mut registry, key) = registry_with_own();
    registry.register_device(mock_device(2, "laptop"), &key).unwrap();

    let device = registry.find_device(&[2u8; 32]).unwrap();
    assert_eq!(device.trust, TrustState::Pending);
}

#[test]
fn test_trust_transition_and_noop() {
    let (mut registry, key) = registry_with_own();
    registry.register_device(mock_device(2, "laptop"), &key).unwrap();

    assert!(registry.trust_device(&[2u8; 32], &key).unwrap());
    // Trusting an already-trusted device is a no-op.
    assert!(!registry.trust_device(&[2u8; 32], &key).unwrap());
    assert_eq!(
        registry.find_device(&[2u8; 32]).unwrap().trust,
        TrustState::Trusted
    );
}

#[test]
fn test_revoked_device_never_retrusted() {
    let (mut registry, key) = registry_with_own();
    registry.register_device(mock_device(2, "laptop"), &key).unwrap();
    registry.trust_device(&[2u8; 32], &key).unwrap();
    registry.revoke_device(&[2u8; 32], "lost", &key).unwrap();

    // Trust after revocation is a no-op, not a transition.
    assert!(!registry.trust_device(&[2u8; 32], &key).unwrap());
    assert_eq!(
        registry.find_device(&[2u8; 32]).unwrap().trust,
        TrustState::Revoked
    );
}

#[test]
fn test_security_score_floor() {
    let (mut registry, key) = registry_with_own();
    assert_eq!(registry.security_score(), 100);

    for i in 2..=7u8 {
        registry
            .register_device(mock_device(i, &format!("d{}", i)), &key)
            .unwrap();
    }
    // Six pending devices would put 100 - 60 = 40 below the floor.
    assert_eq!(registry.untrusted_count(), 6);
    assert_eq!(registry.security_score(), 50);
}

#[test]
fn test_score_recovers_as_devices_are_trusted() {
    let (mut registry, key) = registry_with_own();
    registry.register_device(mock_device(2, "a"), &key).unwrap();
    registry.register_device(mock_device(3, "b"), &key).unwrap();
    assert_eq!(registry.security_score(), 80);

    registry.trust_device(&[2u8; 32], &key).unwrap();
    assert_eq!(registry.security_score(), 90);
    registry.trust_device(&[3u8; 32], &key).unwrap();
    assert_eq!(registry.security_score(), 100);
}

#[test]
fn test_max_devices_cap() {
    let (mut registry, key) = registry_with_own();
    for i in 2..=(MAX_DEVICES as u8) {
        registry
            .register_device(mock_device(i, &format!("d{}", i)), &key)
            .unwrap();
    }
    let overflow = registry.register_device(mock_device(200, "extra"), &key);
    assert!(matches!(overflow, Err(DeviceError::MaxDevicesReached)));
}

#[test]
fn test_duplicate_registration_rejected() {
    let (mut registry, key) = registry_with_own();
    registry.register_device(mock_device(2, "laptop"), &key).unwrap();
    assert!(matches!(
        registry.register_device(mock_device(2, "laptop again"), &key),
        Err(DeviceError::DeviceAlreadyExists)
    ));
}

#[test]
fn test_cannot_revoke_last_trusted_device() {
    let (mut registry, key) = registry_with_own();
    assert!(matches!(
        registry.revoke_device(&[1u8; 32], "why not", &key),
        Err(DeviceError::CannotRevokeLastDevice)
    ));
}

#[test]
fn test_revocation_certificate_verifies() {
    let (mut registry, key) = registry_with_own();
    registry.register_device(mock_device(2, "laptop"), &key).unwrap();
    registry.trust_device(&[2u8; 32], &key).unwrap();

    let certificate = registry.revoke_device(&[2u8; 32], "stolen", &key).unwrap();
    assert_eq!(certificate.device_id(), &[2u8; 32]);
    assert_eq!(certificate.reason(), "stolen");
    assert!(certificate.verify(&key.public_key()));
}

#[test]
fn test_registry_signature_survives_json_roundtrip() {
    let (mut registry, key) = registry_with_own();
    registry.register_device(mock_device(2, "laptop"), &key).unwrap();

    let restored = DeviceRegistry::from_json(&registry.to_json()).unwrap();
    assert!(restored.verify(&key.public_key()));
    assert_eq!(restored.version(), registry.version());
    assert_eq!(restored.all_devices().len(), 2);
}

#[test]
fn test_rotation_bumps_generation_and_wraps_for_trusted_only() {
    let provider = MockCryptoProvider::new();
    let (mut registry, key) = registry_with_own();
    registry.register_device(mock_device(2, "laptop"), &key).unwrap();
    registry.trust_device(&[2u8; 32], &key).unwrap();
    registry.register_device(mock_device(3, "pending"), &key).unwrap();

    let rotation = registry.rotate_keys(&provider, &mock_secret(1), &key).unwrap();
    assert_eq!(rotation.generation, 1);
    assert_eq!(registry.key_generation(), 1);
    // Own device and the trusted laptop, not the pending tablet.
    assert_eq!(rotation.wrapped.len(), 2);
    assert!(rotation.wrapped.iter().all(|(id, _)| id != &[3u8; 32]));
}

#[test]
fn test_rotation_is_all_or_nothing() {
    let provider = MockCryptoProvider::new();
    let (mut registry, key) = registry_with_own();
    registry.register_device(mock_device(2, "laptop"), &key).unwrap();
    registry.trust_device(&[2u8; 32], &key).unwrap();
    let version_before = registry.version();

    provider.fail_encrypt.store(true, Ordering::SeqCst);
    assert!(registry.rotate_keys(&provider, &mock_secret(1), &key).is_err());

    // Nothing committed on partial failure.
    assert_eq!(registry.key_generation(), 0);
    assert_eq!(registry.version(), version_before);

    provider.fail_encrypt.store(false, Ordering::SeqCst);
    let rotation = registry.rotate_keys(&provider, &mock_secret(1), &key).unwrap();
    assert_eq!(rotation.generation, 1);
}

#[test]
fn test_rotated_key_unwraps_on_recipient() {
    let provider = MockCryptoProvider::new();
    let (mut registry, key) = registry_with_own();
    registry.register_device(mock_device(2, "laptop"), &key).unwrap();
    registry.trust_device(&[2u8; 32], &key).unwrap();

    let rotation = registry.rotate_keys(&provider, &mock_secret(1), &key).unwrap();
    let (_, wrapped) = rotation
        .wrapped
        .iter()
        .find(|(id, _)| id == &[2u8; 32])
        .unwrap();

    let sender_public = provider.exchange_public_key(&mock_secret(1));
    let unwrapped = provider
        .unwrap_key(&mock_secret(2), &sender_public, wrapped)
        .unwrap();
    assert_eq!(unwrapped.as_bytes(), rotation.new_key.as_bytes());
}

#[test]
fn test_concurrent_registration_thread_safety() {
    let (registry, key) = registry_with_own();
    let registry = Arc::new(Mutex::new(registry));
    let key = Arc::new(key);

    let handles: Vec<_> = (2..6u8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let key = Arc::clone(&key);
            thread::spawn(move || {
                let mut reg = registry.lock().unwrap();
                reg.register_device(mock_device(i, &format!("d{}", i)), &key)
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(successes, 4);
    assert_eq!(registry.lock().unwrap().active_count(), 5);
}
