//! Session API Tests
//!
//! End-to-end flows through the orchestrator: device onboarding, key
//! rotation, sync, recovery and persistence.

mod common;

use std::sync::{Arc, Mutex};

use common::{encrypted_entry, mock_device, mock_secret};
use sealink_core::api::{CallbackHandler, SealinkError, Session, SessionConfig, SessionEvent};
use sealink_core::{
    CryptoProvider, ErrorKind, MockCryptoProvider, MockTransportClient, Resolution,
    TransportClient, TrustState, VerificationResponse,
};

fn fixture() -> (Session, Arc<MockCryptoProvider>, Arc<MockTransportClient>) {
    let provider = Arc::new(MockCryptoProvider::new());
    let transport = Arc::new(MockTransportClient::new());
    let session = Session::builder()
        .with_provider(provider.clone())
        .with_transport(Box::new(transport.clone()))
        .build()
        .unwrap();
    (session, provider, transport)
}

#[test]
fn test_onboarding_wrong_then_correct_code() {
    let (mut session, _, transport) = fixture();
    let laptop = mock_device(2, "laptop");

    let challenge = session.register_device(laptop.clone()).unwrap();
    assert_eq!(session.device(&laptop.id).unwrap().trust, TrustState::Pending);
    assert_eq!(session.security_score(), 90);

    // The code went out through the side channel, addressed to the device.
    let delivered = transport.delivered_codes();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, laptop.id);
    let code = delivered[0].1.clone();

    let wrong = if code == "123456" { "654321" } else { "123456" };
    let resolution = session
        .complete_device_verification(
            &challenge.challenge_id,
            &VerificationResponse::Code(wrong.to_string()),
            true,
        )
        .unwrap();
    assert_eq!(resolution, Resolution::CodeMismatch);
    assert_eq!(session.device(&laptop.id).unwrap().trust, TrustState::Pending);

    let resolution = session
        .complete_device_verification(
            &challenge.challenge_id,
            &VerificationResponse::Code(code),
            true,
        )
        .unwrap();
    assert_eq!(resolution, Resolution::Verified);
    assert_eq!(session.device(&laptop.id).unwrap().trust, TrustState::Trusted);
    assert_eq!(session.security_score(), 100);
}

#[test]
fn test_registration_fails_when_service_unreachable() {
    let (mut session, _, transport) = fixture();
    transport.set_unreachable(true);

    let result = session.register_device(mock_device(2, "laptop"));
    assert!(result.is_err());

    // The failure is classified and recorded.
    let history = session.get_error_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, ErrorKind::NetworkError);
}

#[test]
fn test_corrupted_key_material_blocks_registration() {
    let (mut session, provider, _) = fixture();
    provider
        .fail_self_check
        .store(true, std::sync::atomic::Ordering::SeqCst);

    assert!(session.register_device(mock_device(2, "laptop")).is_err());
    let history = session.get_error_history();
    assert_eq!(history[0].kind, ErrorKind::KeyCorrupted);
}

#[test]
fn test_rotation_leaves_envelope_for_offline_device() {
    let (mut session, provider, transport) = fixture();
    let laptop = mock_device(2, "laptop");
    session.register_device(laptop.clone()).unwrap();
    session.trust_device(&laptop.id).unwrap();

    let generation = session.rotate_keys().unwrap();
    assert_eq!(generation, 1);

    // The laptop was offline during rotation; its wrapped key waits at the
    // service and unwraps with its own exchange secret.
    let envelope = transport.fetch_wrapped_key(&laptop.id).unwrap().unwrap();
    assert_eq!(envelope.generation, 1);
    let rotated = provider
        .unwrap_key(&mock_secret(2), &envelope.sender_exchange_key, &envelope.wrapped_key)
        .unwrap();

    // Messages encrypted under the rotated key sync on the acting device.
    transport.seed_log(
        "c1",
        vec![encrypted_entry(
            provider.as_ref(),
            &rotated,
            "c1",
            "m1",
            10,
            1,
            &envelope.key_id,
            1,
            b"post-rotation",
        )],
    );
    let report = session.sync_messages(Some("c1"), None).unwrap();
    assert_eq!(report.synced_messages, 1);
    assert_eq!(session.messages("c1")[0].plaintext, b"post-rotation");
}

#[test]
fn test_failed_distribution_rolls_rotation_back() {
    let (mut session, _, transport) = fixture();
    let laptop = mock_device(2, "laptop");
    session.register_device(laptop.clone()).unwrap();
    session.trust_device(&laptop.id).unwrap();

    transport.set_unreachable(true);
    assert!(session.rotate_keys().is_err());
    // The previous generation stays in effect until every envelope is out.
    assert_eq!(session.get_stats().key_generation, 0);
    assert_eq!(session.get_error_history()[0].kind, ErrorKind::EncryptionFailed);

    transport.set_unreachable(false);
    assert!(transport.fetch_wrapped_key(&laptop.id).unwrap().is_none());
    assert_eq!(session.rotate_keys().unwrap(), 1);
    assert!(transport.fetch_wrapped_key(&laptop.id).unwrap().is_some());
}

#[test]
fn test_revocation_publishes_certificate() {
    let (mut session, _, transport) = fixture();
    let laptop = mock_device(2, "laptop");
    session.register_device(laptop.clone()).unwrap();
    session.trust_device(&laptop.id).unwrap();

    let certificate = session.revoke_device(&laptop.id, "stolen").unwrap();
    assert_eq!(certificate.reason(), "stolen");
    assert_eq!(transport.published_revocation_count(), 1);
    assert_eq!(session.device(&laptop.id).unwrap().trust, TrustState::Revoked);
    assert!(!session.is_locked());
}

#[test]
fn test_self_revocation_locks_session() {
    let (mut session, _, _) = fixture();
    let own_id = session.list_devices()[0].id;

    let laptop = mock_device(2, "laptop");
    session.register_device(laptop.clone()).unwrap();
    session.trust_device(&laptop.id).unwrap();

    session.revoke_device(&own_id, "device handed over").unwrap();
    assert!(session.is_locked());
    assert!(matches!(
        session.rotate_keys(),
        Err(SealinkError::InvalidState(_))
    ));
    assert!(matches!(
        session.sync_messages(None, None),
        Err(SealinkError::InvalidState(_))
    ));
}

#[test]
fn test_sync_failure_recovers_via_retry_strategy() {
    let (mut session, _, transport) = fixture();
    transport.set_unreachable(true);
    assert!(session.sync_messages(Some("c1"), None).is_err());

    let history = session.get_error_history();
    assert_eq!(history[0].kind, ErrorKind::NetworkError);
    let error_id = history[0].error_id.clone();

    let strategies = session.get_recovery_strategies(&error_id).unwrap();
    assert_eq!(strategies[0].name, "retry_with_backoff");

    transport.set_unreachable(false);
    let succeeded = session.execute_recovery(&error_id, "retry_with_backoff").unwrap();
    assert!(succeeded);
    assert!(session.get_error_history()[0].recovered);
}

#[test]
fn test_auto_recover_honors_toggle() {
    let (mut session, _, transport) = fixture();
    transport.set_unreachable(true);
    assert!(session.sync_messages(None, None).is_err());
    transport.set_unreachable(false);
    let error_id = session.get_error_history()[0].error_id.clone();

    session.set_auto_recovery_enabled(false);
    assert_eq!(session.auto_recover(&error_id).unwrap(), None);

    session.set_auto_recovery_enabled(true);
    assert_eq!(session.auto_recover(&error_id).unwrap(), Some(true));
}

#[test]
fn test_events_dispatched_through_handlers() {
    let (mut session, _, transport) = fixture();
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        session.add_event_handler(Arc::new(CallbackHandler::new(move |event: SessionEvent| {
            let name = match event {
                SessionEvent::DeviceRegistered { .. } => "registered",
                SessionEvent::DeviceTrusted { .. } => "trusted",
                SessionEvent::VerificationStarted { .. } => "verification_started",
                SessionEvent::VerificationCompleted { .. } => "verification_completed",
                SessionEvent::KeysRotated { .. } => "rotated",
                _ => "other",
            };
            seen.lock().unwrap().push(name.to_string());
        })));
    }

    let laptop = mock_device(2, "laptop");
    let challenge = session.register_device(laptop.clone()).unwrap();
    let code = transport.delivered_codes()[0].1.clone();
    session
        .complete_device_verification(
            &challenge.challenge_id,
            &VerificationResponse::Code(code),
            true,
        )
        .unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen.contains(&"registered".to_string()));
    assert!(seen.contains(&"verification_started".to_string()));
    assert!(seen.contains(&"trusted".to_string()));
    assert!(seen.contains(&"verification_completed".to_string()));
}

#[test]
fn test_metrics_export_is_json() {
    let (mut session, _, _) = fixture();
    session.register_device(mock_device(2, "laptop")).unwrap();

    let metrics = session.export_metrics().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&metrics).unwrap();
    assert_eq!(parsed["device_count"], 2);
    assert_eq!(parsed["security_score"], 90);
    assert!(parsed["cache"]["hits"].is_u64());
}

#[test]
fn test_configure_updates_cache_ttl() {
    let (mut session, _, _) = fixture();
    let mut governance = session.governance().clone();
    governance.key_cache_ttl_secs = 600;
    session.configure(governance).unwrap();
    assert_eq!(session.governance().key_cache_ttl_secs, 600);
}

#[test]
fn test_identity_registry_and_config_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sealink.db");
    let config = SessionConfig {
        storage_path: Some(path.clone()),
        ..SessionConfig::default()
    };

    let mut first = Session::builder()
        .with_provider(Arc::new(MockCryptoProvider::new()))
        .with_config(config.clone())
        .build()
        .unwrap();
    let own_id = first.list_devices()[0].id;
    let laptop = mock_device(2, "laptop");
    first.register_device(laptop.clone()).unwrap();
    first.trust_device(&laptop.id).unwrap();
    let mut governance = first.governance().clone();
    governance.key_cache_ttl_secs = 900;
    first.configure(governance).unwrap();
    drop(first);

    // Same acting device, same registry contents, restored settings.
    let second = Session::builder()
        .with_provider(Arc::new(MockCryptoProvider::new()))
        .with_config(config)
        .build()
        .unwrap();
    assert_eq!(second.list_devices()[0].id, own_id);
    assert_eq!(second.device(&laptop.id).unwrap().trust, TrustState::Trusted);
    assert_eq!(second.governance().key_cache_ttl_secs, 900);
}

#[test]
fn test_sync_cursor_readable_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sealink.db");
    let config = SessionConfig {
        storage_path: Some(path.clone()),
        ..SessionConfig::default()
    };

    let mut first = Session::builder()
        .with_provider(Arc::new(MockCryptoProvider::new()))
        .with_config(config.clone())
        .build()
        .unwrap();
    let report = first.sync_messages(Some("c1"), None).unwrap();
    assert!(report.complete);
    drop(first);

    let second = Session::builder()
        .with_provider(Arc::new(MockCryptoProvider::new()))
        .with_config(config)
        .build()
        .unwrap();
    assert_eq!(
        second.last_synced_at("c1").unwrap(),
        Some(report.last_sync_at)
    );
    assert_eq!(second.last_synced_at("never-synced").unwrap(), None);
}

#[test]
fn test_sync_status_scoped_to_conversation() {
    let (mut session, provider, transport) = fixture();
    assert!(session.get_sync_status(None).is_none());

    transport.seed_log(
        "c1",
        vec![encrypted_entry(
            provider.as_ref(),
            &sealink_core::SymmetricKey::from_bytes([9u8; 32]),
            "c1",
            "m1",
            10,
            1,
            "k-unknown",
            0,
            b"hi",
        )],
    );
    session.sync_messages(None, None).unwrap();

    // The unknown key leaves c1's message pending; c2 has nothing.
    let c1 = session.get_sync_status(Some("c1")).unwrap();
    assert_eq!(c1.pending_messages, 1);
    assert_eq!(c1.total_messages, 1);
    let c2 = session.get_sync_status(Some("c2")).unwrap();
    assert_eq!(c2.total_messages, 0);
}

#[test]
fn test_optimization_advice_tracks_failed_operations() {
    let (mut session, _, transport) = fixture();
    assert!(!session.needs_optimization().needed);

    transport.set_unreachable(true);
    for _ in 0..3 {
        assert!(session.sync_messages(None, None).is_err());
    }

    // Every recorded operation failed; the heuristic flags instability.
    let advice = session.needs_optimization();
    assert!(advice.needed);
    assert!(!advice.reasons.is_empty());
}

#[test]
fn test_error_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sealink.db");

    let config = SessionConfig {
        storage_path: Some(path.clone()),
        ..SessionConfig::default()
    };
    let mut session = Session::builder()
        .with_provider(Arc::new(MockCryptoProvider::new()))
        .with_config(config.clone())
        .build()
        .unwrap();
    session.report_error(ErrorKind::DecryptionFailed, "garbled", Some("c1"));
    drop(session);

    let session = Session::builder()
        .with_provider(Arc::new(MockCryptoProvider::new()))
        .with_config(config)
        .build()
        .unwrap();
    let history = session.get_error_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, ErrorKind::DecryptionFailed);
    assert_eq!(history[0].conversation_id.as_deref(), Some("c1"));
}
