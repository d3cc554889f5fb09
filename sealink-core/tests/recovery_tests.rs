//! Recovery Tests
//!
//! Error taxonomy, strategy ranking, the single-flight recovery lock and
//! the auto-recovery policy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use sealink_core::recovery::strategies_for;
use sealink_core::{BackoffSchedule, ErrorKind, RecoveryError, RecoveryOrchestrator};

#[test]
fn test_every_kind_has_strategies() {
    let kinds = [
        ErrorKind::EncryptionFailed,
        ErrorKind::DecryptionFailed,
        ErrorKind::KeyNotFound,
        ErrorKind::KeyCorrupted,
        ErrorKind::NetworkError,
    ];
    for kind in kinds {
        assert!(!strategies_for(kind).is_empty(), "{:?}", kind);
    }
}

#[test]
fn test_strategies_ranked_non_destructive_first() {
    for kind in [
        ErrorKind::KeyNotFound,
        ErrorKind::DecryptionFailed,
        ErrorKind::KeyCorrupted,
    ] {
        let strategies = strategies_for(kind);
        let first_destructive = strategies.iter().position(|s| s.destructive);
        if let Some(position) = first_destructive {
            // Once destructive strategies start, no non-destructive follows.
            assert!(
                strategies[position..].iter().all(|s| s.destructive),
                "{:?}",
                kind
            );
        }
    }
}

#[test]
fn test_automatic_before_manual_within_tier() {
    for kind in [ErrorKind::NetworkError, ErrorKind::EncryptionFailed] {
        let strategies = strategies_for(kind);
        let non_destructive: Vec<_> =
            strategies.iter().filter(|s| !s.destructive).collect();
        let first_manual = non_destructive.iter().position(|s| !s.automatic);
        if let Some(position) = first_manual {
            assert!(non_destructive[position..].iter().all(|s| !s.automatic));
        }
    }
}

#[test]
fn test_network_error_prefers_silent_retry() {
    assert!(ErrorKind::NetworkError.local_recovery_first());
    assert!(ErrorKind::KeyNotFound.local_recovery_first());
    // Corruption surfaces immediately.
    assert!(!ErrorKind::KeyCorrupted.local_recovery_first());
    assert!(!ErrorKind::DecryptionFailed.local_recovery_first());
}

#[test]
fn test_history_records_and_survives_recovery() {
    let orchestrator = RecoveryOrchestrator::new();
    let error = orchestrator.report_error(ErrorKind::NetworkError, "relay down", Some("c1"));

    let strategy = &orchestrator.strategies_for(&error)[0];
    orchestrator
        .execute_recovery(&error.error_id, strategy, || true)
        .unwrap();

    let history = orchestrator.error_history();
    assert_eq!(history.len(), 1);
    assert!(history[0].recovered);
    assert_eq!(history[0].conversation_id.as_deref(), Some("c1"));

    let stats = orchestrator.stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.recovered, 1);
    assert_eq!(stats.recent, 1);
}

#[test]
fn test_exhausted_strategies_flip_recoverable() {
    let orchestrator = RecoveryOrchestrator::new();
    let error = orchestrator.report_error(ErrorKind::NetworkError, "relay down", None);
    let strategies = orchestrator.strategies_for(&error);

    for strategy in &strategies {
        orchestrator
            .execute_recovery(&error.error_id, strategy, || false)
            .unwrap();
    }

    let entry = &orchestrator.error_history()[0];
    assert_eq!(entry.auto_recovery_attempts as usize, strategies.len());
    assert!(!entry.recoverable);
    assert!(!entry.recovered);
}

#[test]
fn test_repeated_same_strategy_failure_is_not_exhaustion() {
    let orchestrator = RecoveryOrchestrator::new();
    let error = orchestrator.report_error(ErrorKind::NetworkError, "relay down", None);
    let strategy = orchestrator.strategies_for(&error)[0].clone();

    // More failures than the kind has strategies, all through one strategy.
    for _ in 0..5 {
        orchestrator
            .execute_recovery(&error.error_id, &strategy, || false)
            .unwrap();
    }

    let entry = &orchestrator.error_history()[0];
    assert_eq!(entry.auto_recovery_attempts, 5);
    assert_eq!(entry.attempted_strategies, vec![strategy.name.clone()]);
    // The untried strategies keep the error recoverable.
    assert!(entry.recoverable);
}

#[test]
fn test_single_flight_lock_rejects_concurrent_recovery() {
    let orchestrator = Arc::new(RecoveryOrchestrator::new());
    let error = orchestrator.report_error(ErrorKind::NetworkError, "relay down", None);
    let strategy = orchestrator.strategies_for(&error)[0].clone();

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let holder = {
        let orchestrator = Arc::clone(&orchestrator);
        let error_id = error.error_id.clone();
        let strategy = strategy.clone();
        thread::spawn(move || {
            orchestrator.execute_recovery(&error_id, &strategy, || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                true
            })
        })
    };

    // Wait until the first recovery holds the lock.
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let contender = orchestrator.execute_recovery(&error.error_id, &strategy, || true);
    assert!(matches!(contender, Err(RecoveryError::RecoveryInProgress)));

    release_tx.send(()).unwrap();
    assert!(holder.join().unwrap().unwrap());

    // Lock released after completion.
    let after = orchestrator.execute_recovery(&error.error_id, &strategy, || true);
    assert!(after.is_ok());
}

#[test]
fn test_auto_recovery_respects_toggle() {
    let orchestrator = RecoveryOrchestrator::new();
    let error = orchestrator.report_error(ErrorKind::NetworkError, "relay down", None);
    let attempts = AtomicUsize::new(0);

    orchestrator.set_auto_recovery_enabled(false);
    let outcome = orchestrator
        .try_auto_recover(&error, |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();
    assert!(outcome.is_none());
    assert_eq!(attempts.load(Ordering::SeqCst), 0);

    orchestrator.set_auto_recovery_enabled(true);
    let outcome = orchestrator
        .try_auto_recover(&error, |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();
    assert_eq!(outcome, Some(true));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_auto_recovery_never_selects_destructive() {
    let orchestrator = RecoveryOrchestrator::new();
    let error = orchestrator.report_error(ErrorKind::KeyCorrupted, "bad material", None);

    let outcome = orchestrator
        .try_auto_recover(&error, |strategy| {
            assert!(!strategy.destructive);
            true
        })
        .unwrap();
    // KeyCorrupted has no automatic non-destructive strategy, so nothing runs.
    assert!(outcome.is_none());
}

#[test]
fn test_unknown_error_rejected() {
    let orchestrator = RecoveryOrchestrator::new();
    let error = orchestrator.report_error(ErrorKind::NetworkError, "x", None);
    let strategy = orchestrator.strategies_for(&error)[0].clone();

    assert!(matches!(
        orchestrator.execute_recovery("no-such-id", &strategy, || true),
        Err(RecoveryError::UnknownError(_))
    ));
}

#[test]
fn test_backoff_doubles_and_caps() {
    let backoff = BackoffSchedule::default();
    assert_eq!(backoff.delay_for(0), 1_000);
    assert_eq!(backoff.delay_for(1), 2_000);
    assert_eq!(backoff.delay_for(2), 4_000);
    assert_eq!(backoff.delay_for(10), 60_000);
    assert_eq!(backoff.delay_for(63), 60_000);
}
