// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Recovery Orchestration
//!
//! Classifies failures from any component into the error taxonomy, keeps an
//! append-only error history, and executes ranked recovery strategies under
//! a system-wide single-flight lock. Concurrent recovery attempts racing on
//! shared key material is the hazard this module exists to prevent.

mod strategy;

pub use strategy::{strategies_for, RecoveryStrategy};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Seconds in the "recent" stats window.
const RECENT_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Recovery errors.
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("A recovery is already executing")]
    RecoveryInProgress,

    #[error("Unknown error id: {0}")]
    UnknownError(String),

    #[error("Destructive strategy requires explicit invocation")]
    DestructiveNotAllowed,
}

/// The five-way error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    EncryptionFailed,
    DecryptionFailed,
    KeyNotFound,
    KeyCorrupted,
    NetworkError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EncryptionFailed => "ENCRYPTION_FAILED",
            ErrorKind::DecryptionFailed => "DECRYPTION_FAILED",
            ErrorKind::KeyNotFound => "KEY_NOT_FOUND",
            ErrorKind::KeyCorrupted => "KEY_CORRUPTED",
            ErrorKind::NetworkError => "NETWORK_ERROR",
        }
    }

    /// Whether local, invisible recovery is attempted before surfacing.
    ///
    /// Corruption and decryption failures surface immediately: silent retry
    /// could mask a compromised-device scenario.
    pub fn local_recovery_first(&self) -> bool {
        matches!(self, ErrorKind::NetworkError | ErrorKind::KeyNotFound)
    }
}

/// A classified E2EE failure.
///
/// Entries are append-only; after creation only the attempt bookkeeping
/// and the recovered mark may change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct E2eeError {
    pub error_id: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    pub conversation_id: Option<String>,
    pub timestamp: u64,
    pub auto_recovery_attempts: u32,
    /// Names of strategies that have failed for this error. `recoverable`
    /// stays set until every known strategy for the kind appears here.
    #[serde(default)]
    pub attempted_strategies: Vec<String>,
    pub recoverable: bool,
    pub recovered: bool,
}

/// Derived statistics over the error history.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorStats {
    pub total: usize,
    /// Errors with at least one successful recovery.
    pub recovered: usize,
    /// Errors reported within the last 24 hours.
    pub recent: usize,
}

/// Exponential backoff schedule for local network-error retries.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        BackoffSchedule {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl BackoffSchedule {
    /// Delay before the given retry attempt (0-based).
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let shifted = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        shifted.min(self.max_delay_ms)
    }
}

#[derive(Default)]
struct ErrorHistory {
    entries: Vec<E2eeError>,
}

impl ErrorHistory {
    fn append(&mut self, error: E2eeError) {
        self.entries.push(error);
    }

    fn find_mut(&mut self, error_id: &str) -> Option<&mut E2eeError> {
        self.entries.iter_mut().find(|e| e.error_id == error_id)
    }
}

/// Releases the single-flight lock even if the recovery action panics.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the error history and the single recovery-attempt path.
pub struct RecoveryOrchestrator {
    history: Mutex<ErrorHistory>,
    auto_recovery_enabled: AtomicBool,
    in_flight: AtomicBool,
    backoff: BackoffSchedule,
}

impl RecoveryOrchestrator {
    pub fn new() -> Self {
        RecoveryOrchestrator {
            history: Mutex::new(ErrorHistory::default()),
            auto_recovery_enabled: AtomicBool::new(true),
            in_flight: AtomicBool::new(false),
            backoff: BackoffSchedule::default(),
        }
    }

    /// Records a new error in the history and returns it.
    ///
    /// Appends are atomic per entry; readers never observe a partial one.
    pub fn report_error(
        &self,
        kind: ErrorKind,
        message: &str,
        conversation_id: Option<&str>,
    ) -> E2eeError {
        let error = E2eeError {
            error_id: Uuid::new_v4().to_string(),
            kind,
            message: message.to_string(),
            conversation_id: conversation_id.map(|s| s.to_string()),
            timestamp: current_timestamp(),
            auto_recovery_attempts: 0,
            attempted_strategies: Vec::new(),
            recoverable: true,
            recovered: false,
        };
        self.history
            .lock()
            .expect("error history lock poisoned")
            .append(error.clone());
        error
    }

    /// Returns a snapshot of the full history, oldest first.
    pub fn error_history(&self) -> Vec<E2eeError> {
        self.history
            .lock()
            .expect("error history lock poisoned")
            .entries
            .clone()
    }

    /// Derived history statistics.
    pub fn stats(&self) -> ErrorStats {
        let history = self.history.lock().expect("error history lock poisoned");
        let cutoff = current_timestamp().saturating_sub(RECENT_WINDOW_SECS);
        ErrorStats {
            total: history.entries.len(),
            recovered: history.entries.iter().filter(|e| e.recovered).count(),
            recent: history.entries.iter().filter(|e| e.timestamp >= cutoff).count(),
        }
    }

    /// The ranked strategy list for an error.
    pub fn strategies_for(&self, error: &E2eeError) -> Vec<RecoveryStrategy> {
        strategies_for(error.kind)
    }

    /// Enables or disables unconfirmed automatic recovery.
    pub fn set_auto_recovery_enabled(&self, enabled: bool) {
        self.auto_recovery_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn auto_recovery_enabled(&self) -> bool {
        self.auto_recovery_enabled.load(Ordering::SeqCst)
    }

    /// The backoff schedule for local network-error retries.
    pub fn backoff(&self) -> &BackoffSchedule {
        &self.backoff
    }

    /// Executes one strategy for one error under the single-flight lock.
    ///
    /// `action` performs the actual remediation (re-invoking sync, the
    /// registry, or the cache) and reports success. A strategy failure
    /// increments the error's attempt counter but never flips
    /// `recoverable`: that determination is made only when every known
    /// strategy for the kind has been exhausted.
    pub fn execute_recovery<F>(
        &self,
        error_id: &str,
        strategy: &RecoveryStrategy,
        action: F,
    ) -> Result<bool, RecoveryError>
    where
        F: FnOnce() -> bool,
    {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RecoveryError::RecoveryInProgress);
        }
        let _guard = FlightGuard(&self.in_flight);

        {
            let mut history = self.history.lock().expect("error history lock poisoned");
            if history.find_mut(error_id).is_none() {
                return Err(RecoveryError::UnknownError(error_id.to_string()));
            }
        }

        let succeeded = action();

        let mut history = self.history.lock().expect("error history lock poisoned");
        let error = history
            .find_mut(error_id)
            .ok_or_else(|| RecoveryError::UnknownError(error_id.to_string()))?;

        debug_assert!(
            strategies_for(error.kind).iter().any(|s| s.name == strategy.name),
            "strategy does not apply to this error kind"
        );

        if succeeded {
            // History is immutable otherwise; success only sets the mark.
            error.recovered = true;
        } else {
            error.auto_recovery_attempts += 1;
            if !error.attempted_strategies.contains(&strategy.name) {
                error.attempted_strategies.push(strategy.name.clone());
            }
            // Exhaustion means every known strategy has failed at least
            // once; re-failing the same one is not progress.
            let exhausted = strategies_for(error.kind)
                .iter()
                .all(|s| error.attempted_strategies.contains(&s.name));
            if exhausted {
                error.recoverable = false;
            }
        }

        Ok(succeeded)
    }

    /// Runs the highest-ranked automatic, non-destructive strategy when the
    /// auto-recovery toggle is on.
    ///
    /// Returns `Ok(None)` when auto-recovery is disabled or no automatic
    /// strategy exists for the error's kind. Destructive strategies are
    /// never eligible here regardless of the toggle.
    pub fn try_auto_recover<F>(
        &self,
        error: &E2eeError,
        action: F,
    ) -> Result<Option<bool>, RecoveryError>
    where
        F: FnOnce(&RecoveryStrategy) -> bool,
    {
        if !self.auto_recovery_enabled() {
            return Ok(None);
        }

        let strategy = match strategies_for(error.kind)
            .into_iter()
            .find(|s| s.automatic && !s.destructive)
        {
            Some(s) => s,
            None => return Ok(None),
        };

        let result = self.execute_recovery(&error.error_id, &strategy, || action(&strategy))?;
        Ok(Some(result))
    }

    /// Restores persisted history entries (process restart).
    pub fn restore_history(&self, entries: Vec<E2eeError>) {
        let mut history = self.history.lock().expect("error history lock poisoned");
        history.entries = entries;
    }
}

impl Default for RecoveryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}
