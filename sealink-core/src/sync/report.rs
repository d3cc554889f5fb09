// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Reports
//!
//! Point-in-time accounting of message reconciliation. The counting
//! invariant `synced + pending + failed == total` holds for every emitted
//! report; a violation is a counting bug, so construction enforces it.

use serde::{Deserialize, Serialize};

/// A per-conversation sync failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncErrorEntry {
    pub conversation_id: String,
    pub error: String,
}

/// Accounting for one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub total_messages: usize,
    pub synced_messages: usize,
    pub pending_messages: usize,
    pub failed_messages: usize,
    /// Timestamp of the run that produced this report (Unix seconds).
    pub last_sync_at: u64,
    pub sync_errors: Vec<SyncErrorEntry>,
    /// False when the run was cancelled before finishing. A partial report
    /// is never presented as final.
    pub complete: bool,
}

impl SyncReport {
    /// Builds a report from classification counts.
    ///
    /// `total` is derived from the three classes, never tracked separately,
    /// which makes the counting invariant structural.
    pub fn from_counts(
        synced: usize,
        pending: usize,
        failed: usize,
        last_sync_at: u64,
        sync_errors: Vec<SyncErrorEntry>,
        complete: bool,
    ) -> Self {
        let report = SyncReport {
            total_messages: synced + pending + failed,
            synced_messages: synced,
            pending_messages: pending,
            failed_messages: failed,
            last_sync_at,
            sync_errors,
            complete,
        };
        debug_assert!(report.invariant_holds());
        report
    }

    /// Checks `synced + pending + failed == total`.
    pub fn invariant_holds(&self) -> bool {
        self.synced_messages + self.pending_messages + self.failed_messages == self.total_messages
    }
}
