// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Cross-Device Synchronization
//!
//! Reconciliation of message and key state across a user's trusted devices,
//! with targeted recovery of missing ciphertext windows.

mod engine;
mod report;

pub use engine::{
    CancelToken, DecryptedMessage, ItemStatus, RecoveryOutcome, SyncContext, SyncEngine,
};
pub use report::{SyncErrorEntry, SyncReport};

use thiserror::Error;

use crate::transport::TransportError;

/// Sync error types.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    #[error("Rotated key material is not yet available for this device")]
    RotatedKeyUnavailable,

    #[error("Serialization error: {0}")]
    Serialization(String),
}
