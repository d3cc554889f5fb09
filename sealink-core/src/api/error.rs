// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! API Error Types
//!
//! Unified error type for the Sealink API layer.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::device::DeviceError;
use crate::perf::PerfError;
use crate::recovery::RecoveryError;
use crate::storage::StorageError;
use crate::sync::SyncError;
use crate::transport::TransportError;
use crate::verify::VerifyError;

/// Unified error type for Sealink operations.
#[derive(Error, Debug)]
pub enum SealinkError {
    /// Device registry operation failed.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Verification operation failed.
    #[error("verification error: {0}")]
    Verify(#[from] VerifyError),

    /// Sync operation failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Recovery operation failed.
    #[error("recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    /// Transport operation failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Payload encoding failed.
    #[error("payload error: {0}")]
    Payload(#[from] PerfError),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid operation in current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for Sealink operations.
pub type SealinkResult<T> = Result<T, SealinkError>;
