// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration Types
//!
//! Session configuration for the Sealink API layer.

use std::path::PathBuf;

use crate::perf::GovernanceConfig;
use crate::verify::VerificationRateLimiter;

/// Default challenge lifetime in seconds.
pub const DEFAULT_CHALLENGE_TIMEOUT_SECS: u64 = 300;

/// Configuration for a Sealink session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Display name of the acting device.
    pub device_name: String,

    /// Path to the SQLite store. `None` keeps state in memory only.
    pub storage_path: Option<PathBuf>,

    /// Base URL embedded in verification QR payloads.
    pub verification_url: String,

    /// Challenge lifetime in seconds. `None` means challenges never expire.
    pub challenge_timeout_secs: Option<u64>,

    /// Tunable performance parameters.
    pub governance: GovernanceConfig,

    /// Rate limiter applied to verification-code attempts.
    pub rate_limiter: VerificationRateLimiter,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            device_name: "primary".to_string(),
            storage_path: None,
            verification_url: "https://sealink.app/verify".to_string(),
            challenge_timeout_secs: Some(DEFAULT_CHALLENGE_TIMEOUT_SECS),
            governance: GovernanceConfig::default(),
            rate_limiter: VerificationRateLimiter::default(),
        }
    }
}
