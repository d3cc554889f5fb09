// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Recovery Strategy Catalogue
//!
//! Pure value descriptions of possible remediations, indexed by error kind
//! and ranked for presentation: non-destructive before destructive,
//! automatic before manual, faster before slower.

use serde::{Deserialize, Serialize};

use super::ErrorKind;

/// A named remedial action offered for a classified error.
///
/// Strategies are offered, never auto-selected unless `automatic` is set,
/// and destructive ones always require explicit invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    pub name: String,
    pub description: String,
    pub automatic: bool,
    pub destructive: bool,
    pub estimated_time_secs: u64,
}

impl RecoveryStrategy {
    fn new(
        name: &str,
        description: &str,
        automatic: bool,
        destructive: bool,
        estimated_time_secs: u64,
    ) -> Self {
        RecoveryStrategy {
            name: name.to_string(),
            description: description.to_string(),
            automatic,
            destructive,
            estimated_time_secs,
        }
    }

    fn retry_with_backoff() -> Self {
        Self::new(
            "retry_with_backoff",
            "Retry the failed operation with exponential backoff",
            true,
            false,
            5,
        )
    }

    fn refetch_key_material() -> Self {
        Self::new(
            "refetch_key_material",
            "Re-fetch key material from the device registry",
            true,
            false,
            10,
        )
    }

    fn resync_conversation() -> Self {
        Self::new(
            "resync_conversation",
            "Run a full sync for the affected conversation",
            true,
            false,
            30,
        )
    }

    fn rotate_keys() -> Self {
        Self::new(
            "rotate_keys",
            "Rotate conversation keys and re-wrap for all trusted devices",
            false,
            false,
            30,
        )
    }

    fn reset_conversation_keys() -> Self {
        Self::new(
            "reset_conversation_keys",
            "Discard local key material for the conversation and re-establish it; undecrypted history may be lost",
            false,
            true,
            120,
        )
    }

    fn revoke_compromised_device() -> Self {
        Self::new(
            "revoke_compromised_device",
            "Revoke the device suspected of holding corrupted key material",
            false,
            true,
            300,
        )
    }
}

/// Returns the ranked strategy list for an error kind.
pub fn strategies_for(kind: ErrorKind) -> Vec<RecoveryStrategy> {
    let mut strategies = match kind {
        ErrorKind::NetworkError => vec![
            RecoveryStrategy::retry_with_backoff(),
            RecoveryStrategy::resync_conversation(),
        ],
        ErrorKind::KeyNotFound => vec![
            RecoveryStrategy::refetch_key_material(),
            RecoveryStrategy::resync_conversation(),
            RecoveryStrategy::reset_conversation_keys(),
        ],
        ErrorKind::DecryptionFailed => vec![
            RecoveryStrategy::refetch_key_material(),
            RecoveryStrategy::resync_conversation(),
            RecoveryStrategy::reset_conversation_keys(),
        ],
        ErrorKind::EncryptionFailed => vec![
            RecoveryStrategy::retry_with_backoff(),
            RecoveryStrategy::rotate_keys(),
        ],
        ErrorKind::KeyCorrupted => vec![
            RecoveryStrategy::rotate_keys(),
            RecoveryStrategy::reset_conversation_keys(),
            RecoveryStrategy::revoke_compromised_device(),
        ],
    };

    // Rank: non-destructive first, automatic first, then fastest.
    strategies.sort_by(|a, b| {
        a.destructive
            .cmp(&b.destructive)
            .then(b.automatic.cmp(&a.automatic))
            .then(a.estimated_time_secs.cmp(&b.estimated_time_secs))
    });
    strategies
}
