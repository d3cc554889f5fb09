// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Transport Abstraction
//!
//! Platform-agnostic interface to the coordinating service. The concrete
//! engine (HTTP, WebSocket) lives outside the control plane; tests script a
//! mock.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::hex_array_32;

/// Transport errors.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Coordinating service unreachable")]
    Unreachable,

    #[error("Request timed out")]
    Timeout,

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// One entry in the authoritative encrypted message log.
///
/// `sequence` is the log position assigned by the service; it breaks ties
/// between entries with identical timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub conversation_id: String,
    pub message_id: String,
    /// Arrival timestamp at the service (Unix seconds).
    pub timestamp: u64,
    /// Log sequence number within the conversation.
    pub sequence: u64,
    /// Encrypted payload.
    pub ciphertext: Vec<u8>,
    /// ID of the key that encrypted this entry.
    pub key_id: String,
    /// Key generation the entry was encrypted under.
    pub key_generation: u64,
}

/// A wrapped conversation key addressed to one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedKeyEnvelope {
    /// Recipient device.
    #[serde(with = "hex_array_32")]
    pub device_id: [u8; 32],
    /// Exchange public key of the device that performed the wrap; the
    /// recipient needs it for the unwrap ECDH.
    #[serde(with = "hex_array_32")]
    pub sender_exchange_key: [u8; 32],
    pub key_id: String,
    pub generation: u64,
    pub wrapped_key: Vec<u8>,
}

/// Authenticated request/response interface to the coordinating service.
pub trait TransportClient: Send {
    /// Announces a newly registered device.
    fn register_device(&self, device_json: &str) -> TransportResult<()>;

    /// Publishes the signed device registry after a mutation.
    fn publish_registry(&self, registry_json: &str) -> TransportResult<()>;

    /// Publishes a revocation certificate.
    fn publish_revocation(&self, certificate_json: &str) -> TransportResult<()>;

    /// Delivers an out-of-band verification code (email/SMS relay).
    fn deliver_verification_code(&self, device_id: &[u8; 32], code: &str) -> TransportResult<()>;

    /// Distributes wrapped keys produced by a rotation.
    fn distribute_wrapped_keys(&self, envelopes: &[WrappedKeyEnvelope]) -> TransportResult<()>;

    /// Fetches a wrapped key addressed to this device, if one is waiting.
    fn fetch_wrapped_key(&self, device_id: &[u8; 32]) -> TransportResult<Option<WrappedKeyEnvelope>>;

    /// Fetches the message log, optionally restricted to one conversation
    /// and entries at or after `since` (Unix seconds).
    fn fetch_message_log(
        &self,
        conversation_id: Option<&str>,
        since: Option<u64>,
    ) -> TransportResult<Vec<LogEntry>>;
}

// Lets callers keep a handle on a shared transport while the session owns
// a boxed clone of the Arc.
impl<T: TransportClient + Sync> TransportClient for std::sync::Arc<T> {
    fn register_device(&self, device_json: &str) -> TransportResult<()> {
        (**self).register_device(device_json)
    }

    fn publish_registry(&self, registry_json: &str) -> TransportResult<()> {
        (**self).publish_registry(registry_json)
    }

    fn publish_revocation(&self, certificate_json: &str) -> TransportResult<()> {
        (**self).publish_revocation(certificate_json)
    }

    fn deliver_verification_code(&self, device_id: &[u8; 32], code: &str) -> TransportResult<()> {
        (**self).deliver_verification_code(device_id, code)
    }

    fn distribute_wrapped_keys(&self, envelopes: &[WrappedKeyEnvelope]) -> TransportResult<()> {
        (**self).distribute_wrapped_keys(envelopes)
    }

    fn fetch_wrapped_key(&self, device_id: &[u8; 32]) -> TransportResult<Option<WrappedKeyEnvelope>> {
        (**self).fetch_wrapped_key(device_id)
    }

    fn fetch_message_log(
        &self,
        conversation_id: Option<&str>,
        since: Option<u64>,
    ) -> TransportResult<Vec<LogEntry>> {
        (**self).fetch_message_log(conversation_id, since)
    }
}

/// In-memory, scriptable transport for testing.
///
/// Message logs are seeded per conversation; `set_unreachable` makes every
/// call fail with `TransportError::Unreachable`.
pub struct MockTransportClient {
    inner: Mutex<MockInner>,
}

#[derive(Default)]
struct MockInner {
    unreachable: bool,
    logs: HashMap<String, Vec<LogEntry>>,
    registered_devices: Vec<String>,
    published_registries: Vec<String>,
    published_revocations: Vec<String>,
    delivered_codes: Vec<([u8; 32], String)>,
    pending_wrapped_keys: Vec<WrappedKeyEnvelope>,
}

impl MockTransportClient {
    pub fn new() -> Self {
        MockTransportClient {
            inner: Mutex::new(MockInner::default()),
        }
    }

    /// Makes all subsequent calls fail with `Unreachable`.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().expect("mock lock poisoned").unreachable = unreachable;
    }

    /// Seeds log entries for a conversation.
    pub fn seed_log(&self, conversation_id: &str, entries: Vec<LogEntry>) {
        self.inner
            .lock()
            .expect("mock lock poisoned")
            .logs
            .entry(conversation_id.to_string())
            .or_default()
            .extend(entries);
    }

    /// Returns codes delivered so far.
    pub fn delivered_codes(&self) -> Vec<([u8; 32], String)> {
        self.inner.lock().expect("mock lock poisoned").delivered_codes.clone()
    }

    /// Returns how many registry snapshots were published.
    pub fn published_registry_count(&self) -> usize {
        self.inner.lock().expect("mock lock poisoned").published_registries.len()
    }

    /// Returns how many revocations were published.
    pub fn published_revocation_count(&self) -> usize {
        self.inner.lock().expect("mock lock poisoned").published_revocations.len()
    }

    fn check_reachable(inner: &MockInner) -> TransportResult<()> {
        if inner.unreachable {
            Err(TransportError::Unreachable)
        } else {
            Ok(())
        }
    }
}

impl Default for MockTransportClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportClient for MockTransportClient {
    fn register_device(&self, device_json: &str) -> TransportResult<()> {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        Self::check_reachable(&inner)?;
        inner.registered_devices.push(device_json.to_string());
        Ok(())
    }

    fn publish_registry(&self, registry_json: &str) -> TransportResult<()> {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        Self::check_reachable(&inner)?;
        inner.published_registries.push(registry_json.to_string());
        Ok(())
    }

    fn publish_revocation(&self, certificate_json: &str) -> TransportResult<()> {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        Self::check_reachable(&inner)?;
        inner.published_revocations.push(certificate_json.to_string());
        Ok(())
    }

    fn deliver_verification_code(&self, device_id: &[u8; 32], code: &str) -> TransportResult<()> {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        Self::check_reachable(&inner)?;
        inner.delivered_codes.push((*device_id, code.to_string()));
        Ok(())
    }

    fn distribute_wrapped_keys(&self, envelopes: &[WrappedKeyEnvelope]) -> TransportResult<()> {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        Self::check_reachable(&inner)?;
        inner.pending_wrapped_keys.extend(envelopes.iter().cloned());
        Ok(())
    }

    fn fetch_wrapped_key(&self, device_id: &[u8; 32]) -> TransportResult<Option<WrappedKeyEnvelope>> {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        Self::check_reachable(&inner)?;
        let position = inner
            .pending_wrapped_keys
            .iter()
            .position(|e| &e.device_id == device_id);
        Ok(position.map(|i| inner.pending_wrapped_keys.remove(i)))
    }

    fn fetch_message_log(
        &self,
        conversation_id: Option<&str>,
        since: Option<u64>,
    ) -> TransportResult<Vec<LogEntry>> {
        let inner = self.inner.lock().expect("mock lock poisoned");
        Self::check_reachable(&inner)?;

        let mut entries: Vec<LogEntry> = match conversation_id {
            Some(id) => inner.logs.get(id).cloned().unwrap_or_default(),
            None => inner.logs.values().flatten().cloned().collect(),
        };

        if let Some(since) = since {
            entries.retain(|e| e.timestamp >= since);
        }

        // Authoritative log order: timestamp, then sequence.
        entries.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.sequence.cmp(&b.sequence))
        });

        Ok(entries)
    }
}
