// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Engine
//!
//! Reconciles the local decrypted state with the authoritative encrypted
//! message log across a user's trusted devices. Items are classified as
//! synced, pending (retryable) or failed (needs recovery); decrypted
//! messages are exposed in authoritative log order regardless of the order
//! decryption succeeded in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::KeyCache;
use crate::crypto::CryptoProvider;
use crate::device::DeviceRegistry;
use crate::transport::{LogEntry, TransportClient};

use super::report::{SyncErrorEntry, SyncReport};
use super::SyncError;

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Caller-initiated cancellation, checked between decryption batches.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Classification of one log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Decrypted and exposed.
    Synced,
    /// Not yet decrypted; retryable (e.g. key not yet available).
    Pending,
    /// Decryption failed; not retryable without recovery.
    Failed,
}

/// A decrypted message exposed to callers.
#[derive(Debug, Clone)]
pub struct DecryptedMessage {
    pub message_id: String,
    pub conversation_id: String,
    pub timestamp: u64,
    pub sequence: u64,
    pub plaintext: Vec<u8>,
}

struct ItemState {
    entry: LogEntry,
    status: ItemStatus,
    error: Option<String>,
}

#[derive(Default)]
struct ConversationState {
    /// message_id -> state.
    items: HashMap<String, ItemState>,
    /// Decrypted messages kept sorted by (timestamp, sequence).
    exposed: Vec<DecryptedMessage>,
}

impl ConversationState {
    fn expose(&mut self, message: DecryptedMessage) {
        let position = self
            .exposed
            .partition_point(|m| (m.timestamp, m.sequence) <= (message.timestamp, message.sequence));
        self.exposed.insert(position, message);
    }
}

/// Borrowed collaborators a sync run needs.
pub struct SyncContext<'a> {
    pub transport: &'a dyn TransportClient,
    pub registry: &'a DeviceRegistry,
    pub cache: &'a mut KeyCache,
    /// The acting device's X25519 secret, for unwrapping rotated keys.
    pub own_exchange_secret: &'a [u8; 32],
    /// Maximum items decrypted per batch before the cancel token is polled.
    pub batch_size: usize,
}

/// Outcome of a missing-window recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// Message IDs in the window now synced.
    pub recovered: Vec<String>,
    /// Message IDs in the window still not synced.
    pub failed: Vec<String>,
}

enum Attempt {
    Synced(Vec<u8>),
    MissingKey,
    DecryptFailed(String),
}

/// Cross-device message reconciliation.
pub struct SyncEngine {
    provider: Arc<dyn CryptoProvider>,
    conversations: HashMap<String, ConversationState>,
    /// Highest key generation observed via rotation envelopes.
    known_generation: u64,
    last_sync_at: Option<u64>,
}

impl SyncEngine {
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        SyncEngine {
            provider,
            conversations: HashMap::new(),
            known_generation: 0,
            last_sync_at: None,
        }
    }

    /// Timestamp of the last completed run.
    pub fn last_sync_at(&self) -> Option<u64> {
        self.last_sync_at
    }

    /// Highest key generation this engine has material for.
    pub fn known_generation(&self) -> u64 {
        self.known_generation
    }

    /// Records a locally performed rotation so the generation check passes
    /// without a transport round trip.
    /// Recounts one conversation's current classification as a report.
    pub fn status(&self, conversation_id: &str, complete: bool) -> SyncReport {
        self.build_report(
            Some(conversation_id),
            self.last_sync_at.unwrap_or(0),
            complete,
        )
    }

    pub fn note_local_generation(&mut self, generation: u64) {
        if generation > self.known_generation {
            self.known_generation = generation;
        }
    }

    /// Decrypted messages for a conversation, in authoritative log order
    /// (timestamp, then log sequence).
    pub fn messages(&self, conversation_id: &str) -> &[DecryptedMessage] {
        self.conversations
            .get(conversation_id)
            .map(|c| c.exposed.as_slice())
            .unwrap_or(&[])
    }

    /// Reconciles one conversation (or the whole account) with the
    /// authoritative log and reports the outcome.
    pub fn sync(
        &mut self,
        conversation_id: Option<&str>,
        ctx: &mut SyncContext<'_>,
        cancel: &CancelToken,
    ) -> Result<SyncReport, SyncError> {
        // Rotation ordering: never decrypt with a generation older than the
        // registry's. Fetch the rotated key first when behind.
        if ctx.registry.key_generation() > self.known_generation {
            self.fetch_rotated_key(ctx)?;
        }

        let entries = ctx
            .transport
            .fetch_message_log(conversation_id, None)
            .map_err(SyncError::Network)?;
        self.ingest(entries);

        let complete = self.process_pending(conversation_id, ctx, cancel, false)?;

        let now = current_timestamp();
        if complete {
            self.last_sync_at = Some(now);
        }
        Ok(self.build_report(conversation_id, now, complete))
    }

    /// Re-attempts only items previously classified as failed.
    ///
    /// Synced items are never re-attempted.
    pub fn retry_sync_queue(
        &mut self,
        ctx: &mut SyncContext<'_>,
        cancel: &CancelToken,
    ) -> Result<SyncReport, SyncError> {
        let complete = self.process_pending(None, ctx, cancel, true)?;
        let now = current_timestamp();
        if complete {
            self.last_sync_at = Some(now);
        }
        Ok(self.build_report(None, now, complete))
    }

    /// Targeted backfill of a time window.
    ///
    /// Idempotent: recovering the same window twice yields the same
    /// recovered set, and the next report's total does not grow from the
    /// re-run because entries are keyed by message ID.
    pub fn recover_missing_messages(
        &mut self,
        conversation_id: &str,
        from_timestamp: u64,
        ctx: &mut SyncContext<'_>,
    ) -> Result<RecoveryOutcome, SyncError> {
        let entries = ctx
            .transport
            .fetch_message_log(Some(conversation_id), Some(from_timestamp))
            .map_err(SyncError::Network)?;

        let window_ids: Vec<String> = entries.iter().map(|e| e.message_id.clone()).collect();
        self.ingest(entries);

        let cancel = CancelToken::new();
        self.process_pending(Some(conversation_id), ctx, &cancel, false)?;

        let state = self.conversations.entry(conversation_id.to_string()).or_default();
        let mut recovered = Vec::new();
        let mut failed = Vec::new();
        for id in window_ids {
            match state.items.get(&id).map(|i| i.status) {
                Some(ItemStatus::Synced) => recovered.push(id),
                _ => failed.push(id),
            }
        }
        recovered.sort();
        failed.sort();
        Ok(RecoveryOutcome { recovered, failed })
    }

    /// Merges fetched log entries into local state. Known message IDs are
    /// left untouched, which is what makes recovery idempotent.
    fn ingest(&mut self, entries: Vec<LogEntry>) {
        for entry in entries {
            let conversation = self
                .conversations
                .entry(entry.conversation_id.clone())
                .or_default();
            conversation
                .items
                .entry(entry.message_id.clone())
                .or_insert_with(|| ItemState {
                    entry,
                    status: ItemStatus::Pending,
                    error: None,
                });
        }
    }

    /// Attempts decryption of undecrypted items in batches.
    ///
    /// Returns `Ok(false)` when cancelled between batches; already-applied
    /// classifications stand, but the run is reported incomplete.
    fn process_pending(
        &mut self,
        conversation_id: Option<&str>,
        ctx: &mut SyncContext<'_>,
        cancel: &CancelToken,
        failed_only: bool,
    ) -> Result<bool, SyncError> {
        let retryable = |status: ItemStatus| {
            if failed_only {
                status == ItemStatus::Failed
            } else {
                status == ItemStatus::Pending
            }
        };

        // Collect work up front to keep borrows simple.
        let work: Vec<(String, String)> = self
            .conversations
            .iter()
            .filter(|(id, _)| conversation_id.map_or(true, |c| c == id.as_str()))
            .flat_map(|(conv_id, state)| {
                state
                    .items
                    .values()
                    .filter(|item| retryable(item.status))
                    .map(|item| (conv_id.clone(), item.entry.message_id.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();

        let batch_size = ctx.batch_size.max(1);
        for batch in work.chunks(batch_size) {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            for (conv_id, message_id) in batch {
                self.attempt_item(conv_id, message_id, ctx);
            }
        }
        Ok(true)
    }

    fn attempt_item(&mut self, conversation_id: &str, message_id: &str, ctx: &mut SyncContext<'_>) {
        let entry = {
            let state = match self.conversations.get(conversation_id) {
                Some(s) => s,
                None => return,
            };
            match state.items.get(message_id) {
                Some(item) => item.entry.clone(),
                None => return,
            }
        };

        let outcome = self.attempt_decrypt(&entry, ctx);

        let state = self
            .conversations
            .get_mut(conversation_id)
            .expect("conversation exists");
        let item = state
            .items
            .get_mut(message_id)
            .expect("item exists");

        match outcome {
            Attempt::Synced(plaintext) => {
                item.status = ItemStatus::Synced;
                item.error = None;
                state.expose(DecryptedMessage {
                    message_id: entry.message_id,
                    conversation_id: entry.conversation_id,
                    timestamp: entry.timestamp,
                    sequence: entry.sequence,
                    plaintext,
                });
            }
            Attempt::MissingKey => {
                item.status = ItemStatus::Pending;
                item.error = Some("key not available".to_string());
            }
            Attempt::DecryptFailed(message) => {
                item.status = ItemStatus::Failed;
                item.error = Some(message);
            }
        }
    }

    fn attempt_decrypt(&mut self, entry: &LogEntry, ctx: &mut SyncContext<'_>) -> Attempt {
        // Stale-generation guard: material for a newer generation must be
        // fetched before this entry can be decrypted.
        if entry.key_generation > self.known_generation
            && self.fetch_rotated_key(ctx).is_err()
        {
            return Attempt::MissingKey;
        }

        let key = match ctx.cache.get(&entry.key_id) {
            Some(key) => key,
            None => match self.fetch_key(&entry.key_id, ctx) {
                Some(key) => key,
                None => return Attempt::MissingKey,
            },
        };

        match self.provider.decrypt(&key, &entry.ciphertext) {
            Ok(plaintext) => Attempt::Synced(plaintext),
            // No ciphertext or key material in the error text.
            Err(_) => Attempt::DecryptFailed(format!(
                "decryption failed for message {}",
                entry.message_id
            )),
        }
    }

    /// Pulls wrapped key envelopes addressed to this device until the
    /// requested key appears or none are waiting.
    fn fetch_key(
        &mut self,
        key_id: &str,
        ctx: &mut SyncContext<'_>,
    ) -> Option<crate::crypto::SymmetricKey> {
        loop {
            let envelope = ctx
                .transport
                .fetch_wrapped_key(ctx.registry.own_device_id())
                .ok()??;

            let key = self
                .provider
                .unwrap_key(
                    ctx.own_exchange_secret,
                    &envelope.sender_exchange_key,
                    &envelope.wrapped_key,
                )
                .ok()?;

            if envelope.generation > self.known_generation {
                self.known_generation = envelope.generation;
            }
            ctx.cache.put(&envelope.key_id, key.clone(), envelope.generation);

            if envelope.key_id == key_id {
                return Some(key);
            }
        }
    }

    fn fetch_rotated_key(&mut self, ctx: &mut SyncContext<'_>) -> Result<(), SyncError> {
        let envelope = ctx
            .transport
            .fetch_wrapped_key(ctx.registry.own_device_id())
            .map_err(SyncError::Network)?;

        let envelope = match envelope {
            Some(e) => e,
            None => return Err(SyncError::RotatedKeyUnavailable),
        };

        let key = self
            .provider
            .unwrap_key(
                ctx.own_exchange_secret,
                &envelope.sender_exchange_key,
                &envelope.wrapped_key,
            )
            .map_err(|_| SyncError::RotatedKeyUnavailable)?;

        if envelope.generation > self.known_generation {
            self.known_generation = envelope.generation;
        }
        ctx.cache.put(&envelope.key_id, key, envelope.generation);
        Ok(())
    }

    fn build_report(&self, conversation_id: Option<&str>, now: u64, complete: bool) -> SyncReport {
        let mut synced = 0;
        let mut pending = 0;
        let mut failed = 0;
        let mut errors = Vec::new();

        for (conv_id, state) in &self.conversations {
            if let Some(filter) = conversation_id {
                if filter != conv_id.as_str() {
                    continue;
                }
            }
            for item in state.items.values() {
                match item.status {
                    ItemStatus::Synced => synced += 1,
                    ItemStatus::Pending => pending += 1,
                    ItemStatus::Failed => {
                        failed += 1;
                        errors.push(SyncErrorEntry {
                            conversation_id: conv_id.clone(),
                            error: item
                                .error
                                .clone()
                                .unwrap_or_else(|| "unknown failure".to_string()),
                        });
                    }
                }
            }
        }

        SyncReport::from_counts(synced, pending, failed, now, errors, complete)
    }
}
