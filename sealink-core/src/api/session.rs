// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session Orchestrator
//!
//! Main entry point for the Sealink API. A `Session` is the acting device's
//! view of the account: it owns the device registry, the key cache, the
//! verification engine, the sync engine and the recovery orchestrator, and
//! wires them together behind the operations a client calls.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cache::{CacheStats, KeyCache};
use crate::crypto::{CryptoProvider, RingCryptoProvider, SigningKeyPair};
use crate::device::{
    Device, DeviceInfo, DeviceRegistry, RevocationCertificate, TrustState,
};
use crate::perf::{GovernanceConfig, OptimizationAdvice, PerfMonitor};
use crate::recovery::{
    E2eeError, ErrorKind, ErrorStats, RecoveryOrchestrator, RecoveryStrategy,
};
use crate::sync::{
    CancelToken, DecryptedMessage, RecoveryOutcome, SyncContext, SyncEngine, SyncError,
    SyncReport,
};
use crate::storage::Store;
use crate::transport::{MockTransportClient, TransportClient, WrappedKeyEnvelope};
use crate::verify::{
    Resolution, VerificationChallenge, VerificationEngine, VerificationMethod,
    VerificationQr, VerificationRateLimiter, VerificationResponse,
};

use super::config::SessionConfig;
use super::error::{SealinkError, SealinkResult};
use super::events::{EventDispatcher, EventHandler, SessionEvent};

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Key material generated for a freshly provisioned device.
///
/// The seed and exchange secret stay on the provisioned device; only the
/// public `device` record travels to the registry.
#[derive(Clone, Serialize, Deserialize)]
pub struct DeviceCredentials {
    pub device: Device,
    #[serde(with = "crate::device::hex_array_32")]
    pub signing_seed: [u8; 32],
    #[serde(with = "crate::device::hex_array_32")]
    pub exchange_secret: [u8; 32],
}

/// Generates key material and a registry record for a new device.
pub fn provision_device(
    provider: &dyn CryptoProvider,
    info: &DeviceInfo,
) -> SealinkResult<DeviceCredentials> {
    let mut id = [0u8; 32];
    provider.random_bytes(&mut id)?;
    let signing_seed = provider.generate_signing_seed()?;
    let exchange_secret = provider.generate_exchange_secret()?;
    let now = current_timestamp();

    let device = Device {
        id,
        name: info.name.clone(),
        device_type: info.device_type,
        trust: TrustState::Pending,
        security_score: 0,
        exchange_public_key: provider.exchange_public_key(&exchange_secret),
        verifying_key: provider.signing_public_key(&signing_seed),
        created_at: now,
        last_used_at: now,
        revoked_at: None,
    };

    Ok(DeviceCredentials {
        device,
        signing_seed,
        exchange_secret,
    })
}

/// Aggregate session statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub device_count: usize,
    pub trusted_count: usize,
    pub security_score: u8,
    pub key_generation: u64,
    pub cache: CacheStats,
    pub errors: ErrorStats,
    pub last_sync_at: Option<u64>,
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
    provider: Option<Arc<dyn CryptoProvider>>,
    transport: Option<Box<dyn TransportClient>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        SessionBuilder {
            config: SessionConfig::default(),
            provider: None,
            transport: None,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn CryptoProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_transport(mut self, transport: Box<dyn TransportClient>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the session, provisioning the acting device.
    ///
    /// With a storage path, a previously persisted identity comes back:
    /// credentials, the signed registry snapshot and the governance
    /// configuration are restored instead of provisioned fresh.
    ///
    /// The acting device starts trusted: it holds the identity signing key,
    /// which is the trust root everything else is verified against.
    pub fn build(self) -> SealinkResult<Session> {
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(RingCryptoProvider::new()));
        let transport = self
            .transport
            .unwrap_or_else(|| Box::new(MockTransportClient::new()));

        provider.self_check()?;

        let store = match &self.config.storage_path {
            Some(path) => Some(Store::open(path)?),
            None => None,
        };

        let mut config = self.config;
        if let Some(store) = &store {
            if let Some(governance) = store.load_config()? {
                config.governance = governance;
            }
        }

        let restored = match &store {
            Some(store) => {
                let credentials = store
                    .load_credentials()?
                    .map(|json| serde_json::from_str::<DeviceCredentials>(&json))
                    .transpose()
                    .map_err(|e| SealinkError::Serialization(e.to_string()))?;
                credentials.zip(store.load_registry()?)
            }
            None => None,
        };

        let (credentials, registry) = match restored {
            Some(restored) => restored,
            None => {
                let info = DeviceInfo {
                    name: config.device_name.clone(),
                    device_type: crate::device::DeviceType::Mobile,
                };
                let mut credentials = provision_device(provider.as_ref(), &info)?;
                credentials.device.trust = TrustState::Trusted;

                let signing_key = SigningKeyPair::from_seed(&credentials.signing_seed);
                let registry = DeviceRegistry::new(credentials.device.clone(), &signing_key);
                if let Some(store) = &store {
                    let json = serde_json::to_string(&credentials)
                        .map_err(|e| SealinkError::Serialization(e.to_string()))?;
                    store.save_credentials(&json)?;
                    store.save_registry(&registry)?;
                }
                (credentials, registry)
            }
        };
        let signing_key = SigningKeyPair::from_seed(&credentials.signing_seed);

        let recovery = RecoveryOrchestrator::new();
        if let Some(store) = &store {
            recovery.restore_history(store.load_errors()?);
        }

        let cache = KeyCache::new(config.governance.key_cache_ttl_secs);
        let verification = VerificationEngine::new(provider.clone());
        let mut sync = SyncEngine::new(provider.clone());
        sync.note_local_generation(registry.key_generation());

        transport.register_device(&registry.to_json())?;

        Ok(Session {
            config,
            provider,
            transport,
            store,
            signing_key,
            own_exchange_secret: credentials.exchange_secret,
            registry,
            cache,
            verification,
            sync,
            recovery,
            events: EventDispatcher::new(),
            perf: PerfMonitor::new(),
            last_report: None,
            locked: false,
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The acting device's handle on the account.
pub struct Session {
    config: SessionConfig,
    provider: Arc<dyn CryptoProvider>,
    transport: Box<dyn TransportClient>,
    store: Option<Store>,
    signing_key: SigningKeyPair,
    own_exchange_secret: [u8; 32],
    registry: DeviceRegistry,
    cache: KeyCache,
    verification: VerificationEngine,
    sync: SyncEngine,
    recovery: RecoveryOrchestrator,
    events: EventDispatcher,
    perf: PerfMonitor,
    last_report: Option<SyncReport>,
    /// Set when the acting device revokes itself; all mutating operations
    /// fail afterwards.
    locked: bool,
}

impl Session {
    /// Creates a session with default config and the ring provider.
    pub fn new() -> SealinkResult<Self> {
        SessionBuilder::new().build()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Adds an event handler.
    pub fn add_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.events.add_handler(handler);
    }

    fn ensure_unlocked(&self) -> SealinkResult<()> {
        if self.locked {
            return Err(SealinkError::InvalidState(
                "session is locked after self-revocation".to_string(),
            ));
        }
        Ok(())
    }

    fn persist_registry(&self) -> SealinkResult<()> {
        if let Some(store) = &self.store {
            store.save_registry(&self.registry)?;
        }
        Ok(())
    }

    fn persist_error(&self, error: &E2eeError) {
        if let Some(store) = &self.store {
            // History persistence is best-effort; the in-memory history is
            // authoritative for this process.
            let _ = store.append_error(error);
        }
    }

    // === Device Lifecycle ===

    /// Registers a new device and issues its verification challenge.
    ///
    /// The device record comes from `provision_device` on the new device;
    /// it enters the registry as pending and stays there until a challenge
    /// resolves. The out-of-band code is delivered through the transport,
    /// never returned in the challenge payload.
    pub fn register_device(
        &mut self,
        device: Device,
    ) -> SealinkResult<VerificationChallenge> {
        self.ensure_unlocked()?;

        if let Err(e) = self.provider.self_check() {
            let error = self.recovery.report_error(
                ErrorKind::KeyCorrupted,
                "key material failed self-check during registration",
                None,
            );
            self.persist_error(&error);
            return Err(e.into());
        }

        let device_json = serde_json::to_string(&device)
            .map_err(|e| SealinkError::Serialization(e.to_string()))?;
        if let Err(e) = self.transport.register_device(&device_json) {
            let error = self.recovery.report_error(
                ErrorKind::NetworkError,
                "coordinating service unreachable during registration",
                None,
            );
            self.persist_error(&error);
            return Err(e.into());
        }

        self.registry.register_device(device.clone(), &self.signing_key)?;
        self.transport.publish_registry(&self.registry.to_json())?;

        let challenge = self.verification.initiate(
            &device,
            VerificationMethod::VerificationCode,
            self.config.challenge_timeout_secs,
        )?;
        if let Some(code) = self.verification.out_of_band_code(&challenge.challenge_id) {
            self.transport.deliver_verification_code(&device.id, code)?;
        }

        self.persist_registry()?;
        self.events.dispatch(SessionEvent::DeviceRegistered {
            device_id: device.id_hex(),
        });
        self.events.dispatch(SessionEvent::VerificationStarted {
            challenge_id: challenge.challenge_id.clone(),
            device_id: device.id_hex(),
        });
        Ok(challenge)
    }

    /// Marks a pending device as trusted.
    ///
    /// Returns whether the state changed; trusting a trusted or revoked
    /// device is a no-op.
    pub fn trust_device(&mut self, device_id: &[u8; 32]) -> SealinkResult<bool> {
        self.ensure_unlocked()?;
        let changed = self.registry.trust_device(device_id, &self.signing_key)?;
        if changed {
            self.transport.publish_registry(&self.registry.to_json())?;
            self.persist_registry()?;
            self.events.dispatch(SessionEvent::DeviceTrusted {
                device_id: hex::encode(device_id),
            });
        }
        Ok(changed)
    }

    /// Revokes a device and evicts its cached key material.
    ///
    /// Revoking the acting device locks the session: every subsequent
    /// mutating call fails with `InvalidState`.
    pub fn revoke_device(
        &mut self,
        device_id: &[u8; 32],
        reason: &str,
    ) -> SealinkResult<RevocationCertificate> {
        self.ensure_unlocked()?;
        let certificate = self
            .registry
            .revoke_device(device_id, reason, &self.signing_key)?;

        self.cache.evict_device(device_id);
        let certificate_json = serde_json::to_string(&certificate)
            .map_err(|e| SealinkError::Serialization(e.to_string()))?;
        self.transport.publish_revocation(&certificate_json)?;
        self.transport.publish_registry(&self.registry.to_json())?;
        self.persist_registry()?;

        self.events.dispatch(SessionEvent::DeviceRevoked {
            device_id: hex::encode(device_id),
            reason: reason.to_string(),
        });

        if self.registry.is_own_device(device_id) {
            self.locked = true;
        }
        Ok(certificate)
    }

    /// Rotates conversation keys and distributes them to trusted devices.
    ///
    /// Returns the new key generation.
    pub fn rotate_keys(&mut self) -> SealinkResult<u64> {
        self.ensure_unlocked()?;
        let started = Instant::now();
        let Session {
            registry,
            provider,
            signing_key,
            own_exchange_secret,
            transport,
            cache,
            sync,
            recovery,
            store,
            ..
        } = self;

        let generation = match rotate_and_distribute(
            registry,
            provider.as_ref(),
            own_exchange_secret,
            signing_key,
            transport.as_ref(),
            cache,
            sync,
        ) {
            Ok(generation) => generation,
            Err(e) => {
                let error = recovery.report_error(
                    ErrorKind::EncryptionFailed,
                    "key rotation failed; previous generation remains in effect",
                    None,
                );
                if let Some(store) = store {
                    let _ = store.append_error(&error);
                }
                self.perf
                    .record_operation(started.elapsed().as_millis() as u64, false);
                return Err(e);
            }
        };
        self.perf
            .record_operation(started.elapsed().as_millis() as u64, true);

        self.persist_registry()?;
        self.events
            .dispatch(SessionEvent::KeysRotated { generation });
        Ok(generation)
    }

    /// Returns all registered devices, including revoked ones.
    pub fn list_devices(&self) -> &[Device] {
        self.registry.all_devices()
    }

    /// Finds a device by ID.
    pub fn device(&self, device_id: &[u8; 32]) -> Option<&Device> {
        self.registry.find_device(device_id)
    }

    /// Aggregate security score over the registry.
    pub fn security_score(&self) -> u8 {
        self.registry.security_score()
    }

    /// Whether this session has revoked its own device.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    // === Verification ===

    /// Issues a verification challenge for a registered device.
    pub fn initiate_device_verification(
        &mut self,
        device_id: &[u8; 32],
        method: VerificationMethod,
    ) -> SealinkResult<VerificationChallenge> {
        self.ensure_unlocked()?;
        let device = self
            .registry
            .find_device(device_id)
            .cloned()
            .ok_or_else(|| SealinkError::NotFound(hex::encode(device_id)))?;

        let challenge =
            self.verification
                .initiate(&device, method, self.config.challenge_timeout_secs)?;
        if method == VerificationMethod::VerificationCode {
            if let Some(code) = self.verification.out_of_band_code(&challenge.challenge_id) {
                self.transport.deliver_verification_code(device_id, code)?;
            }
        }

        self.events.dispatch(SessionEvent::VerificationStarted {
            challenge_id: challenge.challenge_id.clone(),
            device_id: device.id_hex(),
        });
        Ok(challenge)
    }

    /// Generates a signed QR code for a pending challenge.
    pub fn generate_verification_qr_code(
        &self,
        challenge_id: &str,
    ) -> SealinkResult<VerificationQr> {
        Ok(self.verification.generate_qr(
            challenge_id,
            &self.config.verification_url,
            &self.signing_key,
        )?)
    }

    /// Resolves a verification challenge.
    ///
    /// On success with `trust_on_success` the device transitions to trusted.
    /// A wrong code leaves the challenge resolvable; an expired or
    /// signature-failed challenge is terminal.
    pub fn complete_device_verification(
        &mut self,
        challenge_id: &str,
        response: &VerificationResponse,
        trust_on_success: bool,
    ) -> SealinkResult<Resolution> {
        self.ensure_unlocked()?;
        let device_id = self
            .verification
            .challenge(challenge_id)
            .map(|c| c.device_id)
            .ok_or_else(|| SealinkError::NotFound(challenge_id.to_string()))?;

        let resolution = match self.verification.resolve(challenge_id, response) {
            Ok(resolution) => resolution,
            Err(e) => {
                self.events.dispatch(SessionEvent::VerificationCompleted {
                    device_id: hex::encode(device_id),
                    verified: false,
                });
                return Err(e.into());
            }
        };

        if resolution == Resolution::Verified {
            if trust_on_success {
                self.trust_device(&device_id)?;
            }
            self.events.dispatch(SessionEvent::VerificationCompleted {
                device_id: hex::encode(device_id),
                verified: true,
            });
        }
        Ok(resolution)
    }

    /// The out-of-band code for a live code challenge.
    pub fn verification_code(&self, challenge_id: &str) -> Option<&str> {
        self.verification.out_of_band_code(challenge_id)
    }

    // === Sync ===

    /// Reconciles messages with the authoritative log.
    ///
    /// `conversation_id` of `None` syncs the whole account. A cancelled run
    /// returns an incomplete report; classifications applied before the
    /// cancellation stand.
    pub fn sync_messages(
        &mut self,
        conversation_id: Option<&str>,
        cancel: Option<&CancelToken>,
    ) -> SealinkResult<SyncReport> {
        self.ensure_unlocked()?;
        let default_token = CancelToken::new();
        let cancel = cancel.unwrap_or(&default_token);
        let started = Instant::now();

        let Session {
            sync,
            transport,
            registry,
            cache,
            own_exchange_secret,
            config,
            ..
        } = self;
        let mut ctx = SyncContext {
            transport: transport.as_ref(),
            registry,
            cache,
            own_exchange_secret,
            batch_size: config.governance.batch_size,
        };

        let report = match sync.sync(conversation_id, &mut ctx, cancel) {
            Ok(report) => report,
            Err(SyncError::Network(e)) => {
                self.perf
                    .record_operation(started.elapsed().as_millis() as u64, false);
                let error = self.recovery.report_error(
                    ErrorKind::NetworkError,
                    "message log unavailable during sync",
                    conversation_id,
                );
                self.persist_error(&error);
                return Err(SyncError::Network(e).into());
            }
            Err(e) => {
                self.perf
                    .record_operation(started.elapsed().as_millis() as u64, false);
                return Err(e.into());
            }
        };
        self.perf
            .record_operation(started.elapsed().as_millis() as u64, report.failed_messages == 0);

        if report.complete {
            if let (Some(store), Some(conversation)) = (&self.store, conversation_id) {
                store.save_sync_cursor(conversation, report.last_sync_at)?;
            }
        }
        self.last_report = Some(report.clone());
        self.events.dispatch(SessionEvent::SyncCompleted {
            report: report.clone(),
        });
        Ok(report)
    }

    /// Sync status, optionally narrowed to one conversation.
    ///
    /// The account-wide status is the report from the most recent run; a
    /// conversation-scoped status recounts that conversation's current
    /// classification. `None` before the first sync.
    pub fn get_sync_status(&self, conversation_id: Option<&str>) -> Option<SyncReport> {
        let last = self.last_report.as_ref()?;
        match conversation_id {
            None => Some(last.clone()),
            Some(conversation) => Some(self.sync.status(conversation, last.complete)),
        }
    }

    /// The persisted cursor for a conversation: when its last complete sync
    /// finished. Survives restarts; the natural `from_timestamp` for
    /// [`Session::recover_missing_messages`].
    pub fn last_synced_at(&self, conversation_id: &str) -> SealinkResult<Option<u64>> {
        match &self.store {
            Some(store) => Ok(store.load_sync_cursor(conversation_id)?),
            None => Ok(None),
        }
    }

    /// Decrypted messages for a conversation, in authoritative log order.
    pub fn messages(&self, conversation_id: &str) -> &[DecryptedMessage] {
        self.sync.messages(conversation_id)
    }

    /// Backfills a missing time window for one conversation.
    pub fn recover_missing_messages(
        &mut self,
        conversation_id: &str,
        from_timestamp: u64,
    ) -> SealinkResult<RecoveryOutcome> {
        self.ensure_unlocked()?;
        let Session {
            sync,
            transport,
            registry,
            cache,
            own_exchange_secret,
            config,
            ..
        } = self;
        let mut ctx = SyncContext {
            transport: transport.as_ref(),
            registry,
            cache,
            own_exchange_secret,
            batch_size: config.governance.batch_size,
        };
        Ok(sync.recover_missing_messages(conversation_id, from_timestamp, &mut ctx)?)
    }

    /// Re-attempts only failed items.
    pub fn retry_sync_queue(&mut self) -> SealinkResult<SyncReport> {
        self.ensure_unlocked()?;
        let Session {
            sync,
            transport,
            registry,
            cache,
            own_exchange_secret,
            config,
            ..
        } = self;
        let mut ctx = SyncContext {
            transport: transport.as_ref(),
            registry,
            cache,
            own_exchange_secret,
            batch_size: config.governance.batch_size,
        };
        let cancel = CancelToken::new();
        let report = sync.retry_sync_queue(&mut ctx, &cancel)?;
        self.last_report = Some(report.clone());
        Ok(report)
    }

    // === Recovery ===

    /// Records a classified error in the history.
    pub fn report_error(
        &mut self,
        kind: ErrorKind,
        message: &str,
        conversation_id: Option<&str>,
    ) -> E2eeError {
        let error = self.recovery.report_error(kind, message, conversation_id);
        self.persist_error(&error);
        self.events.dispatch(SessionEvent::Error {
            message: format!("{}: {}", error.kind.as_str(), error.message),
        });
        error
    }

    /// Full error history, oldest first.
    pub fn get_error_history(&self) -> Vec<E2eeError> {
        self.recovery.error_history()
    }

    /// Ranked strategies for a recorded error.
    pub fn get_recovery_strategies(&self, error_id: &str) -> SealinkResult<Vec<RecoveryStrategy>> {
        let error = self.find_error(error_id)?;
        Ok(self.recovery.strategies_for(&error))
    }

    /// Executes one named strategy for a recorded error.
    ///
    /// Returns whether the strategy succeeded. Only one recovery executes
    /// at a time; a concurrent call fails with `RecoveryInProgress`.
    pub fn execute_recovery(
        &mut self,
        error_id: &str,
        strategy_name: &str,
    ) -> SealinkResult<bool> {
        self.ensure_unlocked()?;
        let error = self.find_error(error_id)?;
        let strategy = self
            .recovery
            .strategies_for(&error)
            .into_iter()
            .find(|s| s.name == strategy_name)
            .ok_or_else(|| SealinkError::NotFound(strategy_name.to_string()))?;

        let Session {
            recovery,
            sync,
            transport,
            registry,
            cache,
            own_exchange_secret,
            signing_key,
            provider,
            config,
            ..
        } = self;
        let conversation = error.conversation_id.as_deref();
        let succeeded = recovery.execute_recovery(error_id, &strategy, || {
            run_strategy(
                &strategy,
                conversation,
                sync,
                transport.as_ref(),
                registry,
                cache,
                own_exchange_secret,
                signing_key,
                provider.as_ref(),
                config.governance.batch_size,
            )
        })?;

        if let (Some(store), Ok(updated)) = (&self.store, self.find_error(error_id)) {
            let _ = store.update_error(&updated);
        }
        self.events.dispatch(SessionEvent::RecoveryAttempted {
            error_id: error_id.to_string(),
            strategy: strategy.name.clone(),
            succeeded,
        });
        Ok(succeeded)
    }

    /// Attempts the highest-ranked automatic strategy for an error.
    ///
    /// `Ok(None)` when auto-recovery is disabled or no automatic strategy
    /// exists. Destructive strategies are never selected here.
    pub fn auto_recover(&mut self, error_id: &str) -> SealinkResult<Option<bool>> {
        self.ensure_unlocked()?;
        let error = self.find_error(error_id)?;

        let Session {
            recovery,
            sync,
            transport,
            registry,
            cache,
            own_exchange_secret,
            signing_key,
            provider,
            config,
            ..
        } = self;
        let conversation = error.conversation_id.as_deref();
        let outcome = recovery.try_auto_recover(&error, |strategy| {
            run_strategy(
                strategy,
                conversation,
                sync,
                transport.as_ref(),
                registry,
                cache,
                own_exchange_secret,
                signing_key,
                provider.as_ref(),
                config.governance.batch_size,
            )
        })?;

        if let Some(succeeded) = outcome {
            if let (Some(store), Ok(updated)) = (&self.store, self.find_error(error_id)) {
                let _ = store.update_error(&updated);
            }
            self.events.dispatch(SessionEvent::RecoveryAttempted {
                error_id: error_id.to_string(),
                strategy: "auto".to_string(),
                succeeded,
            });
        }
        Ok(outcome)
    }

    /// Enables or disables automatic recovery.
    pub fn set_auto_recovery_enabled(&self, enabled: bool) {
        self.recovery.set_auto_recovery_enabled(enabled);
    }

    pub fn auto_recovery_enabled(&self) -> bool {
        self.recovery.auto_recovery_enabled()
    }

    fn find_error(&self, error_id: &str) -> SealinkResult<E2eeError> {
        self.recovery
            .error_history()
            .into_iter()
            .find(|e| e.error_id == error_id)
            .ok_or_else(|| SealinkError::NotFound(error_id.to_string()))
    }

    // === Performance ===

    /// Aggregate statistics over the session.
    pub fn get_stats(&self) -> SessionStats {
        SessionStats {
            device_count: self.registry.active_count(),
            trusted_count: self.registry.trusted_devices().len(),
            security_score: self.registry.security_score(),
            key_generation: self.registry.key_generation(),
            cache: self.cache.stats(),
            errors: self.recovery.stats(),
            last_sync_at: self.sync.last_sync_at(),
        }
    }

    /// Key cache accounting counters.
    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Advisory tuning heuristic over recent sync and rotation runs.
    ///
    /// Purely informational; nothing throttles on it.
    pub fn needs_optimization(&self) -> OptimizationAdvice {
        self.perf.needs_optimization()
    }

    /// Applies new governance settings.
    ///
    /// Existing cache entries keep their original deadlines.
    pub fn configure(&mut self, governance: GovernanceConfig) -> SealinkResult<()> {
        self.cache.set_default_ttl(governance.key_cache_ttl_secs);
        if let Some(store) = &self.store {
            store.save_config(&governance)?;
        }
        self.config.governance = governance;
        Ok(())
    }

    pub fn governance(&self) -> &GovernanceConfig {
        &self.config.governance
    }

    /// The limiter callers consult before retrying a verification code.
    pub fn rate_limiter(&self) -> &VerificationRateLimiter {
        &self.config.rate_limiter
    }

    /// Drops all cached key material.
    pub fn clear_caches(&mut self) {
        self.cache.clear();
    }

    /// Exports session statistics as JSON.
    pub fn export_metrics(&self) -> SealinkResult<String> {
        serde_json::to_string_pretty(&self.get_stats())
            .map_err(|e| SealinkError::Serialization(e.to_string()))
    }
}

/// Rotates the conversation key and pushes wrapped copies to every trusted
/// device, then invalidates stale cache generations.
#[allow(clippy::too_many_arguments)]
fn rotate_and_distribute(
    registry: &mut DeviceRegistry,
    provider: &dyn CryptoProvider,
    own_exchange_secret: &[u8; 32],
    signing_key: &SigningKeyPair,
    transport: &dyn TransportClient,
    cache: &mut KeyCache,
    sync: &mut SyncEngine,
) -> SealinkResult<u64> {
    // Stage the rotation on a copy; the live registry keeps the previous
    // generation until every envelope is out and the snapshot is published.
    let mut staged = registry.clone();
    let rotation = staged.rotate_keys(provider, own_exchange_secret, signing_key)?;
    let sender_exchange_key = provider.exchange_public_key(own_exchange_secret);
    let key_id = format!("gen-{}", rotation.generation);

    let envelopes: Vec<WrappedKeyEnvelope> = rotation
        .wrapped
        .into_iter()
        .map(|(device_id, wrapped_key)| WrappedKeyEnvelope {
            device_id,
            sender_exchange_key,
            key_id: key_id.clone(),
            generation: rotation.generation,
            wrapped_key,
        })
        .collect();
    transport.distribute_wrapped_keys(&envelopes)?;
    transport.publish_registry(&staged.to_json())?;
    *registry = staged;

    cache.evict_stale_generations(rotation.generation);
    cache.put(&key_id, rotation.new_key, rotation.generation);
    sync.note_local_generation(rotation.generation);
    Ok(rotation.generation)
}

/// Maps a strategy name onto the concrete remediation it performs.
#[allow(clippy::too_many_arguments)]
fn run_strategy(
    strategy: &RecoveryStrategy,
    conversation_id: Option<&str>,
    sync: &mut SyncEngine,
    transport: &dyn TransportClient,
    registry: &mut DeviceRegistry,
    cache: &mut KeyCache,
    own_exchange_secret: &[u8; 32],
    signing_key: &SigningKeyPair,
    provider: &dyn CryptoProvider,
    batch_size: usize,
) -> bool {
    let resync = |sync: &mut SyncEngine, registry: &DeviceRegistry, cache: &mut KeyCache| {
        let mut ctx = SyncContext {
            transport,
            registry,
            cache,
            own_exchange_secret,
            batch_size,
        };
        let cancel = CancelToken::new();
        matches!(
            sync.sync(conversation_id, &mut ctx, &cancel),
            Ok(report) if report.complete && report.failed_messages == 0
        )
    };

    match strategy.name.as_str() {
        "retry_with_backoff" | "resync_conversation" => resync(sync, registry, cache),
        "refetch_key_material" => {
            cache.clear();
            resync(sync, registry, cache)
        }
        "rotate_keys" => rotate_and_distribute(
            registry,
            provider,
            own_exchange_secret,
            signing_key,
            transport,
            cache,
            sync,
        )
        .is_ok(),
        "reset_conversation_keys" => {
            cache.clear();
            rotate_and_distribute(
                registry,
                provider,
                own_exchange_secret,
                signing_key,
                transport,
                cache,
                sync,
            )
            .is_ok()
        }
        // Revocation needs the caller to name the compromised device via
        // revoke_device; it cannot run unattended.
        "revoke_compromised_device" => false,
        _ => false,
    }
}
