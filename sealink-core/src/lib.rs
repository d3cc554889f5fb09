//! Sealink Core Library
//!
//! E2EE control plane for the Sealink encrypted messenger: device trust,
//! verification, cross-device sync and error recovery.
//! All cryptographic operations go through the pluggable `CryptoProvider`;
//! the default implementation uses the audited `ring` crate.

pub mod api;
pub mod cache;
pub mod crypto;
pub mod device;
pub mod perf;
pub mod recovery;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod verify;

pub use api::{
    CallbackHandler, EventDispatcher, EventHandler, SealinkError, SealinkResult, Session,
    SessionBuilder, SessionConfig, SessionEvent, SessionStats,
};
pub use cache::{CacheEntry, CacheStats, KeyCache};
pub use crypto::{
    CryptoError, CryptoProvider, MockCryptoProvider, PublicKey, RingCryptoProvider, Signature,
    SigningKeyPair, SymmetricKey,
};
pub use device::{
    Device, DeviceError, DeviceInfo, DeviceRegistry, DeviceType, KeyRotation,
    RevocationCertificate, TrustState, MAX_DEVICES,
};
pub use perf::{GovernanceConfig, OptimizationAdvice, PerfMonitor, PayloadChunk, PerfError};
pub use recovery::{
    BackoffSchedule, E2eeError, ErrorKind, ErrorStats, RecoveryError, RecoveryOrchestrator,
    RecoveryStrategy,
};
pub use storage::{StorageError, Store};
pub use sync::{
    CancelToken, DecryptedMessage, ItemStatus, RecoveryOutcome, SyncContext, SyncEngine,
    SyncError, SyncReport,
};
pub use transport::{
    LogEntry, MockTransportClient, TransportClient, TransportError, WrappedKeyEnvelope,
};
pub use verify::{
    ChallengeState, Resolution, VerificationChallenge, VerificationEngine, VerificationMethod,
    VerificationQr, VerificationResponse, VerifyError,
};
