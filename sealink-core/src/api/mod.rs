// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sealink API Layer
//!
//! High-level API for the Sealink E2EE control plane.
//!
//! # Overview
//!
//! The API layer provides a clean interface that coordinates:
//! - Device registration, trust and revocation
//! - Device verification challenges
//! - Cross-device message sync
//! - Error classification and recovery
//! - Event handling
//!
//! # Example
//!
//! ```ignore
//! use sealink_core::api::{Session, SessionConfig};
//!
//! // Create a session for the acting device
//! let mut session = Session::builder()
//!     .with_config(SessionConfig::default())
//!     .build()?;
//!
//! // Register a companion device and walk it through verification
//! let challenge = session.register_device(device)?;
//! let code = session.verification_code(&challenge.challenge_id).unwrap().to_string();
//! session.complete_device_verification(
//!     &challenge.challenge_id,
//!     &VerificationResponse::Code(code),
//!     true,
//! )?;
//!
//! // Sync messages across devices
//! let report = session.sync_messages(None, None)?;
//! println!("{} of {} synced", report.synced_messages, report.total_messages);
//! ```
//!
//! # Module Structure
//!
//! - [`error`] - Error types for the API layer
//! - [`config`] - Configuration types
//! - [`events`] - Event system for callbacks
//! - [`session`] - Main session orchestrator

#[cfg(feature = "testing")]
pub mod config;
#[cfg(not(feature = "testing"))]
mod config;

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

#[cfg(feature = "testing")]
pub mod events;
#[cfg(not(feature = "testing"))]
mod events;

#[cfg(feature = "testing")]
pub mod session;
#[cfg(not(feature = "testing"))]
mod session;

// Error types
pub use error::{SealinkError, SealinkResult};

// Configuration
pub use config::{SessionConfig, DEFAULT_CHALLENGE_TIMEOUT_SECS};

// Events
pub use events::{CallbackHandler, EventDispatcher, EventHandler, SessionEvent};

// Session
pub use session::{provision_device, DeviceCredentials, Session, SessionBuilder, SessionStats};
