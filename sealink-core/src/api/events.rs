// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Event System
//!
//! Callbacks for Sealink events.

use std::sync::Arc;

use crate::sync::SyncReport;

/// Events emitted by a Sealink session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A device was registered (pending trust).
    DeviceRegistered {
        /// The device ID (hex).
        device_id: String,
    },

    /// A device transitioned to trusted.
    DeviceTrusted {
        /// The device ID (hex).
        device_id: String,
    },

    /// A device was revoked.
    DeviceRevoked {
        /// The device ID (hex).
        device_id: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Conversation keys were rotated.
    KeysRotated {
        /// The new key generation.
        generation: u64,
    },

    /// A verification challenge was issued.
    VerificationStarted {
        /// The challenge ID.
        challenge_id: String,
        /// The device ID (hex) being verified.
        device_id: String,
    },

    /// A verification challenge was resolved.
    VerificationCompleted {
        /// The device ID (hex).
        device_id: String,
        /// Whether verification succeeded.
        verified: bool,
    },

    /// A sync run finished.
    SyncCompleted {
        /// The resulting report.
        report: SyncReport,
    },

    /// A recovery strategy was executed.
    RecoveryAttempted {
        /// The error being recovered.
        error_id: String,
        /// The strategy name.
        strategy: String,
        /// Whether it succeeded.
        succeeded: bool,
    },

    /// Error event for background operations.
    Error {
        /// Error description.
        message: String,
    },
}

/// Event handler trait.
///
/// Implement this trait to receive session events.
pub trait EventHandler: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: SessionEvent);
}

/// Simple callback-based event handler.
///
/// Wraps a closure for easy event handling.
pub struct CallbackHandler<F>
where
    F: Fn(SessionEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(SessionEvent) + Send + Sync,
{
    /// Creates a new callback handler.
    pub fn new(callback: F) -> Self {
        CallbackHandler { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: SessionEvent) {
        (self.callback)(event);
    }
}

/// Event dispatcher for managing multiple handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    pub fn new() -> Self {
        EventDispatcher {
            handlers: Vec::new(),
        }
    }

    /// Adds an event handler.
    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Removes all handlers.
    pub fn clear_handlers(&mut self) {
        self.handlers.clear();
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatches an event to all handlers.
    pub fn dispatch(&self, event: SessionEvent) {
        for handler in &self.handlers {
            handler.on_event(event.clone());
        }
    }
}
