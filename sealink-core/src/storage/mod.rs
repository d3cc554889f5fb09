// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent Storage
//!
//! SQLite-backed store for state that must survive a process restart: the
//! signed device registry snapshot, the error history audit trail, sync
//! cursors and governance settings. Key material persistence is a
//! `CryptoProvider` concern and never passes through here.

use std::path::Path;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::device::DeviceRegistry;
use crate::perf::GovernanceConfig;
use crate::recovery::E2eeError;

/// Storage error types.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Current schema version.
const SCHEMA_VERSION: u32 = 1;

/// SQLite-based persistent store.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens or creates a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Store { conn };
        store.run_migrations()?;
        Ok(store)
    }

    /// Creates an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Store { conn };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );",
        )?;

        let current: u32 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current < SCHEMA_VERSION {
            self.conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS registry_snapshot (
                     id INTEGER PRIMARY KEY CHECK (id = 1),
                     registry_json TEXT NOT NULL,
                     saved_at INTEGER NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS error_history (
                     error_id TEXT PRIMARY KEY,
                     error_json TEXT NOT NULL,
                     timestamp INTEGER NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS sync_cursors (
                     conversation_id TEXT PRIMARY KEY,
                     last_synced_at INTEGER NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS settings (
                     key TEXT PRIMARY KEY,
                     value TEXT NOT NULL
                 );
                 INSERT INTO schema_version (version, applied_at)
                     VALUES (1, strftime('%s', 'now'));
                 COMMIT;",
            )?;
        }

        Ok(())
    }

    // === Registry Snapshot ===

    /// Persists the signed registry (replaces any previous snapshot).
    pub fn save_registry(&self, registry: &DeviceRegistry) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO registry_snapshot (id, registry_json, saved_at)
             VALUES (1, ?1, strftime('%s', 'now'))
             ON CONFLICT(id) DO UPDATE SET
                 registry_json = excluded.registry_json,
                 saved_at = excluded.saved_at",
            params![registry.to_json()],
        )?;
        Ok(())
    }

    /// Loads the persisted registry, if any.
    pub fn load_registry(&self) -> Result<Option<DeviceRegistry>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT registry_json FROM registry_snapshot WHERE id = 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                DeviceRegistry::from_json(&json)
                    .map(Some)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            }
            None => Ok(None),
        }
    }

    // === Error History ===

    /// Appends one error entry. Entries are never deleted.
    pub fn append_error(&self, error: &E2eeError) -> Result<(), StorageError> {
        let json = serde_json::to_string(error)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO error_history (error_id, error_json, timestamp) VALUES (?1, ?2, ?3)",
            params![error.error_id, json, error.timestamp as i64],
        )?;
        Ok(())
    }

    /// Updates attempt/recovered bookkeeping for an existing entry.
    pub fn update_error(&self, error: &E2eeError) -> Result<(), StorageError> {
        let json = serde_json::to_string(error)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let changed = self.conn.execute(
            "UPDATE error_history SET error_json = ?2 WHERE error_id = ?1",
            params![error.error_id, json],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(error.error_id.clone()));
        }
        Ok(())
    }

    /// Loads the full error history, oldest first.
    pub fn load_errors(&self) -> Result<Vec<E2eeError>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT error_json FROM error_history ORDER BY timestamp, error_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut errors = Vec::new();
        for json in rows {
            let json = json?;
            let error = serde_json::from_str(&json)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            errors.push(error);
        }
        Ok(errors)
    }

    // === Sync Cursors ===

    /// Records the last successful sync time for a conversation.
    pub fn save_sync_cursor(&self, conversation_id: &str, last_synced_at: u64) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO sync_cursors (conversation_id, last_synced_at) VALUES (?1, ?2)
             ON CONFLICT(conversation_id) DO UPDATE SET last_synced_at = excluded.last_synced_at",
            params![conversation_id, last_synced_at as i64],
        )?;
        Ok(())
    }

    /// Returns the last successful sync time for a conversation.
    pub fn load_sync_cursor(&self, conversation_id: &str) -> Result<Option<u64>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT last_synced_at FROM sync_cursors WHERE conversation_id = ?1")?;
        let mut rows = stmt.query(params![conversation_id])?;
        match rows.next()? {
            Some(row) => {
                let ts: i64 = row.get(0)?;
                Ok(Some(ts as u64))
            }
            None => Ok(None),
        }
    }

    // === Settings ===

    /// Persists the governance configuration.
    pub fn save_config(&self, config: &GovernanceConfig) -> Result<(), StorageError> {
        let json = serde_json::to_string(config)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES ('governance', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![json],
        )?;
        Ok(())
    }

    /// Persists the acting device's credential blob.
    ///
    /// Stored opaquely; the session owns the (de)serialization so the
    /// secrets never grow a second schema here.
    pub fn save_credentials(&self, json: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES ('credentials', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![json],
        )?;
        Ok(())
    }

    /// Loads the persisted credential blob, if any.
    pub fn load_credentials(&self) -> Result<Option<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM settings WHERE key = 'credentials'")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Loads the governance configuration, if persisted.
    pub fn load_config(&self) -> Result<Option<GovernanceConfig>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM settings WHERE key = 'governance'")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                serde_json::from_str(&json)
                    .map(Some)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            }
            None => Ok(None),
        }
    }
}
