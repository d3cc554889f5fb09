// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Key Cache
//!
//! TTL-bounded cache of derived keys and decrypted session material with
//! hit/miss accounting. Expiry is absolute from insertion: a hit refreshes
//! `last_used_at` and the hit counter but never extends the deadline.
//! All mutation goes through this interface; components never reach into
//! entries directly.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::crypto::SymmetricKey;

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A cached key with its accounting metadata.
pub struct CacheEntry {
    /// The cached material.
    material: SymmetricKey,
    /// Absolute expiry (Unix seconds); `None` means no TTL.
    expires_at: Option<u64>,
    /// Successful lookups since insertion.
    hit_count: u64,
    /// Timestamp of the last hit (or insertion).
    last_used_at: u64,
    /// Key generation the material belongs to.
    generation: u64,
    /// Device this entry is scoped to, for revocation cascade.
    device_id: Option<[u8; 32]>,
}

impl CacheEntry {
    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub fn last_used_at(&self) -> u64 {
        self.last_used_at
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

/// Cache accounting counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
    pub hit_rate: f64,
}

/// TTL cache of key material, keyed by key ID.
pub struct KeyCache {
    entries: HashMap<String, CacheEntry>,
    default_ttl_secs: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl KeyCache {
    /// Creates a cache with the given default TTL in seconds.
    pub fn new(default_ttl_secs: u64) -> Self {
        KeyCache {
            entries: HashMap::new(),
            default_ttl_secs,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Updates the default TTL applied by `put`.
    ///
    /// Existing entries keep the deadline they were inserted with.
    pub fn set_default_ttl(&mut self, ttl_secs: u64) {
        self.default_ttl_secs = ttl_secs;
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl_secs
    }

    /// Inserts material with the default TTL.
    pub fn put(&mut self, key_id: &str, material: SymmetricKey, generation: u64) {
        self.put_with_ttl(key_id, material, generation, Some(self.default_ttl_secs), None);
    }

    /// Inserts material scoped to a device, for revocation cascade.
    pub fn put_scoped(
        &mut self,
        key_id: &str,
        material: SymmetricKey,
        generation: u64,
        device_id: [u8; 32],
    ) {
        self.put_with_ttl(
            key_id,
            material,
            generation,
            Some(self.default_ttl_secs),
            Some(device_id),
        );
    }

    /// Inserts material with an explicit TTL (`None` = no expiry).
    pub fn put_with_ttl(
        &mut self,
        key_id: &str,
        material: SymmetricKey,
        generation: u64,
        ttl_secs: Option<u64>,
        device_id: Option<[u8; 32]>,
    ) {
        let now = current_timestamp();
        self.entries.insert(
            key_id.to_string(),
            CacheEntry {
                material,
                expires_at: ttl_secs.map(|t| now + t),
                hit_count: 0,
                last_used_at: now,
                generation,
                device_id,
            },
        );
    }

    /// Looks up material by key ID.
    pub fn get(&mut self, key_id: &str) -> Option<SymmetricKey> {
        self.get_at(key_id, current_timestamp())
    }

    /// Lookup with an explicit clock (for testing TTL behavior).
    pub fn get_at(&mut self, key_id: &str, now: u64) -> Option<SymmetricKey> {
        match self.entries.get_mut(key_id) {
            Some(entry) if !entry.is_expired_at(now) => {
                entry.hit_count += 1;
                entry.last_used_at = now;
                self.hits += 1;
                Some(entry.material.clone())
            }
            Some(_) => {
                // Expired entry: evict on access.
                self.entries.remove(key_id);
                self.evictions += 1;
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Returns entry metadata without touching the hit accounting.
    pub fn peek(&self, key_id: &str) -> Option<&CacheEntry> {
        self.entries.get(key_id)
    }

    /// Removes a single entry.
    pub fn remove(&mut self, key_id: &str) -> bool {
        self.entries.remove(key_id).is_some()
    }

    /// Drops all entries scoped to a device. Returns how many were evicted.
    pub fn evict_device(&mut self, device_id: &[u8; 32]) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.device_id.as_ref() != Some(device_id));
        let evicted = before - self.entries.len();
        self.evictions += evicted as u64;
        evicted
    }

    /// Drops all entries from generations older than `generation`.
    ///
    /// Called after key rotation so stale derivations cannot be served.
    pub fn evict_stale_generations(&mut self, generation: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.generation >= generation);
        let evicted = before - self.entries.len();
        self.evictions += evicted as u64;
        evicted
    }

    /// Sweeps expired entries. Returns how many were evicted.
    pub fn evict_expired(&mut self) -> usize {
        let now = current_timestamp();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired_at(now));
        let evicted = before - self.entries.len();
        self.evictions += evicted as u64;
        evicted
    }

    /// Drops everything and resets nothing but the entry map; counters are
    /// cumulative across clears.
    pub fn clear(&mut self) {
        self.evictions += self.entries.len() as u64;
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a snapshot of the accounting counters.
    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
            evictions: self.evictions,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64
            },
        }
    }
}
