// SPDX-FileCopyrightText: 2026 Sealink Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Performance Governance
//!
//! Policy knobs (batching, compression and chunking thresholds, cache TTL)
//! plus advisory optimization heuristics. The knobs decide *when* payloads
//! are compressed or chunked; the encodings are self-describing, so changing
//! a knob never affects decodability of existing data.

use std::collections::VecDeque;
use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload framing tag: raw bytes follow.
const FRAME_RAW: u8 = 0x00;
/// Payload framing tag: deflate-compressed bytes follow.
const FRAME_DEFLATE: u8 = 0x01;

/// Window of recent operations used for rolling averages.
const STATS_WINDOW: usize = 100;

/// Governance errors.
#[derive(Error, Debug)]
pub enum PerfError {
    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Invalid payload framing")]
    InvalidFraming,

    #[error("Chunk set is incomplete or inconsistent")]
    InvalidChunkSet,
}

/// Tunable policy values consumed from settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Key cache TTL in seconds.
    pub key_cache_ttl_secs: u64,
    /// Maximum items decrypted per sync batch.
    pub batch_size: usize,
    /// Payload size (bytes) above which content is compressed.
    pub compression_threshold: usize,
    /// Payload size (bytes) above which content is split into chunks.
    pub chunk_threshold: usize,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        GovernanceConfig {
            key_cache_ttl_secs: 300,
            batch_size: 50,
            compression_threshold: 1024,
            chunk_threshold: 64 * 1024,
        }
    }
}

/// Compresses a payload when it exceeds the threshold.
///
/// Output is framed with a one-byte tag so the reader never needs the
/// threshold value to decode.
pub fn encode_payload(data: &[u8], compression_threshold: usize) -> Result<Vec<u8>, PerfError> {
    if data.len() <= compression_threshold {
        let mut out = Vec::with_capacity(1 + data.len());
        out.push(FRAME_RAW);
        out.extend_from_slice(data);
        return Ok(out);
    }

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PerfError::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| PerfError::Compression(e.to_string()))?;

    let mut out = Vec::with_capacity(1 + compressed.len());
    out.push(FRAME_DEFLATE);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decodes a framed payload, dispatching on the tag byte.
pub fn decode_payload(framed: &[u8]) -> Result<Vec<u8>, PerfError> {
    match framed.split_first() {
        Some((&FRAME_RAW, rest)) => Ok(rest.to_vec()),
        Some((&FRAME_DEFLATE, rest)) => {
            let mut decoder = DeflateDecoder::new(rest);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| PerfError::Decompression(e.to_string()))?;
            Ok(out)
        }
        _ => Err(PerfError::InvalidFraming),
    }
}

/// One chunk of a split payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadChunk {
    /// Zero-based position within the set.
    pub index: u32,
    /// Total chunks in the set.
    pub total: u32,
    /// Chunk bytes.
    pub data: Vec<u8>,
}

/// Splits a payload into chunks when it exceeds the threshold.
///
/// A payload at or under the threshold yields a single chunk.
pub fn chunk_payload(data: &[u8], chunk_threshold: usize) -> Vec<PayloadChunk> {
    if chunk_threshold == 0 || data.len() <= chunk_threshold {
        return vec![PayloadChunk {
            index: 0,
            total: 1,
            data: data.to_vec(),
        }];
    }

    let chunks: Vec<&[u8]> = data.chunks(chunk_threshold).collect();
    let total = chunks.len() as u32;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, part)| PayloadChunk {
            index: i as u32,
            total,
            data: part.to_vec(),
        })
        .collect()
}

/// Reassembles a chunk set produced by `chunk_payload`.
///
/// Chunks may arrive in any order; the set must be complete and agree on
/// `total`.
pub fn reassemble_chunks(mut chunks: Vec<PayloadChunk>) -> Result<Vec<u8>, PerfError> {
    if chunks.is_empty() {
        return Err(PerfError::InvalidChunkSet);
    }

    let total = chunks[0].total;
    if total as usize != chunks.len() || chunks.iter().any(|c| c.total != total) {
        return Err(PerfError::InvalidChunkSet);
    }

    chunks.sort_by_key(|c| c.index);
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.index != i as u32 {
            return Err(PerfError::InvalidChunkSet);
        }
    }

    Ok(chunks.into_iter().flat_map(|c| c.data).collect())
}

/// Advisory optimization priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationPriority {
    Low,
    Medium,
    High,
}

/// Result of the optimization heuristic. Advisory only.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationAdvice {
    pub needed: bool,
    pub priority: OptimizationPriority,
    pub reasons: Vec<String>,
}

/// Rolling operation statistics feeding `needs_optimization`.
#[derive(Debug, Default)]
pub struct PerfMonitor {
    /// (duration_ms, success) for the most recent operations.
    samples: VecDeque<(u64, bool)>,
    total_operations: u64,
}

impl PerfMonitor {
    /// Average duration above which slow operations are flagged.
    const SLOW_AVG_MS: f64 = 500.0;
    /// Error rate above which instability is flagged.
    const HIGH_ERROR_RATE: f64 = 0.10;
    /// Error rate that escalates the advice to high priority.
    const CRITICAL_ERROR_RATE: f64 = 0.25;

    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed operation.
    pub fn record_operation(&mut self, duration_ms: u64, success: bool) {
        if self.samples.len() == STATS_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back((duration_ms, success));
        self.total_operations += 1;
    }

    /// Rolling average operation duration in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.samples.iter().map(|(d, _)| d).sum();
        sum as f64 / self.samples.len() as f64
    }

    /// Rolling error rate in [0, 1].
    pub fn error_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let failures = self.samples.iter().filter(|(_, ok)| !ok).count();
        failures as f64 / self.samples.len() as f64
    }

    pub fn total_operations(&self) -> u64 {
        self.total_operations
    }

    /// Heuristic advice on whether tuning is warranted.
    ///
    /// Never blocks an operation; callers may surface it to settings UI.
    pub fn needs_optimization(&self) -> OptimizationAdvice {
        let mut reasons = Vec::new();

        let avg = self.average_duration_ms();
        if avg > Self::SLOW_AVG_MS {
            reasons.push(format!("average operation duration {:.0}ms exceeds {}ms", avg, Self::SLOW_AVG_MS));
        }

        let error_rate = self.error_rate();
        if error_rate > Self::HIGH_ERROR_RATE {
            reasons.push(format!("error rate {:.0}% exceeds {:.0}%", error_rate * 100.0, Self::HIGH_ERROR_RATE * 100.0));
        }

        let priority = if error_rate > Self::CRITICAL_ERROR_RATE || (avg > Self::SLOW_AVG_MS && error_rate > Self::HIGH_ERROR_RATE) {
            OptimizationPriority::High
        } else if !reasons.is_empty() {
            OptimizationPriority::Medium
        } else {
            OptimizationPriority::Low
        };

        OptimizationAdvice {
            needed: !reasons.is_empty(),
            priority,
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_payload_stays_raw() {
        let framed = encode_payload(b"short", 1024).unwrap();
        assert_eq!(framed[0], FRAME_RAW);
        assert_eq!(decode_payload(&framed).unwrap(), b"short");
    }

    #[test]
    fn test_large_payload_compressed() {
        let data = vec![b'a'; 4096];
        let framed = encode_payload(&data, 1024).unwrap();
        assert_eq!(framed[0], FRAME_DEFLATE);
        assert!(framed.len() < data.len());
        assert_eq!(decode_payload(&framed).unwrap(), data);
    }

    #[test]
    fn test_decode_independent_of_threshold() {
        // Encoded with one threshold, decoded without knowing it.
        let data = vec![b'x'; 2048];
        let framed = encode_payload(&data, 100).unwrap();
        assert_eq!(decode_payload(&framed).unwrap(), data);
    }

    #[test]
    fn test_chunk_reassembly_out_of_order() {
        let data: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let mut chunks = chunk_payload(&data, 64);
        assert!(chunks.len() > 1);
        chunks.reverse();
        assert_eq!(reassemble_chunks(chunks).unwrap(), data);
    }

    #[test]
    fn test_incomplete_chunk_set_rejected() {
        let data = vec![0u8; 1000];
        let mut chunks = chunk_payload(&data, 64);
        chunks.pop();
        assert!(matches!(
            reassemble_chunks(chunks),
            Err(PerfError::InvalidChunkSet)
        ));
    }

    #[test]
    fn test_advice_on_slow_operations() {
        let mut monitor = PerfMonitor::new();
        for _ in 0..20 {
            monitor.record_operation(900, true);
        }
        let advice = monitor.needs_optimization();
        assert!(advice.needed);
        assert_eq!(advice.priority, OptimizationPriority::Medium);
    }

    #[test]
    fn test_advice_high_priority_on_errors() {
        let mut monitor = PerfMonitor::new();
        for i in 0..20 {
            monitor.record_operation(100, i % 2 == 0);
        }
        let advice = monitor.needs_optimization();
        assert!(advice.needed);
        assert_eq!(advice.priority, OptimizationPriority::High);
    }

    #[test]
    fn test_healthy_monitor_needs_nothing() {
        let mut monitor = PerfMonitor::new();
        for _ in 0..20 {
            monitor.record_operation(50, true);
        }
        let advice = monitor.needs_optimization();
        assert!(!advice.needed);
        assert_eq!(advice.priority, OptimizationPriority::Low);
    }
}
