//! # Metrics
//!
//! Lightweight counter registry shared through the service graph. Counters
//! are plain atomics; an exporter can snapshot them without coordinating
//! with the subsystems that bump them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters bumped by the daemon's subsystems.
#[derive(Debug, Default)]
pub struct Metrics {
    started_at: AtomicU64,
    peers_connected: AtomicU64,
    asks_queried: AtomicU64,
    asks_failed: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub started_at: u64,
    pub peers_connected: u64,
    pub asks_queried: u64,
    pub asks_failed: u64,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the moment startup actions began running.
    pub fn mark_started(&self) {
        self.started_at
            .store(crate::types::unix_now(), Ordering::Relaxed);
    }

    pub fn record_peer_connected(&self) {
        self.peers_connected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ask(&self) {
        self.asks_queried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ask_failure(&self) {
        self.asks_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started_at: self.started_at.load(Ordering::Relaxed),
            peers_connected: self.peers_connected.load(Ordering::Relaxed),
            asks_queried: self.asks_queried.load(Ordering::Relaxed),
            asks_failed: self.asks_failed.load(Ordering::Relaxed),
        }
    }
}
