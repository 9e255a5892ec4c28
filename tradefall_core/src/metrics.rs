//! Tradefall Metrics Module
//! ========================
//!
//! Counters for the two concurrency domains:
//! - **SimulationStats**: owned by the driver, plain integers
//! - **FeedStats**: shared with the feed task, atomics readable from anywhere

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by [`crate::simulation::Simulation`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    /// Admission ticks executed
    pub admission_ticks: u64,
    /// Frame ticks executed
    pub frame_ticks: u64,
    /// Entities admitted
    pub admitted: u64,
    /// Entities expired
    pub expired: u64,
    /// Largest batch admitted in one tick
    pub largest_batch: usize,
    /// Highest live entity count observed after admission
    pub peak_live: usize,
}

impl SimulationStats {
    /// Entities admitted but not yet expired.
    pub fn live(&self) -> u64 {
        self.admitted - self.expired
    }
}

/// Feed listener counters.
#[derive(Debug, Default)]
pub struct FeedStats {
    messages: AtomicU64,
    trades: AtomicU64,
    skipped: AtomicU64,
    decode_errors: AtomicU64,
    connections: AtomicU64,
    reconnect_attempts: AtomicU64,
}

/// Point-in-time copy of [`FeedStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStatsSnapshot {
    pub messages: u64,
    pub trades: u64,
    pub skipped: u64,
    pub decode_errors: u64,
    pub connections: u64,
    pub reconnect_attempts: u64,
}

impl FeedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_message(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_trade(&self) {
        self.trades.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            trades: self.trades.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_stats_snapshot() {
        let stats = FeedStats::new();
        stats.record_message();
        stats.record_message();
        stats.record_trade();
        stats.record_skip();
        stats.record_connection();

        let snap = stats.snapshot();
        assert_eq!(snap.messages, 2);
        assert_eq!(snap.trades, 1);
        assert_eq!(snap.skipped, 1);
        assert_eq!(snap.decode_errors, 0);
        assert_eq!(snap.connections, 1);
    }

    #[test]
    fn test_live_count() {
        let stats = SimulationStats {
            admitted: 10,
            expired: 4,
            ..Default::default()
        };
        assert_eq!(stats.live(), 6);
    }
}
