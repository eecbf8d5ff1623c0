//! Relay counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::compute::DeliveryOutcome;

/// Running totals since startup
#[derive(Debug, Default)]
pub struct RelayStats {
    received: AtomicU64,
    rejected: AtomicU64,
    fan_outs: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    send_failed: AtomicU64,
    compute_failed: AtomicU64,
}

/// Point-in-time copy of `RelayStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub rejected: u64,
    pub fan_outs: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub send_failed: u64,
    pub compute_failed: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fan_out(&self) {
        self.fan_outs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &DeliveryOutcome) {
        let counter = match outcome {
            DeliveryOutcome::Delivered => &self.delivered,
            DeliveryOutcome::Dropped => &self.dropped,
            DeliveryOutcome::SendFailed(_) => &self.send_failed,
            DeliveryOutcome::ComputeFailed(_) => &self.compute_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            fan_outs: self.fan_outs.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            send_failed: self.send_failed.load(Ordering::Relaxed),
            compute_failed: self.compute_failed.load(Ordering::Relaxed),
        }
    }
}
