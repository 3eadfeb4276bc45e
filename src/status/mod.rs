//! Read-only health reporting.
//!
//! `StatusReporter::status` computes a fresh `TransmitterStatus` on every
//! call from the live connection state, queue and counters. Nothing is
//! cached.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::connection::{ConnectionState, SharedState};
use crate::queue::OfflineQueue;

/// Monotonic delivery counters shared by the publisher, the replay pass and
/// the connection manager.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    /// Readings handed to the transport.
    pub sent: AtomicU64,
    /// Readings lost to a failed send.
    pub dropped: AtomicU64,
    /// Publish acknowledgments received from the broker.
    pub acked: AtomicU64,
}

/// Snapshot of transmitter health.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransmitterStatus {
    pub connected: bool,
    pub state: ConnectionState,
    pub broker: String,
    pub queue_size: usize,
    pub device_id: String,
    pub sent: u64,
    pub evicted: u64,
    pub dropped: u64,
    pub acked: u64,
}

#[derive(Debug)]
pub struct StatusReporter {
    state: SharedState,
    broker: String,
    device_id: String,
    queue: Arc<OfflineQueue>,
    stats: Arc<DeliveryStats>,
}

impl StatusReporter {
    pub fn new(
        state: SharedState,
        broker: impl Into<String>,
        device_id: impl Into<String>,
        queue: Arc<OfflineQueue>,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        Self {
            state,
            broker: broker.into(),
            device_id: device_id.into(),
            queue,
            stats,
        }
    }

    pub fn status(&self) -> TransmitterStatus {
        let state = self.state.get();
        TransmitterStatus {
            connected: state.is_connected(),
            state,
            broker: self.broker.clone(),
            queue_size: self.queue.len(),
            device_id: self.device_id.clone(),
            sent: self.stats.sent.load(Ordering::Relaxed),
            evicted: self.queue.evicted_total(),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            acked: self.stats.acked.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests;
