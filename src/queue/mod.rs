//! The `queue` module holds readings that cannot be delivered right now.
//!
//! `OfflineQueue` is a bounded FIFO shared between the producer (which
//! enqueues while the session is down) and the replay pass (which drains it
//! from the session's event task). Overflow evicts the oldest entry.

mod ring;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{Span, debug};

use crate::reading::Reading;

pub use ring::RingBuffer;

/// Default bound on buffered readings.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

#[derive(Debug)]
pub struct OfflineQueue {
    ring: Mutex<RingBuffer<Reading>>,
    evicted: AtomicU64,
    span: Span,
}

impl OfflineQueue {
    pub fn new(max_queue_size: usize) -> Self {
        Self::with_span(max_queue_size, Span::none())
    }

    /// Create a queue that logs under `span`.
    pub fn with_span(max_queue_size: usize, span: Span) -> Self {
        Self {
            ring: Mutex::new(RingBuffer::with_capacity(max_queue_size)),
            evicted: AtomicU64::new(0),
            span,
        }
    }

    // A panic while holding the lock cannot leave the ring half-updated, so a
    // poisoned lock is still safe to use.
    fn ring(&self) -> MutexGuard<'_, RingBuffer<Reading>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `reading` at the tail, evicting and returning the oldest entry
    /// when the queue is full.
    pub fn enqueue(&self, reading: Reading) -> Option<Reading> {
        let evicted = self.ring().push_back(reading);
        if let Some(dropped) = &evicted {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            let _enter = self.span.enter();
            debug!(
                sensor_type = dropped.sensor_type(),
                measurement_type = dropped.measurement_type(),
                timestamp = dropped.timestamp(),
                "Offline queue full, evicted oldest reading"
            );
        }
        evicted
    }

    /// Remove and return the oldest entry.
    pub fn dequeue_front(&self) -> Option<Reading> {
        self.ring().pop_front()
    }

    /// Put `reading` back at the head. If the queue filled up in the
    /// meantime the reading is the oldest entry, so it is evicted and
    /// returned.
    pub fn requeue_front(&self, reading: Reading) -> Option<Reading> {
        let rejected = self.ring().push_front(reading);
        if rejected.is_some() {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            let _enter = self.span.enter();
            debug!("Offline queue full, requeued reading evicted");
        }
        rejected
    }

    pub fn len(&self) -> usize {
        self.ring().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring().capacity()
    }

    /// Copy of the buffered readings, oldest first.
    pub fn snapshot(&self) -> Vec<Reading> {
        self.ring().iter().cloned().collect()
    }

    /// Number of readings dropped by overflow since creation.
    pub fn evicted_total(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for OfflineQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUEUE_SIZE)
    }
}
