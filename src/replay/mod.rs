//! Replay of buffered readings.
//!
//! After each successful connect the event pump calls `drain`, which pops
//! the oldest reading and sends it, for as long as the queue is non-empty
//! and the session stays connected. The first failed send puts that reading
//! back at the head and ends the pass; the next reconnect resumes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{Span, info, warn};

use crate::publisher::Publisher;
use crate::queue::OfflineQueue;
use crate::utils::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    Draining,
}

/// Why a replay pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStop {
    /// The queue is empty.
    Exhausted,
    /// The session went away mid-pass.
    Disconnected,
    /// A send failed; the reading is back at the head of the queue.
    SendFailed,
    /// Another pass was already running.
    AlreadyDraining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub sent: usize,
    pub remaining: usize,
    pub stop: ReplayStop,
}

pub struct ReplayProcessor {
    queue: Arc<OfflineQueue>,
    publisher: Arc<Publisher>,
    draining: AtomicBool,
    passes: AtomicU64,
    span: Span,
}

/// Resets the draining flag however the pass ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReplayProcessor {
    pub fn new(
        queue: Arc<OfflineQueue>,
        publisher: Arc<Publisher>,
        span: Span,
    ) -> Self {
        Self {
            queue,
            publisher,
            draining: AtomicBool::new(false),
            passes: AtomicU64::new(0),
            span,
        }
    }

    pub fn state(&self) -> ReplayState {
        if self.draining.load(Ordering::Acquire) {
            ReplayState::Draining
        } else {
            ReplayState::Idle
        }
    }

    /// Number of passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Run one replay pass.
    pub fn drain(&self) -> ReplayOutcome {
        let _enter = self.span.enter();

        if self.draining.swap(true, Ordering::AcqRel) {
            return ReplayOutcome {
                sent: 0,
                remaining: self.queue.len(),
                stop: ReplayStop::AlreadyDraining,
            };
        }
        let _guard = DrainGuard(&self.draining);
        self.passes.fetch_add(1, Ordering::Relaxed);

        let mut sent = 0;
        let stop = loop {
            if !self.publisher.is_connected() {
                break ReplayStop::Disconnected;
            }
            let Some(reading) = self.queue.dequeue_front() else {
                break ReplayStop::Exhausted;
            };

            match self.publisher.send(&reading) {
                Ok(_) => sent += 1,
                Err(TransportError::NotConnected) => {
                    if self.queue.requeue_front(reading).is_some() {
                        warn!("Queue refilled during replay, requeued reading evicted");
                    }
                    break ReplayStop::Disconnected;
                }
                Err(e) => {
                    warn!("Replay send failed, stopping pass: {e}");
                    if self.queue.requeue_front(reading).is_some() {
                        warn!("Queue refilled during replay, failed reading evicted");
                    }
                    break ReplayStop::SendFailed;
                }
            }
        };

        let remaining = self.queue.len();
        if sent > 0 || stop != ReplayStop::Exhausted {
            info!("Replayed {sent} queued readings, {remaining} remaining ({stop:?})");
        }

        ReplayOutcome {
            sent,
            remaining,
            stop,
        }
    }
}

impl std::fmt::Debug for ReplayProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayProcessor")
            .field("state", &self.state())
            .field("passes", &self.passes())
            .finish()
    }
}
