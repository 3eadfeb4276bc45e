//! Transmitter
//!
//! The object a producer holds. It wires the components together:
//!
//! ```text
//! transmit_one/transmit_batch ──> Publisher ──(connected)──> ConnectionManager ──> session task
//!                                     │                              ▲
//!                              (otherwise)                           │ SessionEvent
//!                                     ▼                              │
//!                               OfflineQueue <── ReplayProcessor <── event pump
//! ```
//!
//! The event pump is a background task, started on the first `connect`,
//! that applies each session event to the connection manager and runs a
//! replay pass after every successful connect.
//!
//! All components log under a span carrying the device id, created here and
//! handed down at construction.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info_span};

use crate::config::Settings;
use crate::connection::{ConnectionManager, ConnectionState, Session, SessionEvent};
use crate::publisher::Publisher;
use crate::queue::OfflineQueue;
use crate::reading::Reading;
use crate::replay::{ReplayOutcome, ReplayProcessor};
use crate::status::{DeliveryStats, StatusReporter, TransmitterStatus};

pub struct Transmitter {
    connection: Arc<ConnectionManager>,
    queue: Arc<OfflineQueue>,
    publisher: Arc<Publisher>,
    replay: Arc<ReplayProcessor>,
    reporter: StatusReporter,
    events: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    last_replay: Arc<Mutex<Option<ReplayOutcome>>>,
    span: Span,
}

impl Transmitter {
    /// Build a transmitter from `settings`. Nothing touches the network
    /// until `connect` is called.
    pub fn new(settings: Settings) -> Self {
        let device_id = settings.transmitter.device_id.clone();
        let span = info_span!("transmitter", device_id = %device_id);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(DeliveryStats::default());
        let queue = Arc::new(OfflineQueue::with_span(
            settings.transmitter.max_queue_size,
            info_span!(parent: &span, "offline_queue"),
        ));
        let connection = Arc::new(ConnectionManager::new(
            settings.broker.clone(),
            device_id.clone(),
            events_tx,
            stats.clone(),
            info_span!(parent: &span, "connection"),
        ));
        let publisher = Arc::new(Publisher::new(
            connection.clone() as Arc<dyn Session>,
            queue.clone(),
            stats.clone(),
            &settings.transmitter,
            info_span!(parent: &span, "publisher"),
        ));
        let replay = Arc::new(ReplayProcessor::new(
            queue.clone(),
            publisher.clone(),
            info_span!(parent: &span, "replay"),
        ));
        let reporter = StatusReporter::new(
            connection.state_handle(),
            settings.broker.address(),
            device_id,
            queue.clone(),
            stats,
        );

        Self {
            connection,
            queue,
            publisher,
            replay,
            reporter,
            events: Mutex::new(Some(events_rx)),
            pump: Mutex::new(None),
            last_replay: Arc::new(Mutex::new(None)),
            span,
        }
    }

    /// Start the event pump if it is not running yet. Needs a Tokio runtime.
    fn ensure_pump(&self) {
        let Some(mut events) = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        let connection = self.connection.clone();
        let replay = self.replay.clone();
        let last_replay = self.last_replay.clone();

        let task = tokio::spawn(
            async move {
                while let Some(event) = events.recv().await {
                    if connection.apply(&event) {
                        let outcome = replay.drain();
                        *last_replay.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(outcome);
                    }
                }
                debug!("Session event channel closed");
            }
            .instrument(self.span.clone()),
        );

        *self.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Open the broker session, waiting up to the connect timeout.
    ///
    /// `false` is advisory: readings keep being accepted and buffered, and
    /// the attempt may still succeed later.
    pub async fn connect(&self) -> bool {
        self.ensure_pump();
        self.connection.connect().await
    }

    /// End the broker session. Buffered readings stay queued.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Accept one reading; see [`Publisher::transmit_one`].
    pub fn transmit_one(&self, reading: Reading) -> bool {
        self.publisher.transmit_one(reading)
    }

    /// Accept readings in order and return how many were accepted.
    pub fn transmit_batch<I>(&self, readings: I) -> usize
    where
        I: IntoIterator<Item = Reading>,
    {
        self.publisher.transmit_batch(readings)
    }

    pub fn status(&self) -> TransmitterStatus {
        self.reporter.status()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Why the last connect attempt failed, if it did.
    pub fn last_error(&self) -> Option<String> {
        self.connection.last_error()
    }

    /// Result of the most recent replay pass.
    pub fn last_replay(&self) -> Option<ReplayOutcome> {
        *self
            .last_replay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Transmitter {
    fn drop(&mut self) {
        if let Some(task) = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter")
            .field("connection", &self.connection)
            .field("publisher", &self.publisher)
            .field("queue_size", &self.queue.len())
            .finish()
    }
}
