//! Publisher
//!
//! The single path by which a reading leaves the process. Each reading is
//! either sent right away (session connected) or parked in the offline
//! queue (anything else). Sending means building the topic, serializing the
//! payload to JSON and handing it to the session with QoS 1.
//!
//! A send that fails while nominally connected drops the reading unless
//! `requeue_on_send_failure` is enabled.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{Span, debug, warn};

use crate::config::TransmitterSettings;
use crate::connection::Session;
use crate::queue::OfflineQueue;
use crate::reading::Reading;
use crate::status::DeliveryStats;
use crate::utils::error::TransportError;

pub struct Publisher {
    session: Arc<dyn Session>,
    queue: Arc<OfflineQueue>,
    stats: Arc<DeliveryStats>,
    base_topic: String,
    device_id: String,
    requeue_on_send_failure: bool,
    span: Span,
}

impl Publisher {
    pub fn new(
        session: Arc<dyn Session>,
        queue: Arc<OfflineQueue>,
        stats: Arc<DeliveryStats>,
        settings: &TransmitterSettings,
        span: Span,
    ) -> Self {
        Self {
            session,
            queue,
            stats,
            base_topic: settings.base_topic.clone(),
            device_id: settings.device_id.clone(),
            requeue_on_send_failure: settings.requeue_on_send_failure,
            span,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.state().is_connected()
    }

    /// Accept one reading.
    ///
    /// Returns `true` when the reading was queued for later (even if that
    /// evicted an older one) or handed to the transport, and `false` when the
    /// transport refused it. A session that is already closing counts as
    /// offline.
    pub fn transmit_one(&self, reading: Reading) -> bool {
        if !self.is_connected() {
            self.queue.enqueue(reading);
            return true;
        }

        match self.send(&reading) {
            Ok(_) => true,
            // The session went away before the state caught up.
            Err(TransportError::NotConnected) => {
                let _enter = self.span.enter();
                debug!("Session closing, buffering reading");
                self.queue.enqueue(reading);
                true
            }
            Err(e) => {
                let _enter = self.span.enter();
                if self.requeue_on_send_failure {
                    warn!(
                        sensor_type = reading.sensor_type(),
                        measurement_type = reading.measurement_type(),
                        "Send failed, requeueing reading: {e}"
                    );
                    self.queue.enqueue(reading);
                } else {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        sensor_type = reading.sensor_type(),
                        measurement_type = reading.measurement_type(),
                        "Send failed, reading dropped: {e}"
                    );
                }
                false
            }
        }
    }

    /// Accept readings in order and return how many were accepted.
    pub fn transmit_batch<I>(&self, readings: I) -> usize
    where
        I: IntoIterator<Item = Reading>,
    {
        readings
            .into_iter()
            .map(|reading| self.transmit_one(reading))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Publish `reading` on the live session and return its message id.
    ///
    /// Does not consult the connection state and never touches the queue.
    pub fn send(&self, reading: &Reading) -> Result<String, TransportError> {
        let topic = reading.topic(&self.base_topic, &self.device_id);
        let payload = reading.payload(&self.device_id).to_json()?;

        let message_id = self.session.publish(topic, payload)?;
        self.stats.sent.fetch_add(1, Ordering::Relaxed);

        let _enter = self.span.enter();
        debug!(
            message_id = message_id.as_str(),
            sensor_type = reading.sensor_type(),
            measurement_type = reading.measurement_type(),
            "Reading published"
        );
        Ok(message_id)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("base_topic", &self.base_topic)
            .field("device_id", &self.device_id)
            .field("requeue_on_send_failure", &self.requeue_on_send_failure)
            .finish()
    }
}
