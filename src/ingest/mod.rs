//! Line-oriented reading input.
//!
//! Each non-empty line holds either one reading as a JSON object or several
//! as a JSON array. Arrays go through `transmit_batch` so they keep their
//! order. Lines that do not parse are logged and skipped.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::reading::Reading;
use crate::transmitter::Transmitter;

/// What a `forward_lines` run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    /// Readings parsed from the input.
    pub readings: usize,
    /// Readings the transmitter accepted.
    pub accepted: usize,
    /// Lines skipped because they did not parse.
    pub malformed: usize,
}

/// Feed every reading found in `reader` to `transmitter` until end of input.
pub async fn forward_lines<R>(transmitter: &Transmitter, reader: R) -> std::io::Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = IngestSummary::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('[') {
            match serde_json::from_str::<Vec<Reading>>(line) {
                Ok(readings) => {
                    let total = readings.len();
                    let accepted = transmitter.transmit_batch(readings);
                    summary.readings += total;
                    summary.accepted += accepted;
                    if accepted < total {
                        warn!("Transmitted {accepted}/{total} readings");
                    }
                }
                Err(e) => {
                    summary.malformed += 1;
                    warn!("Skipping malformed batch: {e}");
                }
            }
        } else {
            match serde_json::from_str::<Reading>(line) {
                Ok(reading) => {
                    summary.readings += 1;
                    if transmitter.transmit_one(reading) {
                        summary.accepted += 1;
                    } else {
                        warn!("Reading was not accepted");
                    }
                }
                Err(e) => {
                    summary.malformed += 1;
                    warn!("Skipping malformed reading: {e}");
                }
            }
        }
    }

    info!(
        "Input exhausted: {} readings, {} accepted, {} malformed lines",
        summary.readings, summary.accepted, summary.malformed
    );
    Ok(summary)
}
