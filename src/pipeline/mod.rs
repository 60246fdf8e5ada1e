//! Two-stage analysis pipeline.
//!
//! ```text
//! reader thread                         calling thread
//!   read record -> decode  --[bounded]-->  FlowTracker -> stats
//! ```
//!
//! There is exactly one consumer and the channel is FIFO, so segments reach
//! the tracker in capture order and the result matches [`crate::analyze`].

use crate::capture::{CaptureError, CaptureReader};
use crate::config::Config;
use crate::{read_decoded, Analysis, Event, Ingest};
use crossbeam_channel::bounded;
use std::io::Read;
use std::thread;

/// Analyze a capture with reading and decoding moved to a worker thread.
pub fn analyze_pipelined<R: Read + Send>(
    source: R,
    config: &Config,
) -> Result<Analysis, CaptureError> {
    let mut reader = CaptureReader::new(source)?;
    let info = reader.info().clone();
    let capacity = config.run.channel_capacity.max(1);
    tracing::info!(capacity, "starting pipelined analysis");

    let (tx, rx) = bounded::<Event>(capacity);

    let (ingest, produced) = thread::scope(|scope| {
        let producer = scope.spawn(move || {
            // A failed send means the consumer is gone; stop reading.
            read_decoded(&mut reader, &config.decode, config.run.count, |event| {
                tx.send(event).is_ok()
            })
        });

        let mut ingest = Ingest::new();
        for event in rx.iter() {
            ingest.push(event);
        }

        let produced = producer
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        (ingest, produced)
    });

    produced?;
    Ok(ingest.finish(info, &config.stats))
}
