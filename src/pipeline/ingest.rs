//! Serial ingest stage: frames, decodes and enqueues records.

use std::sync::Arc;

use tracing::trace;

use super::channel::Channel;
use super::lifecycle::PollTask;
use crate::codec::{Record, RecordCodec};
use crate::error::Result;
use crate::serial::FrameReader;

/// Drives a [`FrameReader`] and a [`RecordCodec`]
#[derive(Debug)]
pub struct IngestWorker {
    reader: FrameReader,
    codec: Arc<RecordCodec>,
    records: Channel<Record>,
    raw: Option<Channel<String>>,
}

impl IngestWorker {
    pub fn new(reader: FrameReader, codec: Arc<RecordCodec>, records: Channel<Record>) -> Self {
        Self {
            reader,
            codec,
            records,
            raw: None,
        }
    }

    /// Also forward every message text to `raw`
    pub fn with_raw(mut self, raw: Channel<String>) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Read the port once and enqueue every complete message
    ///
    /// Empty messages are skipped. Messages that fail to decode are still
    /// enqueued as blank records.
    ///
    /// # Returns
    ///
    /// * `usize` - Number of records pushed
    pub fn pump(&mut self) -> usize {
        self.reader.read();

        let mut pushed = 0;
        while self.reader.available() {
            let message = self.reader.next_message();
            if message.is_empty() {
                continue;
            }
            trace!("Message: {}", message);

            self.records.push(self.codec.decode(&message));
            if let Some(raw) = &self.raw {
                raw.push(message);
            }
            pushed += 1;
        }
        pushed
    }

    pub fn records(&self) -> &Channel<Record> {
        &self.records
    }
}

impl PollTask for IngestWorker {
    fn poll(&mut self) -> Result<()> {
        self.pump();
        Ok(())
    }
}
