//! # Frame Reader
//!
//! Accumulates bytes from a [`PortConnection`] and extracts
//! terminator-delimited text messages.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tracing::debug;

use super::PortConnection;

/// Default message terminator
pub const DEFAULT_TERMINATOR: &[u8] = b"\n";

/// Line framer over a shared port
#[derive(Debug)]
pub struct FrameReader {
    port: Arc<PortConnection>,
    terminator: Vec<u8>,
    stream: BytesMut,
}

impl FrameReader {
    /// Create a reader using the newline terminator
    pub fn new(port: Arc<PortConnection>) -> Self {
        Self::with_terminator(port, DEFAULT_TERMINATOR)
    }

    /// Create a reader with a custom terminator
    pub fn with_terminator(port: Arc<PortConnection>, terminator: &[u8]) -> Self {
        Self {
            port,
            terminator: terminator.to_vec(),
            stream: BytesMut::with_capacity(4096),
        }
    }

    /// Pull waiting bytes from the port into the accumulator
    ///
    /// Nothing is read while disconnected. An I/O error drops the port
    /// handle so the watchdog can take over; it is not reported.
    pub fn read(&mut self) {
        match self.port.read_available() {
            Ok(bytes) => self.stream.extend_from_slice(&bytes),
            Err(e) => {
                debug!("Serial read failed: {}", e);
                self.port.drop_handle();
            }
        }
    }

    /// Whether at least one complete message is buffered
    pub fn available(&self) -> bool {
        find(&self.stream, &self.terminator).is_some()
    }

    /// Take the next message using the default terminator
    ///
    /// Returns an empty string when no complete message is buffered.
    pub fn next_message(&mut self) -> String {
        let terminator = std::mem::take(&mut self.terminator);
        let message = self.next_message_with(&terminator);
        self.terminator = terminator;
        message
    }

    /// Take the next message ending in `terminator`
    pub fn next_message_with(&mut self, terminator: &[u8]) -> String {
        let Some(idx) = find(&self.stream, terminator) else {
            return String::new();
        };

        let message = self.stream.split_to(idx);
        if self.stream.len() <= terminator.len() {
            self.stream.clear();
        } else {
            self.stream.advance(terminator.len());
        }

        // Newline framing drops every carriage return; ASCII with invalid bytes dropped
        let strip_cr = terminator == b"\n";
        message
            .iter()
            .filter(|&&b| b.is_ascii() && !(strip_cr && b == b'\r'))
            .map(|&b| b as char)
            .collect()
    }

    /// Discard everything buffered
    pub fn clear(&mut self) {
        self.stream.clear();
    }

    /// Number of buffered bytes
    pub fn buffered(&self) -> usize {
        self.stream.len()
    }

    /// The port this reader pulls from
    pub fn port(&self) -> &Arc<PortConnection> {
        &self.port
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
