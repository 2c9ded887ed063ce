//! Physical transport abstraction for pluggable I/O.

use std::io::Result;

/// Low-level datagram sink abstraction.
///
/// This trait allows various physical transports (UDP multicast, reliable
/// pub/sub, TCP framing, in-memory test channels) to be plugged into the
/// transport orchestrator without coupling to a concrete implementation.
/// Receiving is push-based: the physical transport invokes the
/// orchestrator's `on_receive` with each arriving datagram.
pub trait DatagramSender: Send {
    /// Sends a single encoded message, returning the number of bytes sent.
    fn send(&mut self, payload: &[u8]) -> Result<usize>;
}

/// Datagram sink that buffers every payload in memory.
///
/// Useful in tests and as a capture device for diagnostics.
#[derive(Debug, Default)]
pub struct BufferedSender {
    sent: Vec<Vec<u8>>,
}

impl BufferedSender {
    /// Creates an empty buffered sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the payloads sent so far, oldest first.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Removes and returns all captured payloads.
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sent)
    }
}

impl DatagramSender for BufferedSender {
    fn send(&mut self, payload: &[u8]) -> Result<usize> {
        self.sent.push(payload.to_vec());
        Ok(payload.len())
    }
}
