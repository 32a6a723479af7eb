//! In-process transport.

use super::peer::PortPeer;
use crate::error::TransportError;
use crate::input::InputPort;
use crate::types::{PrecisionUtcTime, SampleBuffer, StreamSri};

/// Delivers directly into an [`InputPort`] in the same process.
///
/// Payloads are copied into buffers taken from the input port's pool, so
/// the consumer can hand them back with [`BufferPool::release`](crate::BufferPool::release).
#[derive(Debug, Clone)]
pub struct LocalPeer<B> {
    port: InputPort<B>,
}

impl<B: SampleBuffer> LocalPeer<B> {
    pub fn new(port: InputPort<B>) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &InputPort<B> {
        &self.port
    }
}

impl<B: SampleBuffer> From<InputPort<B>> for LocalPeer<B> {
    fn from(port: InputPort<B>) -> Self {
        Self::new(port)
    }
}

impl<B: SampleBuffer> PortPeer<B> for LocalPeer<B> {
    fn push_sri(&self, sri: &StreamSri) -> Result<(), TransportError> {
        self.port.push_sri(sri.clone());
        Ok(())
    }

    fn push_packet(
        &self,
        data: &B,
        time: PrecisionUtcTime,
        eos: bool,
        stream_id: &str,
    ) -> Result<(), TransportError> {
        let mut copy = self.port.buffer_pool().acquire();
        copy.append(data);
        self.port.push_packet(copy, time, eos, stream_id);
        Ok(())
    }
}
