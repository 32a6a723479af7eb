//! Queued data packets.

use super::{PrecisionUtcTime, SampleBuffer, SriChangeFlags, StreamSri};

/// One unit held by an input port's queue.
///
/// Created by the push path and owned by the queue until a single consumer
/// dequeues it.
#[derive(Debug, Clone)]
pub struct DataPacket<B> {
    pub buffer: B,
    pub time: PrecisionUtcTime,
    pub eos: bool,
    pub stream_id: String,
    /// SRI in effect when the packet was pushed.
    pub sri: StreamSri,
    /// True if the SRI changed since the previous packet of this stream.
    pub sri_changed: bool,
    pub sri_change_flags: SriChangeFlags,
    /// True if the queue overflowed and dropped data before this packet.
    pub input_queue_flushed: bool,
}

impl<B: SampleBuffer> DataPacket<B> {
    pub(crate) fn new(
        buffer: B,
        time: PrecisionUtcTime,
        eos: bool,
        sri: StreamSri,
        sri_change_flags: SriChangeFlags,
    ) -> Self {
        Self {
            buffer,
            time,
            eos,
            stream_id: sri.stream_id.clone(),
            sri,
            sri_changed: !sri_change_flags.is_empty(),
            sri_change_flags,
            input_queue_flushed: false,
        }
    }

    /// Number of elements in the payload.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
