//! Boundary to the consumers an output port delivers to.

use std::sync::Arc;

use crate::error::TransportError;
use crate::types::{PrecisionUtcTime, SampleBuffer, StreamSri};

/// Remote end of one output connection.
///
/// Calls are made synchronously from the pushing thread. Errors are
/// reported per connection and never retried.
pub trait PortPeer<B: SampleBuffer>: Send + Sync {
    /// Interface identifier the peer accepts; checked on connect.
    fn repo_id(&self) -> &str {
        B::REPO_ID
    }

    fn push_sri(&self, sri: &StreamSri) -> Result<(), TransportError>;

    fn push_packet(
        &self,
        data: &B,
        time: PrecisionUtcTime,
        eos: bool,
        stream_id: &str,
    ) -> Result<(), TransportError>;
}

impl<B: SampleBuffer, P: PortPeer<B> + ?Sized> PortPeer<B> for Arc<P> {
    fn repo_id(&self) -> &str {
        (**self).repo_id()
    }

    fn push_sri(&self, sri: &StreamSri) -> Result<(), TransportError> {
        (**self).push_sri(sri)
    }

    fn push_packet(
        &self,
        data: &B,
        time: PrecisionUtcTime,
        eos: bool,
        stream_id: &str,
    ) -> Result<(), TransportError> {
        (**self).push_packet(data, time, eos, stream_id)
    }
}
