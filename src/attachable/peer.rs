use std::sync::Arc;

use super::definition::StreamDefinition;
use crate::error::TransportError;
use crate::types::{PrecisionUtcTime, StreamSri};

/// Remote end of one attachable connection.
pub trait AttachablePeer<D: StreamDefinition>: Send + Sync {
    fn repo_id(&self) -> &str {
        D::REPO_ID
    }

    /// Asks the peer to receive `definition`; returns the peer's attach ID.
    fn attach(&self, definition: &D, user_id: &str) -> Result<String, TransportError>;

    fn detach(&self, attach_id: &str) -> Result<(), TransportError>;

    fn push_sri(&self, sri: &StreamSri, time: PrecisionUtcTime) -> Result<(), TransportError>;
}

impl<D: StreamDefinition, P: AttachablePeer<D> + ?Sized> AttachablePeer<D> for Arc<P> {
    fn repo_id(&self) -> &str {
        (**self).repo_id()
    }

    fn attach(&self, definition: &D, user_id: &str) -> Result<String, TransportError> {
        (**self).attach(definition, user_id)
    }

    fn detach(&self, attach_id: &str) -> Result<(), TransportError> {
        (**self).detach(attach_id)
    }

    fn push_sri(&self, sri: &StreamSri, time: PrecisionUtcTime) -> Result<(), TransportError> {
        (**self).push_sri(sri, time)
    }
}
