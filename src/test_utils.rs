//! Test peers that record what a port delivers to them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::attachable::{AttachablePeer, StreamDefinition};
use crate::error::TransportError;
use crate::output::PortPeer;
use crate::types::{PrecisionUtcTime, SampleBuffer, StreamSri};

/// One call observed by a [`RecordingPeer`].
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    Sri(StreamSri),
    Packet { stream_id: String, len: usize, time: PrecisionUtcTime, eos: bool },
}

/// Peer that records calls and can be switched into failure.
#[derive(Debug, Default)]
pub struct RecordingPeer {
    events: Mutex<Vec<PeerEvent>>,
    repo_id: Option<String>,
    failing: AtomicBool,
}

impl RecordingPeer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peer advertising a different interface than the port's payload.
    pub fn with_repo_id(repo_id: &str) -> Self {
        Self { repo_id: Some(repo_id.to_string()), ..Self::default() }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<PeerEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Stream IDs of received packets, in order.
    pub fn packet_streams(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PeerEvent::Packet { stream_id, .. } => Some(stream_id),
                PeerEvent::Sri(_) => None,
            })
            .collect()
    }

    pub fn sri_count(&self) -> usize {
        self.events().iter().filter(|event| matches!(event, PeerEvent::Sri(_))).count()
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(TransportError::CommFailure("peer unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl<B: SampleBuffer> PortPeer<B> for RecordingPeer {
    fn repo_id(&self) -> &str {
        self.repo_id.as_deref().unwrap_or(B::REPO_ID)
    }

    fn push_sri(&self, sri: &StreamSri) -> Result<(), TransportError> {
        self.check()?;
        self.events.lock().push(PeerEvent::Sri(sri.clone()));
        Ok(())
    }

    fn push_packet(
        &self,
        data: &B,
        time: PrecisionUtcTime,
        eos: bool,
        stream_id: &str,
    ) -> Result<(), TransportError> {
        self.check()?;
        self.events.lock().push(PeerEvent::Packet {
            stream_id: stream_id.to_string(),
            len: data.len(),
            time,
            eos,
        });
        Ok(())
    }
}

/// One call observed by a [`RecordingAttachPeer`].
#[derive(Debug, Clone, PartialEq)]
pub enum AttachEvent {
    Attach { stream_id: String, attach_id: String },
    Detach { attach_id: String },
    Sri(StreamSri),
}

/// Attachable peer that hands out sequential attach IDs.
#[derive(Debug, Default)]
pub struct RecordingAttachPeer {
    name: String,
    events: Mutex<Vec<AttachEvent>>,
    next_id: AtomicUsize,
    failing: AtomicBool,
    sri_failing: AtomicBool,
}

impl RecordingAttachPeer {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Self::default() }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fails only SRI pushes; attach and detach keep working.
    pub fn set_sri_failing(&self, failing: bool) {
        self.sri_failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<AttachEvent> {
        self.events.lock().clone()
    }

    /// Attach IDs currently held by this peer.
    pub fn attached(&self) -> Vec<String> {
        let mut live = Vec::new();
        for event in self.events() {
            match event {
                AttachEvent::Attach { attach_id, .. } => live.push(attach_id),
                AttachEvent::Detach { attach_id } => live.retain(|id| *id != attach_id),
                AttachEvent::Sri(_) => {}
            }
        }
        live
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(TransportError::Transient("peer busy".to_string()))
        } else {
            Ok(())
        }
    }
}

impl<D: StreamDefinition> AttachablePeer<D> for RecordingAttachPeer {
    fn attach(&self, definition: &D, _user_id: &str) -> Result<String, TransportError> {
        self.check()?;
        let attach_id = format!("{}-{}", self.name, self.next_id.fetch_add(1, Ordering::SeqCst));
        self.events.lock().push(AttachEvent::Attach {
            stream_id: definition.id().to_string(),
            attach_id: attach_id.clone(),
        });
        Ok(attach_id)
    }

    fn detach(&self, attach_id: &str) -> Result<(), TransportError> {
        self.check()?;
        self.events.lock().push(AttachEvent::Detach { attach_id: attach_id.to_string() });
        Ok(())
    }

    fn push_sri(&self, sri: &StreamSri, _time: PrecisionUtcTime) -> Result<(), TransportError> {
        self.check()?;
        if self.sri_failing.load(Ordering::SeqCst) {
            return Err(TransportError::CommFailure("SRI rejected".to_string()));
        }
        self.events.lock().push(AttachEvent::Sri(sri.clone()));
        Ok(())
    }
}
