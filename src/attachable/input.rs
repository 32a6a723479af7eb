//! Receiving end of attachable connections.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::definition::StreamDefinition;
use super::peer::AttachablePeer;
use crate::error::{PortError, Result, TransportError};
use crate::input::SriListener;
use crate::listener::guarded;
use crate::types::{DefaultComparator, PrecisionUtcTime, SriComparator, StreamSri, UsageState};

/// Decides the attach ID for a request: `Ok(None)` accepts with a generated ID.
pub type AttachListener<D> = Arc<dyn Fn(&D, &str) -> Result<Option<String>> + Send + Sync>;

/// Accepts or rejects a detach request.
pub type DetachListener = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone)]
struct Attachment<D> {
    definition: D,
    user_id: String,
}

struct State<D> {
    attachments: BTreeMap<String, Attachment<D>>,
    sris: BTreeMap<String, (StreamSri, PrecisionUtcTime)>,
}

struct Listeners<D> {
    attach: Option<AttachListener<D>>,
    detach: Option<DetachListener>,
    new_stream: Option<SriListener>,
    sri_changed: Option<SriListener>,
}

struct Inner<D> {
    name: String,
    state: Mutex<State<D>>,
    listeners: RwLock<Listeners<D>>,
    comparator: RwLock<Arc<dyn SriComparator>>,
}

/// Input port that registers stream definitions instead of queueing data.
///
/// ```rust
/// use bulkio::attachable::{InAttachablePort, SddsStreamDefinition};
/// use bulkio::UsageState;
///
/// let port = InAttachablePort::<SddsStreamDefinition>::new("dataSDDS_in");
/// let definition = SddsStreamDefinition { id: "s1".into(), ..Default::default() };
/// let attach_id = port.attach(definition, "user").unwrap();
/// assert_eq!(port.usage_state(), UsageState::Busy);
/// port.detach(&attach_id).unwrap();
/// assert!(port.detach(&attach_id).is_err());
/// ```
pub struct InAttachablePort<D> {
    inner: Arc<Inner<D>>,
}

impl<D> Clone for InAttachablePort<D> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<D: StreamDefinition> InAttachablePort<D> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State { attachments: BTreeMap::new(), sris: BTreeMap::new() }),
                listeners: RwLock::new(Listeners {
                    attach: None,
                    detach: None,
                    new_stream: None,
                    sri_changed: None,
                }),
                comparator: RwLock::new(Arc::new(DefaultComparator)),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn set_attach_listener(
        &self,
        listener: impl Fn(&D, &str) -> Result<Option<String>> + Send + Sync + 'static,
    ) {
        self.inner.listeners.write().attach = Some(Arc::new(listener));
    }

    pub fn set_detach_listener(&self, listener: impl Fn(&str) -> Result<()> + Send + Sync + 'static) {
        self.inner.listeners.write().detach = Some(Arc::new(listener));
    }

    pub fn set_new_stream_listener(&self, listener: impl Fn(&StreamSri) + Send + Sync + 'static) {
        self.inner.listeners.write().new_stream = Some(Arc::new(listener));
    }

    pub fn set_sri_change_listener(&self, listener: impl Fn(&StreamSri) + Send + Sync + 'static) {
        self.inner.listeners.write().sri_changed = Some(Arc::new(listener));
    }

    pub fn set_sri_comparator(&self, comparator: impl SriComparator + 'static) {
        *self.inner.comparator.write() = Arc::new(comparator);
    }

    /// Registers `definition` and returns its attach ID.
    ///
    /// The attach listener may choose the ID or reject the request; without
    /// one, or when it returns `None`, a random UUID is used.
    pub fn attach(&self, definition: D, user_id: &str) -> Result<String> {
        let listener = self.inner.listeners.read().attach.clone();
        let chosen = match listener {
            Some(listener) => match guarded(&self.inner.name, "attach", || listener(&definition, user_id)) {
                Some(Ok(chosen)) => chosen,
                Some(Err(error)) => return Err(PortError::attach_failed(error.to_string())),
                None => return Err(PortError::attach_failed("attach listener panicked")),
            },
            None => None,
        };
        let attach_id = chosen.unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut state = self.inner.state.lock();
        if state.attachments.contains_key(&attach_id) {
            return Err(PortError::attach_failed(format!("attach ID {attach_id} already in use")));
        }
        debug!(port = %self.inner.name, attach_id, stream_id = definition.id(), user_id, "Attached");
        state
            .attachments
            .insert(attach_id.clone(), Attachment { definition, user_id: user_id.to_string() });
        Ok(attach_id)
    }

    pub fn detach(&self, attach_id: &str) -> Result<()> {
        if !self.inner.state.lock().attachments.contains_key(attach_id) {
            return Err(PortError::detach_failed(attach_id, "unknown attach ID"));
        }
        let listener = self.inner.listeners.read().detach.clone();
        if let Some(listener) = listener {
            match guarded(&self.inner.name, "detach", || listener(attach_id)) {
                Some(Ok(())) => {}
                Some(Err(error)) => return Err(PortError::detach_failed(attach_id, error.to_string())),
                None => return Err(PortError::detach_failed(attach_id, "detach listener panicked")),
            }
        }
        if self.inner.state.lock().attachments.remove(attach_id).is_none() {
            return Err(PortError::detach_failed(attach_id, "detached concurrently"));
        }
        debug!(port = %self.inner.name, attach_id, "Detached");
        Ok(())
    }

    /// Stores the SRI, firing the new-stream or SRI-change listener first.
    pub fn push_sri(&self, sri: StreamSri, time: PrecisionUtcTime) {
        let stored = self.inner.state.lock().sris.get(&sri.stream_id).map(|(stored, _)| stored.clone());
        let listeners = self.inner.listeners.read();
        let (listener, name) = match &stored {
            None => (listeners.new_stream.clone(), "new_stream"),
            Some(stored) if !self.inner.comparator.read().same(stored, &sri) => {
                (listeners.sri_changed.clone(), "sri_changed")
            }
            Some(_) => (None, ""),
        };
        drop(listeners);
        if let Some(listener) = listener {
            guarded(&self.inner.name, name, || listener(&sri));
        }
        self.inner.state.lock().sris.insert(sri.stream_id.clone(), (sri, time));
    }

    pub fn attachment_ids(&self) -> Vec<String> {
        self.inner.state.lock().attachments.keys().cloned().collect()
    }

    pub fn definition(&self, attach_id: &str) -> Option<D> {
        self.inner.state.lock().attachments.get(attach_id).map(|a| a.definition.clone())
    }

    pub fn user_id(&self, attach_id: &str) -> Option<String> {
        self.inner.state.lock().attachments.get(attach_id).map(|a| a.user_id.clone())
    }

    pub fn active_sris(&self) -> Vec<StreamSri> {
        self.inner.state.lock().sris.values().map(|(sri, _)| sri.clone()).collect()
    }

    /// Idle with no attachments, busy with one, active with more.
    pub fn usage_state(&self) -> UsageState {
        match self.inner.state.lock().attachments.len() {
            0 => UsageState::Idle,
            1 => UsageState::Busy,
            _ => UsageState::Active,
        }
    }
}

impl<D: StreamDefinition> AttachablePeer<D> for InAttachablePort<D> {
    fn attach(&self, definition: &D, user_id: &str) -> Result<String, TransportError> {
        InAttachablePort::attach(self, definition.clone(), user_id)
            .map_err(|error| TransportError::SystemError(error.to_string()))
    }

    fn detach(&self, attach_id: &str) -> Result<(), TransportError> {
        InAttachablePort::detach(self, attach_id).map_err(|error| TransportError::SystemError(error.to_string()))
    }

    fn push_sri(&self, sri: &StreamSri, time: PrecisionUtcTime) -> Result<(), TransportError> {
        InAttachablePort::push_sri(self, sri.clone(), time);
        Ok(())
    }
}

impl<D> std::fmt::Debug for InAttachablePort<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InAttachablePort").field("name", &self.inner.name).finish()
    }
}
