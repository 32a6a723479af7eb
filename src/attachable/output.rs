//! Sending end of attachable connections.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::definition::StreamDefinition;
use super::peer::AttachablePeer;
use crate::error::{PortError, Result, TransportError};
use crate::filter::FilterTable;
use crate::stats::ERROR_LOG_THRESHOLD;
use crate::types::{PrecisionUtcTime, StreamSri, UsageState};

struct Link<D> {
    id: String,
    peer: Arc<dyn AttachablePeer<D>>,
    /// Consecutive failed calls; reset by any success.
    errors: u64,
}

impl<D: StreamDefinition> Link<D> {
    fn new(id: &str, peer: Arc<dyn AttachablePeer<D>>) -> Self {
        Self { id: id.to_string(), peer, errors: 0 }
    }

    fn failed(&mut self, port: &str, stream_id: &str, call: &'static str, error: &TransportError) {
        self.errors += 1;
        if self.errors <= ERROR_LOG_THRESHOLD {
            warn!(port, connection_id = %self.id, stream_id, call, %error, "Attachable call failed");
        }
    }

    /// Returns true once the peer holds the SRI.
    fn push_sri(&mut self, port: &str, cached: &mut CachedSri) -> bool {
        match self.peer.push_sri(&cached.sri, cached.time) {
            Ok(()) => {
                self.errors = 0;
                cached.pushed.insert(self.id.clone());
                true
            }
            Err(error) => {
                self.failed(port, &cached.sri.stream_id, "push_sri", &error);
                false
            }
        }
    }

    fn attach(&mut self, port: &str, stream: &mut AttachedStream<D>) {
        match self.peer.attach(&stream.definition, &stream.user_id) {
            Ok(attach_id) => {
                self.errors = 0;
                debug!(port, connection_id = %self.id, attach_id, stream_id = stream.definition.id(), "Stream attached");
                stream.attachments.insert(self.id.clone(), attach_id);
            }
            Err(error) => self.failed(port, stream.definition.id(), "attach", &error),
        }
    }

    /// Delivers any missing SRI, then attaches the stream.
    ///
    /// The attach is held back while the peer lacks a cached SRI; the next
    /// successful SRI push, filter update or reconnect completes it.
    fn establish(&mut self, port: &str, stream: &mut AttachedStream<D>, sri: Option<&mut CachedSri>) {
        if let Some(cached) = sri.filter(|cached| !cached.pushed.contains(&self.id)) {
            if !self.push_sri(port, cached) {
                debug!(port, connection_id = %self.id, stream_id = stream.definition.id(), "Attach deferred until SRI is delivered");
                return;
            }
        }
        self.attach(port, stream);
    }

    fn teardown(&mut self, port: &str, stream: &mut AttachedStream<D>) {
        if let Some(attach_id) = stream.attachments.remove(&self.id) {
            match self.peer.detach(&attach_id) {
                Ok(()) => debug!(port, connection_id = %self.id, attach_id, "Stream detached"),
                Err(error) => self.failed(port, stream.definition.id(), "detach", &error),
            }
        }
    }
}

struct AttachedStream<D> {
    definition: D,
    user_id: String,
    /// Connection ID to the attach ID the peer returned.
    attachments: BTreeMap<String, String>,
}

struct CachedSri {
    sri: StreamSri,
    time: PrecisionUtcTime,
    pushed: HashSet<String>,
}

struct State<D> {
    links: Vec<Link<D>>,
    streams: BTreeMap<String, AttachedStream<D>>,
    sris: BTreeMap<String, CachedSri>,
    filter: FilterTable,
}

/// Output port that attaches stream definitions to its connections.
///
/// Each stream is attached once per entitled connection, following the
/// same filter rules as [`OutputPort`](crate::OutputPort).
pub struct OutAttachablePort<D> {
    name: String,
    user_id: String,
    state: Mutex<State<D>>,
}

impl<D: StreamDefinition> OutAttachablePort<D> {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            user_id: name.clone(),
            name,
            state: Mutex::new(State {
                links: Vec::new(),
                streams: BTreeMap::new(),
                sris: BTreeMap::new(),
                filter: FilterTable::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// User ID sent with streams added by [`add_stream`](Self::add_stream); the port name by default.
    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = user_id.into();
    }

    pub fn connect_port(&self, peer: impl AttachablePeer<D> + 'static, connection_id: &str) -> Result<()> {
        if connection_id.is_empty() {
            return Err(PortError::invalid_port(connection_id, "connection ID is empty"));
        }
        if peer.repo_id() != D::REPO_ID {
            return Err(PortError::invalid_port(
                connection_id,
                format!("peer accepts {}, port sends {}", peer.repo_id(), D::REPO_ID),
            ));
        }
        let name = self.name.as_str();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.links.iter().any(|link| link.id == connection_id) {
            return Err(PortError::occupied_port(connection_id));
        }
        let mut link = Link::new(connection_id, Arc::new(peer));
        for (stream_id, stream) in state.streams.iter_mut() {
            if state.filter.allows(name, connection_id, stream_id) {
                link.establish(name, stream, state.sris.get_mut(stream_id));
            }
        }
        state.links.push(link);
        info!(port = name, connection_id, "Attachable connection established");
        Ok(())
    }

    /// Detaches every stream from the connection and removes it.
    pub fn disconnect_port(&self, connection_id: &str) -> Result<()> {
        let name = self.name.as_str();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(index) = state.links.iter().position(|link| link.id == connection_id) else {
            return Err(PortError::invalid_port(connection_id, "no such connection"));
        };
        let mut link = state.links.remove(index);
        for stream in state.streams.values_mut() {
            link.teardown(name, stream);
        }
        for cached in state.sris.values_mut() {
            cached.pushed.remove(connection_id);
        }
        info!(port = name, connection_id, "Attachable connection removed");
        Ok(())
    }

    pub fn connections(&self) -> Vec<String> {
        self.state.lock().links.iter().map(|link| link.id.clone()).collect()
    }

    /// Replaces the filter table, detaching streams from connections that
    /// lost them and attaching streams to connections that gained them.
    pub fn update_connection_filter(&self, filter: FilterTable) {
        let name = self.name.as_str();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let previous = std::mem::replace(&mut state.filter, filter);
        for link in state.links.iter_mut() {
            for (stream_id, stream) in state.streams.iter_mut() {
                let was = previous.allows(name, &link.id, stream_id);
                let now = state.filter.allows(name, &link.id, stream_id);
                if was && !now {
                    link.teardown(name, stream);
                    if let Some(cached) = state.sris.get_mut(stream_id) {
                        cached.pushed.remove(&link.id);
                    }
                } else if now && !stream.attachments.contains_key(&link.id) {
                    link.establish(name, stream, state.sris.get_mut(stream_id));
                }
            }
        }
    }

    /// Caches `sri` and delivers it to every entitled connection, attaching
    /// the stream to connections that were waiting for it.
    pub fn push_sri(&self, sri: StreamSri, time: PrecisionUtcTime) {
        let name = self.name.as_str();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let stream_id = sri.stream_id.clone();
        let cached = state.sris.entry(stream_id.clone()).or_insert_with(|| CachedSri {
            sri: sri.clone(),
            time,
            pushed: HashSet::new(),
        });
        cached.sri = sri;
        cached.time = time;
        cached.pushed.clear();
        for link in state.links.iter_mut() {
            if !state.filter.allows(name, &link.id, &stream_id) || !link.push_sri(name, cached) {
                continue;
            }
            if let Some(stream) = state.streams.get_mut(&stream_id) {
                if !stream.attachments.contains_key(&link.id) {
                    link.attach(name, stream);
                }
            }
        }
    }

    fn insert_stream(&self, state: &mut State<D>, definition: D, user_id: &str) -> Vec<String> {
        let name = self.name.as_str();
        let stream_id = definition.id().to_string();
        let mut stream = AttachedStream { definition, user_id: user_id.to_string(), attachments: BTreeMap::new() };
        for link in state.links.iter_mut() {
            if state.filter.allows(name, &link.id, &stream_id) {
                link.establish(name, &mut stream, state.sris.get_mut(&stream_id));
            }
        }
        let attach_ids = stream.attachments.values().cloned().collect();
        state.streams.insert(stream_id, stream);
        attach_ids
    }

    fn remove_attachments(&self, state: &mut State<D>, stream_id: &str) -> Option<AttachedStream<D>> {
        let mut stream = state.streams.remove(stream_id)?;
        for link in state.links.iter_mut() {
            link.teardown(&self.name, &mut stream);
        }
        Some(stream)
    }

    /// Adds a stream under this port's user ID and attaches it to every entitled connection.
    pub fn add_stream(&self, definition: D) -> Result<()> {
        self.attach(definition, &self.user_id).map(|_| ())
    }

    /// Adds a stream and returns the attach IDs the connections reported.
    pub fn attach(&self, definition: D, user_id: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        if state.streams.contains_key(definition.id()) {
            return Err(PortError::StreamInput { reason: format!("stream {} already exists", definition.id()) });
        }
        Ok(self.insert_stream(&mut state, definition, user_id))
    }

    /// Detaches a stream from every connection and forgets it.
    pub fn remove_stream(&self, stream_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        self.remove_attachments(&mut state, stream_id)
            .map(|_| ())
            .ok_or_else(|| PortError::StreamInput { reason: format!("no stream {stream_id}") })
    }

    /// Replaces a stream's definition, detaching and re-attaching it under one lock.
    pub fn update_stream(&self, definition: D) -> Result<()> {
        let mut state = self.state.lock();
        let Some(previous) = self.remove_attachments(&mut state, definition.id()) else {
            return Err(PortError::StreamInput { reason: format!("no stream {}", definition.id()) });
        };
        self.insert_stream(&mut state, definition, &previous.user_id);
        Ok(())
    }

    /// Removes one attachment by the ID its connection reported.
    pub fn detach(&self, attach_id: &str) -> Result<()> {
        let name = self.name.as_str();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        for stream in state.streams.values_mut() {
            let Some(connection_id) = stream
                .attachments
                .iter()
                .find(|(_, id)| id.as_str() == attach_id)
                .map(|(connection_id, _)| connection_id.clone())
            else {
                continue;
            };
            if let Some(link) = state.links.iter_mut().find(|link| link.id == connection_id) {
                link.teardown(name, stream);
            } else {
                stream.attachments.remove(&connection_id);
            }
            return Ok(());
        }
        Err(PortError::detach_failed(attach_id, "unknown attach ID"))
    }

    pub fn streams(&self) -> Vec<D> {
        self.state.lock().streams.values().map(|stream| stream.definition.clone()).collect()
    }

    pub fn attachment_ids(&self, stream_id: &str) -> Vec<String> {
        self.state.lock()
            .streams
            .get(stream_id)
            .map(|stream| stream.attachments.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn active_sris(&self) -> Vec<StreamSri> {
        self.state.lock().sris.values().map(|cached| cached.sri.clone()).collect()
    }

    /// Active while any stream is attached anywhere, otherwise idle.
    pub fn usage_state(&self) -> UsageState {
        let state = self.state.lock();
        if state.streams.values().any(|stream| !stream.attachments.is_empty()) {
            UsageState::Active
        } else {
            UsageState::Idle
        }
    }
}

impl<D> std::fmt::Debug for OutAttachablePort<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutAttachablePort").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachable::SddsStreamDefinition;
    use crate::filter::ConnectionFilter;
    use crate::test_utils::{AttachEvent, RecordingAttachPeer};
    use crate::types::sri;

    fn definition(id: &str, port: u16) -> SddsStreamDefinition {
        SddsStreamDefinition { id: id.to_string(), port, ..Default::default() }
    }

    fn port() -> OutAttachablePort<SddsStreamDefinition> {
        OutAttachablePort::new("dataSDDS_out")
    }

    #[test]
    fn streams_attach_to_existing_and_new_connections() {
        let port = port();
        let a = Arc::new(RecordingAttachPeer::new("a"));
        port.connect_port(Arc::clone(&a), "a").unwrap();
        assert_eq!(port.usage_state(), UsageState::Idle);
        let ids = port.attach(definition("s1", 1), "user").unwrap();
        assert_eq!(ids, vec!["a-0"]);

        let b = Arc::new(RecordingAttachPeer::new("b"));
        port.connect_port(Arc::clone(&b), "b").unwrap();
        assert_eq!(b.attached(), vec!["b-0"]);
        assert_eq!(port.attachment_ids("s1").len(), 2);
        assert_eq!(port.usage_state(), UsageState::Active);
    }

    #[test]
    fn sri_precedes_attach_on_late_connection() {
        let port = port();
        port.push_sri(sri::create("s1", 1.0), PrecisionUtcTime::now());
        port.add_stream(definition("s1", 1)).unwrap();
        let late = Arc::new(RecordingAttachPeer::new("late"));
        port.connect_port(Arc::clone(&late), "late").unwrap();
        let events = late.events();
        assert!(matches!(events[0], AttachEvent::Sri(_)));
        assert!(matches!(events[1], AttachEvent::Attach { .. }));
    }

    #[test]
    fn duplicate_and_unknown_streams_error() {
        let port = port();
        port.add_stream(definition("s1", 1)).unwrap();
        assert!(matches!(port.add_stream(definition("s1", 2)), Err(PortError::StreamInput { .. })));
        assert!(matches!(port.remove_stream("s2"), Err(PortError::StreamInput { .. })));
        assert!(matches!(port.update_stream(definition("s2", 1)), Err(PortError::StreamInput { .. })));
        assert!(matches!(port.detach("missing"), Err(PortError::Detach { .. })));
    }

    #[test]
    fn update_stream_reattaches() {
        let port = port();
        let peer = Arc::new(RecordingAttachPeer::new("p"));
        port.connect_port(Arc::clone(&peer), "c1").unwrap();
        port.add_stream(definition("s1", 1)).unwrap();
        port.update_stream(definition("s1", 2)).unwrap();
        assert_eq!(peer.attached(), vec!["p-1"]);
        assert_eq!(port.streams()[0].port, 2);
    }

    #[test]
    fn filter_change_detaches_and_attaches() {
        let port = port();
        let a = Arc::new(RecordingAttachPeer::new("a"));
        let b = Arc::new(RecordingAttachPeer::new("b"));
        port.connect_port(Arc::clone(&a), "a").unwrap();
        port.connect_port(Arc::clone(&b), "b").unwrap();
        port.add_stream(definition("s1", 1)).unwrap();

        port.update_connection_filter(FilterTable::new(vec![ConnectionFilter::new("dataSDDS_out", "b", "s1")]));
        assert!(a.attached().is_empty());
        assert_eq!(b.attached().len(), 1);

        port.update_connection_filter(FilterTable::default());
        assert_eq!(a.attached().len(), 1);
        assert_eq!(b.attached().len(), 1);
    }

    #[test]
    fn detach_and_disconnect() {
        let port = port();
        let peer = Arc::new(RecordingAttachPeer::new("p"));
        port.connect_port(Arc::clone(&peer), "c1").unwrap();
        let ids = port.attach(definition("s1", 1), "user").unwrap();
        port.detach(&ids[0]).unwrap();
        assert!(peer.attached().is_empty());
        assert_eq!(port.usage_state(), UsageState::Idle);

        port.add_stream(definition("s2", 1)).unwrap();
        port.disconnect_port("c1").unwrap();
        assert!(peer.attached().is_empty());
        assert!(port.connections().is_empty());
    }

    #[test]
    fn attach_waits_for_sri_delivery() {
        let port = port();
        port.push_sri(sri::create("s1", 1.0), PrecisionUtcTime::now());
        let peer = Arc::new(RecordingAttachPeer::new("x"));
        peer.set_sri_failing(true);
        port.connect_port(Arc::clone(&peer), "c1").unwrap();

        assert!(port.attach(definition("s1", 1), "user").unwrap().is_empty());
        assert!(peer.events().is_empty());
        assert_eq!(port.usage_state(), UsageState::Idle);

        peer.set_sri_failing(false);
        port.push_sri(sri::create("s1", 2.0), PrecisionUtcTime::now());
        let events = peer.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], AttachEvent::Sri(pushed) if pushed.xdelta == 0.5));
        assert!(matches!(&events[1], AttachEvent::Attach { stream_id, .. } if stream_id == "s1"));
        assert_eq!(port.attachment_ids("s1"), vec!["x-0"]);
    }

    #[test]
    fn stream_without_sri_attaches_immediately() {
        let port = port();
        let peer = Arc::new(RecordingAttachPeer::new("x"));
        peer.set_sri_failing(true);
        port.connect_port(Arc::clone(&peer), "c1").unwrap();
        assert_eq!(port.attach(definition("s1", 1), "user").unwrap(), vec!["x-0"]);
    }

    #[test]
    fn failed_attach_is_isolated() {
        let port = port();
        let broken = Arc::new(RecordingAttachPeer::new("x"));
        let healthy = Arc::new(RecordingAttachPeer::new("h"));
        broken.set_failing(true);
        port.connect_port(Arc::clone(&broken), "x").unwrap();
        port.connect_port(Arc::clone(&healthy), "h").unwrap();
        let ids = port.attach(definition("s1", 1), "user").unwrap();
        assert_eq!(ids, vec!["h-0"]);
    }
}
