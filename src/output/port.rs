//! Fan-out of SRI and packets to connected peers.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, trace, warn};

use super::peer::PortPeer;
use super::stream::OutputStream;
use crate::config::PortConfig;
use crate::error::{PortError, Result, TransportError};
use crate::filter::FilterTable;
use crate::input::InputPort;
use crate::output::LocalPeer;
use crate::pool::BufferPool;
use crate::stats::{ConnectionStatistics, ERROR_LOG_THRESHOLD, LinkStatistics};
use crate::listener::guarded;
use crate::types::{PrecisionUtcTime, SampleBuffer, StreamSri, UsageState, sri};

/// Listener invoked with a connection ID.
pub type ConnectionListener = Arc<dyn Fn(&str) + Send + Sync>;

struct Connection<B> {
    id: String,
    peer: Arc<dyn PortPeer<B>>,
    stats: Arc<Mutex<LinkStatistics>>,
}

impl<B: SampleBuffer> Connection<B> {
    fn deliver_sri(&self, port: &str, sri: &StreamSri) -> bool {
        match self.peer.push_sri(sri) {
            Ok(()) => {
                self.stats.lock().reset_connection_errors();
                trace!(port, connection_id = %self.id, stream_id = %sri.stream_id, "SRI delivered");
                true
            }
            Err(error) => {
                self.failed(port, &sri.stream_id, "push_sri", &error);
                false
            }
        }
    }

    fn deliver_packet(&self, port: &str, data: &B, time: PrecisionUtcTime, eos: bool, stream_id: &str) {
        match self.peer.push_packet(data, time, eos, stream_id) {
            Ok(()) => self.stats.lock().update(data.len(), 0.0, eos, stream_id, false),
            Err(error) => self.failed(port, stream_id, "push_packet", &error),
        }
    }

    fn failed(&self, port: &str, stream_id: &str, call: &'static str, error: &TransportError) {
        let count = self.stats.lock().connection_errors(1);
        if count <= ERROR_LOG_THRESHOLD {
            warn!(port, connection_id = %self.id, stream_id, call, %error, "Delivery failed");
        } else if count == ERROR_LOG_THRESHOLD + 1 {
            debug!(port, connection_id = %self.id, "Suppressing further delivery failures");
        }
    }
}

/// Last SRI pushed for a stream and the connections that have it.
struct CachedStream {
    sri: StreamSri,
    time: PrecisionUtcTime,
    pushed: HashSet<String>,
}

impl CachedStream {
    fn new(sri: StreamSri, time: PrecisionUtcTime) -> Self {
        Self { sri, time, pushed: HashSet::new() }
    }
}

struct Router<B> {
    connections: Vec<Connection<B>>,
    streams: BTreeMap<String, CachedStream>,
    filter: FilterTable,
    stats_enabled: bool,
    bit_size: f64,
}

#[derive(Default)]
struct Listeners {
    connect: Option<ConnectionListener>,
    disconnect: Option<ConnectionListener>,
}

struct Inner<B> {
    name: String,
    history_window: usize,
    max_payload_bytes: usize,
    router: Mutex<Router<B>>,
    listeners: RwLock<Listeners>,
    state: watch::Sender<UsageState>,
    pool: BufferPool<B>,
}

/// Sending end of a data connection.
///
/// Every push is routed through the connection filter: with no entries for
/// this port, all connections receive every stream; otherwise each stream
/// goes only to the connections listed for it. A connection that has not
/// yet seen a stream's current SRI receives it before the next packet.
///
/// ```rust
/// use bulkio::{InputPort, OutputPort, PrecisionUtcTime, Wait, sri};
///
/// let output = OutputPort::<Vec<f64>>::new("dataDouble_out");
/// let input = InputPort::<Vec<f64>>::new("dataDouble_in");
/// output.connect_local(&input, "c1").unwrap();
///
/// output.push_sri(sri::create("s1", 8.0), PrecisionUtcTime::now());
/// output.push_packet(vec![0.5; 16], PrecisionUtcTime::now(), false, "s1");
///
/// let packet = input.get_packet(Wait::NonBlocking).unwrap();
/// assert_eq!(packet.sri.xdelta, 0.125);
/// ```
pub struct OutputPort<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for OutputPort<B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<B: SampleBuffer> OutputPort<B> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, &PortConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: &PortConfig) -> Self {
        let (state, _) = watch::channel(UsageState::Idle);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                history_window: config.history_window,
                max_payload_bytes: config.max_payload_bytes,
                router: Mutex::new(Router {
                    connections: Vec::new(),
                    streams: BTreeMap::new(),
                    filter: FilterTable::default(),
                    stats_enabled: config.enable_stats,
                    bit_size: config.bit_size.unwrap_or(B::BITS_PER_ELEMENT as f64),
                }),
                listeners: RwLock::new(Listeners::default()),
                state,
                pool: BufferPool::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn repo_id(&self) -> &'static str {
        B::REPO_ID
    }

    pub fn set_connect_listener(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.listeners.write().connect = Some(Arc::new(listener));
    }

    pub fn set_disconnect_listener(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.listeners.write().disconnect = Some(Arc::new(listener));
    }

    /// Pool that stream writers draw their buffers from.
    pub fn buffer_pool(&self) -> &BufferPool<B> {
        &self.inner.pool
    }

    pub fn usage_state(&self) -> UsageState {
        *self.inner.state.borrow()
    }

    /// Usage state changes as a stream, starting with the current state.
    pub fn state_updates(&self) -> WatchStream<UsageState> {
        WatchStream::new(self.inner.state.subscribe())
    }

    /// IDs of live connections in connection order.
    pub fn connections(&self) -> Vec<String> {
        self.inner.router.lock().connections.iter().map(|c| c.id.clone()).collect()
    }

    pub fn active_sris(&self) -> Vec<StreamSri> {
        self.inner.router.lock().streams.values().map(|entry| entry.sri.clone()).collect()
    }

    pub fn current_sri(&self, stream_id: &str) -> Option<StreamSri> {
        self.inner.router.lock().streams.get(stream_id).map(|entry| entry.sri.clone())
    }

    fn notify(&self, listener: Option<ConnectionListener>, name: &'static str, connection_id: &str) {
        if let Some(listener) = listener {
            guarded(&self.inner.name, name, || listener(connection_id));
        }
    }

    /// Adds a connection and delivers the SRI of every stream it is entitled to.
    pub fn connect_port(&self, peer: impl PortPeer<B> + 'static, connection_id: &str) -> Result<()> {
        if connection_id.is_empty() {
            return Err(PortError::invalid_port(connection_id, "connection ID is empty"));
        }
        if peer.repo_id() != B::REPO_ID {
            return Err(PortError::invalid_port(
                connection_id,
                format!("peer accepts {}, port sends {}", peer.repo_id(), B::REPO_ID),
            ));
        }

        let name = self.inner.name.as_str();
        {
            let mut guard = self.inner.router.lock();
            let router = &mut *guard;
            if router.connections.iter().any(|c| c.id == connection_id) {
                return Err(PortError::occupied_port(connection_id));
            }
            let mut stats = LinkStatistics::with_history_window(name, router.bit_size, self.inner.history_window);
            stats.enable(router.stats_enabled);
            let connection = Connection {
                id: connection_id.to_string(),
                peer: Arc::new(peer),
                stats: Arc::new(Mutex::new(stats)),
            };
            for (stream_id, entry) in router.streams.iter_mut() {
                if router.filter.allows(name, connection_id, stream_id) && connection.deliver_sri(name, &entry.sri) {
                    entry.pushed.insert(connection.id.clone());
                }
            }
            router.connections.push(connection);
        }

        info!(port = name, connection_id, "Connection established");
        self.inner.state.send_replace(UsageState::Active);
        let listener = self.inner.listeners.read().connect.clone();
        self.notify(listener, "connect", connection_id);
        Ok(())
    }

    /// Connects an in-process input port.
    pub fn connect_local(&self, port: &InputPort<B>, connection_id: &str) -> Result<()> {
        self.connect_port(LocalPeer::new(port.clone()), connection_id)
    }

    /// Removes a connection, first ending every stream it had received.
    pub fn disconnect_port(&self, connection_id: &str) -> Result<()> {
        let name = self.inner.name.as_str();
        let remaining = {
            let mut guard = self.inner.router.lock();
            let router = &mut *guard;
            let Some(index) = router.connections.iter().position(|c| c.id == connection_id) else {
                return Err(PortError::invalid_port(connection_id, "no such connection"));
            };
            let connection = router.connections.remove(index);
            for (stream_id, entry) in router.streams.iter_mut() {
                if entry.pushed.remove(connection_id) {
                    connection.deliver_packet(name, &B::default(), entry.time, true, stream_id);
                }
            }
            router.connections.len()
        };

        info!(port = name, connection_id, "Connection removed");
        if remaining == 0 {
            self.inner.state.send_replace(UsageState::Idle);
        }
        let listener = self.inner.listeners.read().disconnect.clone();
        self.notify(listener, "disconnect", connection_id);
        Ok(())
    }

    pub fn connection_filter(&self) -> FilterTable {
        self.inner.router.lock().filter.clone()
    }

    /// Replaces the filter table, ending streams on connections that lost
    /// them and delivering SRI to connections that gained them.
    pub fn update_connection_filter(&self, filter: FilterTable) {
        let name = self.inner.name.as_str();
        let mut guard = self.inner.router.lock();
        let router = &mut *guard;
        let previous = std::mem::replace(&mut router.filter, filter);
        for connection in &router.connections {
            for (stream_id, entry) in router.streams.iter_mut() {
                let was = previous.allows(name, &connection.id, stream_id);
                let now = router.filter.allows(name, &connection.id, stream_id);
                if was && !now && entry.pushed.remove(&connection.id) {
                    debug!(port = name, connection_id = %connection.id, stream_id, "Stream unrouted");
                    connection.deliver_packet(name, &B::default(), entry.time, true, stream_id);
                } else if now && !entry.pushed.contains(&connection.id) && connection.deliver_sri(name, &entry.sri) {
                    debug!(port = name, connection_id = %connection.id, stream_id, "Stream routed");
                    entry.pushed.insert(connection.id.clone());
                }
            }
        }
    }

    /// Caches `sri` and delivers it to every entitled connection.
    pub fn push_sri(&self, sri: StreamSri, time: PrecisionUtcTime) {
        let name = self.inner.name.as_str();
        let mut guard = self.inner.router.lock();
        let router = &mut *guard;
        let stream_id = sri.stream_id.clone();
        let entry = router
            .streams
            .entry(stream_id.clone())
            .and_modify(|entry| {
                entry.sri = sri.clone();
                entry.time = time;
                entry.pushed.clear();
            })
            .or_insert_with(|| CachedStream::new(sri, time));
        for connection in &router.connections {
            if router.filter.allows(name, &connection.id, &stream_id) && connection.deliver_sri(name, &entry.sri) {
                entry.pushed.insert(connection.id.clone());
            }
        }
    }

    /// Elements per packet allowed by the payload limit.
    fn chunk_len(&self, sri: &StreamSri) -> usize {
        let bits = self.inner.max_payload_bytes.saturating_mul(8);
        let mut elements = (bits / B::BITS_PER_ELEMENT.max(1)).max(1);
        if sri.is_complex() && elements > 1 {
            elements -= elements % 2;
        }
        elements
    }

    /// Sends `data` to every entitled connection.
    ///
    /// A stream with no SRI gets a default one. Payloads above the
    /// configured size limit go out as several packets with advancing
    /// timestamps; only the last carries `eos`. An EOS drops the stream
    /// from the SRI cache.
    pub fn push_packet(&self, data: B, time: PrecisionUtcTime, eos: bool, stream_id: &str) {
        let name = self.inner.name.as_str();
        let mut guard = self.inner.router.lock();
        let router = &mut *guard;
        let entry = router.streams.entry(stream_id.to_string()).or_insert_with(|| {
            debug!(port = name, stream_id, "Pushing data without SRI; using default");
            CachedStream::new(sri::create(stream_id, 1.0), time)
        });

        let limit = self.chunk_len(&entry.sri);
        let pieces: Vec<(Option<B>, PrecisionUtcTime, bool)> = if data.len() <= limit || !B::SPLITTABLE {
            vec![(None, time, eos)]
        } else {
            let per_sample = if entry.sri.is_complex() { 2 } else { 1 };
            (0..data.len())
                .step_by(limit)
                .map(|start| {
                    let end = (start + limit).min(data.len());
                    let at = time + (start / per_sample) as f64 * entry.sri.xdelta;
                    (Some(data.slice(start..end)), at, eos && end == data.len())
                })
                .collect()
        };

        for connection in &router.connections {
            if !router.filter.allows(name, &connection.id, stream_id) {
                continue;
            }
            if !entry.pushed.contains(&connection.id) {
                if !connection.deliver_sri(name, &entry.sri) {
                    continue;
                }
                entry.pushed.insert(connection.id.clone());
            }
            for (piece, at, last) in &pieces {
                connection.deliver_packet(name, piece.as_ref().unwrap_or(&data), *at, *last, stream_id);
            }
        }

        if eos {
            trace!(port = name, stream_id, "Stream ended");
            router.streams.remove(stream_id);
        }
        drop(guard);
        self.inner.pool.release(data);
    }

    /// One snapshot per live connection.
    pub fn statistics(&self) -> Vec<ConnectionStatistics> {
        let stats: Vec<(String, Arc<Mutex<LinkStatistics>>)> = self.inner.router.lock()
            .connections
            .iter()
            .map(|c| (c.id.clone(), Arc::clone(&c.stats)))
            .collect();
        stats
            .into_iter()
            .map(|(connection_id, stats)| ConnectionStatistics {
                connection_id,
                statistics: stats.lock().retrieve(),
            })
            .collect()
    }

    pub fn enable_stats(&self, enabled: bool) {
        let mut router = self.inner.router.lock();
        router.stats_enabled = enabled;
        for connection in &router.connections {
            connection.stats.lock().enable(enabled);
        }
    }

    pub fn set_bit_size(&self, bit_size: f64) {
        let mut router = self.inner.router.lock();
        router.bit_size = bit_size;
        for connection in &router.connections {
            connection.stats.lock().set_bit_size(bit_size);
        }
    }

    /// Writer for `stream_id` whose SRI starts from the cached one, if any.
    pub fn create_stream(&self, stream_id: &str) -> OutputStream<B> {
        let sri = self.current_sri(stream_id).unwrap_or_else(|| sri::create(stream_id, 1.0));
        OutputStream::new(self.clone(), sri)
    }
}

impl<B> std::fmt::Debug for OutputPort<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputPort").field("name", &self.inner.name).finish()
    }
}
