//! Bounded input queue.

use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::Stream;
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use super::queue::{QueueState, Queued};
use super::stream::InputStream;
use crate::config::{PortConfig, QueueDepth};
use crate::pool::BufferPool;
use crate::stats::{LinkStatistics, PortStatistics};
use crate::listener::guarded;
use crate::types::{
    DataPacket, DefaultComparator, PrecisionUtcTime, SampleBuffer, SriComparator, StreamSri,
    UsageState, sri,
};

/// How long a read may wait for data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    NonBlocking,
    Blocking,
    Timeout(Duration),
}

impl Wait {
    pub(crate) fn deadline(&self) -> Option<Instant> {
        match self {
            Wait::Timeout(timeout) => Some(Instant::now() + *timeout),
            _ => None,
        }
    }
}

/// Listener invoked with a stream's SRI.
pub type SriListener = Arc<dyn Fn(&StreamSri) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    new_stream: Option<SriListener>,
    sri_changed: Option<SriListener>,
}

pub(super) struct Shared<B> {
    pub name: String,
    pub state: Mutex<QueueState<B>>,
    pub packet_ready: Condvar,
    pub queue_space: Condvar,
    pub notify: Notify,
    /// Serializes pushes across the listener phase, which runs unlocked.
    push_lock: Mutex<()>,
    comparator: RwLock<Arc<dyn SriComparator>>,
    listeners: RwLock<Listeners>,
    stats: Mutex<LinkStatistics>,
    pool: BufferPool<B>,
}

impl<B: SampleBuffer> Shared<B> {
    /// Wakes every waiter, blocking and async.
    pub fn wake_all(&self) {
        self.packet_ready.notify_all();
        self.queue_space.notify_all();
        self.notify.notify_waiters();
    }

    /// Waits for a push or wake-up. Returns true once `deadline` has passed.
    pub fn wait_ready(&self, state: &mut MutexGuard<'_, QueueState<B>>, deadline: Option<Instant>) -> bool {
        match deadline {
            Some(deadline) => self.packet_ready.wait_until(state, deadline).timed_out(),
            None => {
                self.packet_ready.wait(state);
                false
            }
        }
    }
}

/// Receiving end of a data connection.
///
/// Packets from any number of logical streams share one bounded FIFO. When
/// a push finds the queue full, queued data is dropped (EOS markers and SRI
/// changes survive) and the next packet carries `input_queue_flushed`. A
/// stream whose SRI sets `blocking` makes pushes wait for space instead.
///
/// The handle is cheap to clone; clones share the queue.
///
/// ```rust
/// use bulkio::{InputPort, PrecisionUtcTime, Wait, sri};
///
/// let port = InputPort::<Vec<f32>>::new("dataFloat_in");
/// port.push_sri(sri::create("s1", 2.0));
/// port.push_packet(vec![1.0, 2.0], PrecisionUtcTime::now(), false, "s1");
///
/// let packet = port.get_packet(Wait::NonBlocking).unwrap();
/// assert!(packet.sri_changed);
/// assert_eq!(packet.buffer, vec![1.0, 2.0]);
/// ```
pub struct InputPort<B> {
    pub(super) shared: Arc<Shared<B>>,
}

impl<B> Clone for InputPort<B> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<B: SampleBuffer> InputPort<B> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, &PortConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: &PortConfig) -> Self {
        let name = name.into();
        let bit_size = config.bit_size.unwrap_or(B::BITS_PER_ELEMENT as f64);
        let mut stats = LinkStatistics::with_history_window(&name, bit_size, config.history_window);
        stats.enable(config.enable_stats);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::new(config.max_queue_depth)),
                packet_ready: Condvar::new(),
                queue_space: Condvar::new(),
                notify: Notify::new(),
                push_lock: Mutex::new(()),
                comparator: RwLock::new(Arc::new(DefaultComparator)),
                listeners: RwLock::new(Listeners::default()),
                stats: Mutex::new(stats),
                pool: BufferPool::default(),
                name,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn repo_id(&self) -> &'static str {
        B::REPO_ID
    }

    /// Replaces the strategy deciding whether a pushed SRI changed.
    pub fn set_sri_comparator(&self, comparator: impl SriComparator + 'static) {
        *self.shared.comparator.write() = Arc::new(comparator);
    }

    /// Called with the SRI of each new stream before it becomes visible.
    pub fn set_new_stream_listener(&self, listener: impl Fn(&StreamSri) + Send + Sync + 'static) {
        self.shared.listeners.write().new_stream = Some(Arc::new(listener));
    }

    /// Called with the pushed SRI when it differs from the stored one, before the update is visible.
    pub fn set_sri_change_listener(&self, listener: impl Fn(&StreamSri) + Send + Sync + 'static) {
        self.shared.listeners.write().sri_changed = Some(Arc::new(listener));
    }

    pub fn max_queue_depth(&self) -> QueueDepth {
        self.shared.state.lock().max_depth
    }

    pub fn set_max_queue_depth(&self, depth: QueueDepth) {
        self.shared.state.lock().max_depth = depth;
        self.shared.queue_space.notify_all();
    }

    /// Number of packets waiting in the shared queue.
    pub fn queue_depth(&self) -> usize {
        self.shared.state.lock().packets.len()
    }

    pub fn usage_state(&self) -> UsageState {
        let state = self.shared.state.lock();
        if state.packets.is_empty() {
            UsageState::Idle
        } else if state.is_full() {
            UsageState::Busy
        } else {
            UsageState::Active
        }
    }

    /// Pool that incoming payloads may be copied into.
    pub fn buffer_pool(&self) -> &BufferPool<B> {
        &self.shared.pool
    }

    fn notify_listener(&self, listener: Option<SriListener>, name: &'static str, sri: &StreamSri) {
        if let Some(listener) = listener {
            guarded(&self.shared.name, name, || listener(sri));
        }
    }

    /// Stores the SRI for `sri.stream_id`.
    ///
    /// A new stream, or one whose EOS is already queued, starts a fresh
    /// stream and fires the new-stream listener. A known stream records the
    /// changed fields for its next packet and fires the SRI-change listener
    /// if the comparator reports a difference. The stored SRI is always
    /// replaced.
    pub fn push_sri(&self, sri: StreamSri) {
        let _push = self.shared.push_lock.lock();
        let known = {
            let state = self.shared.state.lock();
            state
                .latest(&sri.stream_id)
                .and_then(|generation| state.generations.get(&generation).map(|entry| (generation, entry)))
                .filter(|(_, entry)| !entry.eos_queued)
                .map(|(generation, entry)| (generation, entry.sri.clone()))
        };

        match known {
            None => {
                let listener = self.shared.listeners.read().new_stream.clone();
                self.notify_listener(listener, "new_stream", &sri);
                debug!(port = %self.shared.name, stream_id = %sri.stream_id, "New stream");
                self.shared.state.lock().open(sri);
            }
            Some((generation, stored)) => {
                let comparator = Arc::clone(&*self.shared.comparator.read());
                let changed = !comparator.same(&stored, &sri);
                if changed {
                    let listener = self.shared.listeners.read().sri_changed.clone();
                    self.notify_listener(listener, "sri_changed", &sri);
                }
                let flags = sri::compare_fields(&stored, &sri);
                let mut state = self.shared.state.lock();
                if let Some(entry) = state.generations.get_mut(&generation) {
                    if changed {
                        trace!(port = %self.shared.name, stream_id = %sri.stream_id, %flags, "SRI changed");
                        entry.pending = Some(entry.pending.unwrap_or_default() | flags);
                    }
                    entry.sri = sri;
                }
            }
        }
        self.shared.notify.notify_waiters();
    }

    /// Queues a packet for `stream_id`.
    ///
    /// Data for a stream with no SRI is queued under a default SRI, with a
    /// warning. An EOS for a stream never seen is queued but the stream is
    /// not registered.
    pub fn push_packet(&self, buffer: B, time: PrecisionUtcTime, eos: bool, stream_id: &str) {
        let _push = self.shared.push_lock.lock();
        let (latest, reopen) = {
            let state = self.shared.state.lock();
            let latest = state.latest(stream_id);
            let reopen = latest
                .and_then(|generation| state.generations.get(&generation))
                .filter(|entry| entry.eos_queued)
                .map(|entry| entry.sri.clone());
            (latest, reopen)
        };

        let generation = match (latest, reopen) {
            (Some(_), Some(sri)) => {
                debug!(port = %self.shared.name, stream_id, "Data after queued EOS starts a new stream");
                Some(self.shared.state.lock().open(sri))
            }
            (Some(generation), None) => Some(generation),
            (None, _) if eos => None,
            (None, _) => {
                warn!(port = %self.shared.name, stream_id, "Received data for stream without SRI");
                let sri = sri::create(stream_id, 1.0);
                let listener = self.shared.listeners.read().new_stream.clone();
                self.notify_listener(listener, "new_stream", &sri);
                Some(self.shared.state.lock().open(sri))
            }
        };

        let elements = buffer.len();
        let mut state = self.shared.state.lock();
        let mut flushed = false;
        loop {
            if let Some(generation) = generation {
                match state.generations.get(&generation).map(|entry| entry.enabled) {
                    Some(true) => {}
                    Some(false) => {
                        trace!(port = %self.shared.name, stream_id, "Dropping packet for disabled stream");
                        if eos {
                            state.retire(generation);
                        }
                        drop(state);
                        self.shared.pool.release(buffer);
                        return;
                    }
                    None => break,
                }
            }
            if !state.is_full() {
                break;
            }
            if state.blocking_active() && !state.blocked {
                trace!(port = %self.shared.name, stream_id, "Queue full, waiting for space");
                self.shared.queue_space.wait(&mut state);
                continue;
            }
            let dropped = state.flush();
            debug!(port = %self.shared.name, stream_id, dropped, "Input queue flushed");
            flushed = true;
            break;
        }

        let (generation, sri, pending) = match generation {
            Some(generation) => match state.generations.get_mut(&generation) {
                Some(entry) => {
                    if eos {
                        entry.eos_queued = true;
                    }
                    (generation, entry.sri.clone(), entry.pending.take())
                }
                None => (generation, sri::create(stream_id, 1.0), None),
            },
            None => (state.orphan(), sri::create(stream_id, 1.0), None),
        };

        let mut packet = DataPacket::new(buffer, time, eos, sri, pending.unwrap_or_default());
        packet.sri_changed = pending.is_some();
        packet.input_queue_flushed = flushed;
        state.packets.push_back(Queued { generation, packet });
        let depth = state.packets.len();
        let fill = state.max_depth.fill(depth);
        drop(state);

        trace!(port = %self.shared.name, stream_id, elements, eos, depth, "Packet queued");
        self.shared.stats.lock().update(elements, fill, eos, stream_id, flushed);
        self.shared.packet_ready.notify_all();
        self.shared.notify.notify_waiters();
    }

    /// Removes the packet at the head of the queue.
    ///
    /// Dequeuing an EOS ends its stream unless the stream ID was reused by
    /// a later push.
    pub fn get_packet(&self, wait_mode: Wait) -> Option<DataPacket<B>> {
        let deadline = wait_mode.deadline();
        let mut state = self.shared.state.lock();
        loop {
            if let Some(packet) = state.pop_front() {
                drop(state);
                self.shared.queue_space.notify_all();
                return Some(packet);
            }
            if state.blocked || wait_mode == Wait::NonBlocking {
                return None;
            }
            if self.shared.wait_ready(&mut state, deadline) {
                return state.pop_front().inspect(|_| { self.shared.queue_space.notify_all(); });
            }
        }
    }

    /// Waits asynchronously for the next packet; `None` once the port is blocked.
    pub async fn get_packet_async(&self) -> Option<DataPacket<B>> {
        loop {
            let mut notified = pin!(self.shared.notify.notified());
            notified.as_mut().enable();
            if let Some(packet) = self.get_packet(Wait::NonBlocking) {
                return Some(packet);
            }
            if self.is_blocked() {
                return None;
            }
            notified.await;
        }
    }

    /// Packets as an asynchronous stream, ending when the port is blocked.
    pub fn packet_stream(&self) -> impl Stream<Item = DataPacket<B>> + Send + 'static {
        futures::stream::unfold(self.clone(), |port| async move {
            let packet = port.get_packet_async().await?;
            Some((packet, port))
        })
    }

    /// Releases every waiting reader and makes waits return `None` until [`unblock`](Self::unblock).
    pub fn block(&self) {
        self.shared.state.lock().blocked = true;
        debug!(port = %self.shared.name, "Port blocked");
        self.shared.wake_all();
    }

    pub fn unblock(&self) {
        self.shared.state.lock().blocked = false;
        debug!(port = %self.shared.name, "Port unblocked");
    }

    pub fn is_blocked(&self) -> bool {
        self.shared.state.lock().blocked
    }

    /// Latest SRI of every registered stream, ordered by stream ID.
    pub fn active_sris(&self) -> Vec<StreamSri> {
        let state = self.shared.state.lock();
        let mut sris: Vec<StreamSri> = state
            .streams
            .values()
            .filter_map(|generation| state.generations.get(generation))
            .map(|entry| entry.sri.clone())
            .collect();
        sris.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        sris
    }

    fn cursor(&self, generation: u64, sri: StreamSri) -> InputStream<B> {
        InputStream::new(self.clone(), generation, sri)
    }

    /// Cursor over the oldest readable stream with this ID.
    pub fn get_stream(&self, stream_id: &str) -> Option<InputStream<B>> {
        let state = self.shared.state.lock();
        let generation = state.oldest(stream_id)?;
        let sri = state.generations.get(&generation)?.sri.clone();
        drop(state);
        Some(self.cursor(generation, sri))
    }

    /// Cursor for the stream the next queued data belongs to.
    pub fn get_current_stream(&self, wait_mode: Wait) -> Option<InputStream<B>> {
        let deadline = wait_mode.deadline();
        let mut state = self.shared.state.lock();
        loop {
            if let Some(generation) = state.current_generation() {
                let sri = state.generations.get(&generation)?.sri.clone();
                drop(state);
                return Some(self.cursor(generation, sri));
            }
            if state.blocked || wait_mode == Wait::NonBlocking {
                return None;
            }
            if self.shared.wait_ready(&mut state, deadline) {
                return None;
            }
        }
    }

    /// Cursors for every readable stream, oldest first.
    pub fn streams(&self) -> Vec<InputStream<B>> {
        let state = self.shared.state.lock();
        let cursors: Vec<(u64, StreamSri)> = state
            .generations
            .iter()
            .map(|(generation, entry)| (*generation, entry.sri.clone()))
            .collect();
        drop(state);
        cursors.into_iter().map(|(generation, sri)| self.cursor(generation, sri)).collect()
    }

    pub fn enable_stats(&self, enabled: bool) {
        self.shared.stats.lock().enable(enabled);
    }

    pub fn set_bit_size(&self, bit_size: f64) {
        self.shared.stats.lock().set_bit_size(bit_size);
    }

    pub fn statistics(&self) -> PortStatistics {
        self.shared.stats.lock().retrieve()
    }
}

impl<B> std::fmt::Debug for InputPort<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputPort").field("name", &self.shared.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SriChangeFlags;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn t0() -> PrecisionUtcTime {
        PrecisionUtcTime::new(1000.0, 0.0)
    }

    fn port(depth: usize) -> InputPort<Vec<f32>> {
        let config = PortConfig { max_queue_depth: QueueDepth::Limited(depth), ..Default::default() };
        InputPort::with_config("dataFloat_in", &config)
    }

    #[test]
    fn identical_sri_reports_no_change() {
        let port = port(10);
        port.push_sri(sri::create("s1", 2.0));
        port.push_packet(vec![0.0; 100], t0(), false, "s1");
        port.push_sri(sri::create("s1", 2.0));
        port.push_packet(vec![0.0; 100], t0(), false, "s1");

        let first = port.get_packet(Wait::NonBlocking).unwrap();
        let second = port.get_packet(Wait::NonBlocking).unwrap();
        assert!(first.sri_changed);
        assert!(!second.sri_changed);
        assert!(second.sri_change_flags.is_empty());
    }

    #[test]
    fn changed_field_sets_exact_flag() {
        let port = port(10);
        port.push_sri(sri::create("s1", 1.0));
        port.push_packet(vec![0.0], t0(), false, "s1");
        let mut changed = sri::create("s1", 1.0);
        changed.xdelta = 0.25;
        port.push_sri(changed);
        port.push_packet(vec![0.0], t0(), false, "s1");

        port.get_packet(Wait::NonBlocking).unwrap();
        let packet = port.get_packet(Wait::NonBlocking).unwrap();
        assert!(packet.sri_changed);
        assert_eq!(packet.sri_change_flags, SriChangeFlags::XDELTA);
        assert_eq!(packet.sri.xdelta, 0.25);
    }

    #[test]
    fn overflow_flushes_to_depth() {
        let port = port(1);
        port.push_sri(sri::create("s1", 1.0));
        port.push_packet(vec![1.0], t0(), false, "s1");
        port.push_packet(vec![2.0], t0(), false, "s1");
        assert_eq!(port.queue_depth(), 1);

        let packet = port.get_packet(Wait::NonBlocking).unwrap();
        assert_eq!(packet.buffer, vec![2.0]);
        assert!(packet.input_queue_flushed);
        // the dropped packet's first-packet flag moves to the survivor
        assert!(packet.sri_changed);
        assert!(port.get_packet(Wait::NonBlocking).is_none());
    }

    #[test]
    fn flush_preserves_eos_marker() {
        let port = port(3);
        port.push_sri(sri::create("a", 1.0));
        port.push_sri(sri::create("b", 1.0));
        port.push_packet(vec![1.0; 4], t0(), false, "a");
        port.push_packet(vec![2.0; 4], t0(), true, "a");
        port.push_packet(vec![3.0; 4], t0(), false, "b");
        port.push_packet(vec![4.0; 4], t0(), false, "b");

        let eos = port.get_packet(Wait::NonBlocking).unwrap();
        assert_eq!(eos.stream_id, "a");
        assert!(eos.eos);
        assert!(eos.buffer.is_empty());
        assert!(eos.input_queue_flushed);
        assert!(eos.sri_changed);

        let newest = port.get_packet(Wait::NonBlocking).unwrap();
        assert_eq!(newest.buffer, vec![4.0; 4]);
        assert!(newest.input_queue_flushed);
        assert!(newest.sri_changed);
        assert!(port.get_packet(Wait::NonBlocking).is_none());
        assert_eq!(port.active_sris().len(), 1);
    }

    #[test]
    fn eos_for_unknown_stream_is_not_registered() {
        let port = port(10);
        port.push_packet(Vec::new(), t0(), true, "ghost");
        assert!(port.active_sris().is_empty());
        let packet = port.get_packet(Wait::NonBlocking).unwrap();
        assert!(packet.eos);
        assert_eq!(packet.stream_id, "ghost");
    }

    #[test]
    fn data_without_sri_gets_default() {
        let port = port(10);
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        port.set_new_stream_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        port.push_packet(vec![1.0], t0(), false, "anon");
        assert_eq!(created.load(Ordering::SeqCst), 1);
        let packet = port.get_packet(Wait::NonBlocking).unwrap();
        assert_eq!(packet.sri.stream_id, "anon");
        assert_eq!(packet.sri.xdelta, 1.0);
        assert!(packet.sri_changed);
    }

    #[test]
    fn dequeued_eos_removes_stream() {
        let port = port(10);
        port.push_sri(sri::create("s1", 1.0));
        port.push_packet(vec![1.0], t0(), true, "s1");
        assert_eq!(port.active_sris().len(), 1);
        port.get_packet(Wait::NonBlocking).unwrap();
        assert!(port.active_sris().is_empty());
    }

    #[test]
    fn reused_stream_id_survives_old_eos() {
        let port = port(10);
        port.push_sri(sri::create("s1", 1.0));
        port.push_packet(vec![1.0], t0(), true, "s1");
        port.push_sri(sri::create("s1", 4.0));
        port.push_packet(vec![2.0], t0(), false, "s1");

        assert!(port.get_packet(Wait::NonBlocking).unwrap().eos);
        let sris = port.active_sris();
        assert_eq!(sris.len(), 1);
        assert_eq!(sris[0].xdelta, 0.25);
        let packet = port.get_packet(Wait::NonBlocking).unwrap();
        assert!(packet.sri_changed);
        assert_eq!(packet.sri_change_flags, SriChangeFlags::ALL);
    }

    #[test]
    fn listeners_run_before_sri_is_visible() {
        let port = port(10);
        let observer = port.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        port.set_sri_change_listener(move |sri| {
            let stored = observer.active_sris()[0].xdelta;
            log.lock().push((stored, sri.xdelta));
        });
        port.push_sri(sri::create("s1", 1.0));
        port.push_sri(sri::create("s1", 2.0));
        assert_eq!(*seen.lock(), vec![(1.0, 0.5)]);
        assert_eq!(port.active_sris()[0].xdelta, 0.5);
    }

    #[test]
    fn panicking_listener_is_contained() {
        let port = port(10);
        port.set_new_stream_listener(|_| panic!("listener failure"));
        port.push_sri(sri::create("s1", 1.0));
        assert_eq!(port.active_sris().len(), 1);
    }

    #[test]
    fn timeout_expires_without_data() {
        let port = port(10);
        let start = Instant::now();
        assert!(port.get_packet(Wait::Timeout(Duration::from_millis(20))).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn timed_get_wakes_before_deadline() {
        let port = port(10);
        let consumer = port.clone();
        let handle = thread::spawn(move || consumer.get_packet(Wait::Timeout(Duration::from_secs(5))));
        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        port.push_packet(vec![6.0], t0(), false, "s1");
        let packet = handle.join().unwrap().unwrap();
        assert_eq!(packet.buffer, vec![6.0]);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn listener_panic_leaves_port_usable_across_threads() {
        let port = port(10);
        port.set_sri_change_listener(|_| panic!("listener failure"));
        port.push_sri(sri::create("s1", 1.0));
        port.push_sri(sri::create("s1", 2.0));
        let producer = port.clone();
        thread::spawn(move || producer.push_packet(vec![1.0], t0(), false, "s1")).join().unwrap();
        let packet = port.get_packet(Wait::NonBlocking).unwrap();
        assert_eq!(packet.sri.xdelta, 0.5);
    }

    #[test]
    fn blocking_get_wakes_on_push() {
        let port = port(10);
        let consumer = port.clone();
        let handle = thread::spawn(move || consumer.get_packet(Wait::Blocking));
        thread::sleep(Duration::from_millis(20));
        port.push_packet(vec![5.0], t0(), false, "s1");
        let packet = handle.join().unwrap().unwrap();
        assert_eq!(packet.buffer, vec![5.0]);
    }

    #[test]
    fn block_releases_waiters() {
        let port = port(10);
        let consumer = port.clone();
        let handle = thread::spawn(move || consumer.get_packet(Wait::Blocking));
        thread::sleep(Duration::from_millis(20));
        port.block();
        assert!(handle.join().unwrap().is_none());
        port.unblock();
        assert!(!port.is_blocked());
    }

    #[test]
    fn blocking_sri_waits_for_space() {
        let port = port(1);
        let mut blocking = sri::create("s1", 1.0);
        blocking.blocking = true;
        port.push_sri(blocking);
        port.push_packet(vec![1.0], t0(), false, "s1");

        let producer = port.clone();
        let handle = thread::spawn(move || producer.push_packet(vec![2.0], t0(), false, "s1"));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(port.queue_depth(), 1);

        let first = port.get_packet(Wait::NonBlocking).unwrap();
        handle.join().unwrap();
        let second = port.get_packet(Wait::NonBlocking).unwrap();
        assert_eq!(first.buffer, vec![1.0]);
        assert_eq!(second.buffer, vec![2.0]);
        assert!(!second.input_queue_flushed);
    }

    #[test]
    fn usage_state_tracks_depth() {
        let port = port(2);
        assert_eq!(port.usage_state(), UsageState::Idle);
        port.push_packet(vec![1.0], t0(), false, "s1");
        assert_eq!(port.usage_state(), UsageState::Active);
        port.push_packet(vec![1.0], t0(), false, "s1");
        assert_eq!(port.usage_state(), UsageState::Busy);
    }

    #[test]
    fn statistics_record_pushes() {
        let port = port(10);
        port.push_packet(vec![1.0; 8], t0(), false, "s1");
        let stats = port.statistics();
        assert_eq!(stats.port_name, "dataFloat_in");
        assert_eq!(stats.stream_ids, vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn async_get_wakes_on_push() {
        let _ = tracing_subscriber::fmt::try_init();
        let port = port(10);
        let producer = port.clone();
        let task = tokio::spawn(async move { producer.get_packet_async().await });
        tokio::task::yield_now().await;
        port.push_packet(vec![9.0], t0(), false, "s1");
        let packet = task.await.unwrap().unwrap();
        assert_eq!(packet.buffer, vec![9.0]);
    }

    #[tokio::test]
    async fn packet_stream_ends_on_block() {
        use futures::StreamExt;

        let port = port(10);
        port.push_packet(vec![1.0], t0(), false, "s1");
        port.push_packet(vec![2.0], t0(), false, "s1");
        port.block();
        let packets: Vec<_> = port.packet_stream().collect().await;
        assert_eq!(packets.len(), 2);
    }
}
