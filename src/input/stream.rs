//! Per-stream read cursors.

use std::pin::pin;
use std::time::Duration;

use tracing::trace;

use super::block::DataBlock;
use super::port::{InputPort, Wait};
use super::queue::{Fetch, Request};
use crate::types::{SampleBuffer, StreamSri};

/// Cursor over one stream of an [`InputPort`].
///
/// Reads pull only this stream's packets out of the shared queue; packets
/// of other streams stay queued in order. A block never spans an SRI
/// change, so a read may return fewer samples than requested when the SRI
/// changes or the stream ends.
pub struct InputStream<B> {
    port: InputPort<B>,
    generation: u64,
    sri: StreamSri,
    eos: bool,
}

impl<B: SampleBuffer> InputStream<B> {
    pub(super) fn new(port: InputPort<B>, generation: u64, sri: StreamSri) -> Self {
        Self { port, generation, sri, eos: false }
    }

    pub fn stream_id(&self) -> &str {
        &self.sri.stream_id
    }

    /// SRI of the most recently read block, or the stream's SRI before the first read.
    pub fn sri(&self) -> &StreamSri {
        &self.sri
    }

    /// True once the end of the stream has been read.
    pub fn eos(&self) -> bool {
        self.eos || !self.port.shared.state.lock().generations.contains_key(&self.generation)
    }

    /// Blocks until a packet's worth of data is available and returns it.
    pub fn read(&mut self) -> Option<DataBlock<B>> {
        self.fetch(Request { count: None, consume: None, require_full: false }, Wait::Blocking)
    }

    /// Blocks until `count` samples are available, or fewer if the SRI
    /// changes or the stream ends first.
    pub fn read_count(&mut self, count: usize) -> Option<DataBlock<B>> {
        self.read_count_consume(count, count)
    }

    /// Reads `count` samples but advances the cursor by only `consume`,
    /// so the remainder is returned again by the next read.
    pub fn read_count_consume(&mut self, count: usize, consume: usize) -> Option<DataBlock<B>> {
        self.fetch(
            Request { count: Some(count), consume: Some(consume), require_full: true },
            Wait::Blocking,
        )
    }

    /// Returns a packet's worth of data if any is queued.
    pub fn try_read(&mut self) -> Option<DataBlock<B>> {
        self.fetch(Request { count: None, consume: None, require_full: false }, Wait::NonBlocking)
    }

    /// Returns `count` samples only if that many are already queued.
    pub fn try_read_count(&mut self, count: usize) -> Option<DataBlock<B>> {
        self.fetch(
            Request { count: Some(count), consume: Some(count), require_full: true },
            Wait::NonBlocking,
        )
    }

    /// Waits up to `timeout` for a packet's worth of data.
    pub fn read_timeout(&mut self, timeout: Duration) -> Option<DataBlock<B>> {
        self.fetch(Request { count: None, consume: None, require_full: false }, Wait::Timeout(timeout))
    }

    /// Waits up to `timeout` for `count` samples; `None` if they do not arrive in time.
    pub fn read_count_timeout(&mut self, count: usize, timeout: Duration) -> Option<DataBlock<B>> {
        self.fetch(
            Request { count: Some(count), consume: Some(count), require_full: true },
            Wait::Timeout(timeout),
        )
    }

    /// Discards up to `count` samples, waiting for data like [`read`](Self::read).
    ///
    /// Returns fewer than `count` when the stream ends or the port is blocked.
    pub fn skip(&mut self, count: usize) -> usize {
        let mut skipped = 0;
        while skipped < count {
            let request = Request { count: Some(count - skipped), consume: None, require_full: false };
            match self.fetch(request, Wait::Blocking) {
                Some(block) if block.size() > 0 => skipped += block.size(),
                _ => break,
            }
        }
        skipped
    }

    /// Samples readable without blocking, up to the next SRI change.
    pub fn samples_available(&self) -> usize {
        self.port.shared.state.lock().available(self.generation).unwrap_or(0)
    }

    /// True if a read would return data without blocking.
    pub fn ready(&self) -> bool {
        self.samples_available() > 0
    }

    pub fn has_buffered_data(&self) -> bool {
        self.port.shared.state.lock().has_buffered(self.generation)
    }

    pub fn enabled(&self) -> bool {
        self.port.shared.state.lock()
            .generations
            .get(&self.generation)
            .is_some_and(|entry| entry.enabled)
    }

    /// Resumes accepting this stream's packets.
    pub fn enable(&self) {
        if let Some(entry) = self.port.shared.state.lock().generations.get_mut(&self.generation) {
            entry.enabled = true;
        }
    }

    /// Discards this stream's queued data and drops its future packets until re-enabled.
    pub fn disable(&self) {
        self.port.shared.state.lock().disable(self.generation);
        trace!(port = %self.port.name(), stream_id = %self.sri.stream_id, "Stream disabled");
        self.port.shared.wake_all();
    }

    fn complete(&mut self, fetch: Fetch<B>) -> Option<Option<DataBlock<B>>> {
        match fetch {
            Fetch::Block { block, eos } => {
                self.eos |= eos;
                self.sri = block.sri.clone();
                Some(Some(block))
            }
            Fetch::Eos => {
                self.eos = true;
                Some(None)
            }
            Fetch::Gone => Some(None),
            Fetch::Pending => None,
        }
    }

    fn fetch(&mut self, request: Request, wait_mode: Wait) -> Option<DataBlock<B>> {
        if self.eos {
            return None;
        }
        let deadline = wait_mode.deadline();
        let shared = &self.port.shared;
        let mut state = shared.state.lock();
        let mut expired = false;
        loop {
            let before = state.packets.len();
            let fetch = state.fetch(self.generation, request);
            let shrunk = state.packets.len() < before;
            let blocked = state.blocked;
            if shrunk {
                shared.queue_space.notify_all();
            }
            match fetch {
                Fetch::Pending if !blocked && !expired && wait_mode != Wait::NonBlocking => {
                    expired = shared.wait_ready(&mut state, deadline);
                }
                fetch => {
                    drop(state);
                    return self.complete(fetch).flatten();
                }
            }
        }
    }

    /// Waits asynchronously for a packet's worth of data.
    pub async fn read_async(&mut self) -> Option<DataBlock<B>> {
        let request = Request { count: None, consume: None, require_full: false };
        loop {
            if self.eos {
                return None;
            }
            let shared = std::sync::Arc::clone(&self.port.shared);
            let mut notified = pin!(shared.notify.notified());
            notified.as_mut().enable();
            let (fetch, blocked) = {
                let mut state = shared.state.lock();
                let before = state.packets.len();
                let fetch = state.fetch(self.generation, request);
                if state.packets.len() < before {
                    shared.queue_space.notify_all();
                }
                (fetch, state.blocked)
            };
            if let Some(result) = self.complete(fetch) {
                return result;
            }
            if blocked {
                return None;
            }
            notified.await;
        }
    }
}

impl<B> std::fmt::Debug for InputStream<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputStream")
            .field("stream_id", &self.sri.stream_id)
            .field("generation", &self.generation)
            .field("eos", &self.eos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PortConfig, QueueDepth};
    use crate::types::{PrecisionUtcTime, SriChangeFlags, sri};
    use std::thread;
    use std::time::Duration;

    fn t(secs: f64) -> PrecisionUtcTime {
        PrecisionUtcTime::new(secs, 0.0)
    }

    fn port() -> InputPort<Vec<i16>> {
        InputPort::new("dataShort_in")
    }

    #[test]
    fn read_returns_one_packet() {
        let port = port();
        port.push_sri(sri::create("s1", 10.0));
        port.push_packet(vec![1, 2, 3], t(1.0), false, "s1");
        port.push_packet(vec![4, 5], t(2.0), false, "s1");

        let mut stream = port.get_stream("s1").unwrap();
        let block = stream.read().unwrap();
        assert_eq!(block.buffer, vec![1, 2, 3]);
        assert!(block.sri_changed);
        assert_eq!(block.sri_change_flags, SriChangeFlags::ALL);
        let block = stream.try_read().unwrap();
        assert_eq!(block.buffer, vec![4, 5]);
        assert!(!block.sri_changed);
    }

    #[test]
    fn read_count_spans_packets_with_timestamps() {
        let port = port();
        port.push_sri(sri::create("s1", 10.0));
        port.push_packet(vec![1, 2, 3, 4], t(100.0), false, "s1");
        port.push_packet(vec![5, 6, 7, 8], t(100.4), false, "s1");

        let mut stream = port.get_stream("s1").unwrap();
        let first = stream.read_count(2).unwrap();
        assert_eq!(first.buffer, vec![1, 2]);

        let second = stream.read_count(4).unwrap();
        assert_eq!(second.buffer, vec![3, 4, 5, 6]);
        assert_eq!(second.timestamps.len(), 2);
        assert!(second.timestamps[0].synthetic);
        assert!((second.timestamps[0].time.as_secs_f64() - 100.2).abs() < 1e-9);
        assert_eq!(second.timestamps[1].offset, 2);
        assert!(!second.timestamps[1].synthetic);
        assert_eq!(stream.samples_available(), 2);
    }

    #[test]
    fn consume_less_than_read_overlaps() {
        let port = port();
        port.push_packet(vec![1, 2, 3, 4, 5, 6], t(0.0), false, "s1");
        let mut stream = port.get_stream("s1").unwrap();
        assert_eq!(stream.read_count_consume(4, 2).unwrap().buffer, vec![1, 2, 3, 4]);
        assert_eq!(stream.read_count(4).unwrap().buffer, vec![3, 4, 5, 6]);
    }

    #[test]
    fn reads_stop_at_sri_change() {
        let port = port();
        port.push_sri(sri::create("s1", 1.0));
        port.push_packet(vec![1, 2], t(0.0), false, "s1");
        port.push_sri(sri::create("s1", 2.0));
        port.push_packet(vec![3, 4], t(2.0), false, "s1");

        let mut stream = port.get_stream("s1").unwrap();
        let first = stream.read_count(4).unwrap();
        assert_eq!(first.buffer, vec![1, 2]);
        assert_eq!(stream.samples_available(), 2);
        let second = stream.try_read().unwrap();
        assert_eq!(second.buffer, vec![3, 4]);
        assert!(second.sri_changed);
        assert_eq!(second.sri_change_flags, SriChangeFlags::XDELTA);
        assert_eq!(stream.sri().xdelta, 0.5);
    }

    #[test]
    fn try_read_count_requires_full_block() {
        let port = port();
        port.push_packet(vec![1, 2], t(0.0), false, "s1");
        let mut stream = port.get_stream("s1").unwrap();
        assert!(stream.try_read_count(3).is_none());
        port.push_packet(vec![3], t(0.0), false, "s1");
        assert_eq!(stream.try_read_count(3).unwrap().buffer, vec![1, 2, 3]);
    }

    #[test]
    fn complex_samples_count_pairs() {
        let port = port();
        let mut complex = sri::create("iq", 1.0);
        complex.mode = 1;
        port.push_sri(complex);
        port.push_packet(vec![1, 2, 3, 4, 5, 6], t(0.0), false, "iq");
        let mut stream = port.get_stream("iq").unwrap();
        assert_eq!(stream.samples_available(), 3);
        let block = stream.read_count(2).unwrap();
        assert_eq!(block.buffer, vec![1, 2, 3, 4]);
        assert_eq!(block.size(), 2);
    }

    #[test]
    fn eos_ends_stream() {
        let port = port();
        port.push_packet(vec![1, 2], t(0.0), false, "s1");
        port.push_packet(vec![3], t(0.0), true, "s1");
        let mut stream = port.get_stream("s1").unwrap();
        let block = stream.read_count(10).unwrap();
        assert_eq!(block.buffer, vec![1, 2, 3]);
        assert!(stream.eos());
        assert!(stream.read().is_none());
        assert!(port.get_stream("s1").is_none());
    }

    #[test]
    fn empty_eos_is_reported() {
        let port = port();
        port.push_packet(vec![1], t(0.0), false, "s1");
        port.push_packet(Vec::new(), t(0.0), true, "s1");
        let mut stream = port.get_stream("s1").unwrap();
        assert_eq!(stream.read().unwrap().buffer, vec![1]);
        assert!(!stream.eos());
        assert!(stream.read().is_none());
        assert!(stream.eos());
    }

    #[test]
    fn skip_discards_samples() {
        let port = port();
        port.push_packet(vec![1, 2, 3, 4, 5], t(0.0), false, "s1");
        let mut stream = port.get_stream("s1").unwrap();
        assert_eq!(stream.skip(3), 3);
        assert_eq!(stream.try_read().unwrap().buffer, vec![4, 5]);
    }

    #[test]
    fn other_streams_stay_queued() {
        let port = port();
        port.push_packet(vec![1], t(0.0), false, "a");
        port.push_packet(vec![2], t(0.0), false, "b");
        port.push_packet(vec![3], t(0.0), false, "a");
        let mut b = port.get_stream("b").unwrap();
        assert_eq!(b.try_read().unwrap().buffer, vec![2]);
        assert_eq!(port.queue_depth(), 2);
        let current = port.get_current_stream(Wait::NonBlocking).unwrap();
        assert_eq!(current.stream_id(), "a");
    }

    #[test]
    fn disable_drops_data() {
        let port = port();
        port.push_packet(vec![1], t(0.0), false, "s1");
        let stream = port.get_stream("s1").unwrap();
        stream.disable();
        assert!(!stream.enabled());
        assert!(!stream.has_buffered_data());
        port.push_packet(vec![2], t(0.0), false, "s1");
        assert_eq!(port.queue_depth(), 0);
        stream.enable();
        port.push_packet(vec![3], t(0.0), false, "s1");
        assert_eq!(port.queue_depth(), 1);
    }

    #[test]
    fn blocking_read_wakes_on_push() {
        let config = PortConfig { max_queue_depth: QueueDepth::Unlimited, ..Default::default() };
        let port = InputPort::<Vec<i16>>::with_config("in", &config);
        port.push_sri(sri::create("s1", 1.0));
        let mut stream = port.get_stream("s1").unwrap();
        let producer = port.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push_packet(vec![1, 2], t(0.0), false, "s1");
            producer.push_packet(vec![3, 4], t(0.0), false, "s1");
        });
        let block = stream.read_count(4).unwrap();
        handle.join().unwrap();
        assert_eq!(block.buffer, vec![1, 2, 3, 4]);
    }

    #[test]
    fn block_releases_stream_reader() {
        let port = port();
        port.push_sri(sri::create("s1", 1.0));
        let mut stream = port.get_stream("s1").unwrap();
        let blocker = port.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            blocker.block();
        });
        assert!(stream.read().is_none());
        handle.join().unwrap();
    }

    fn complex_port() -> InputPort<Vec<i16>> {
        let port = port();
        let mut complex = sri::create("iq", 1.0);
        complex.mode = 1;
        port.push_sri(complex);
        port
    }

    #[test]
    fn partial_sample_waits_for_more_data() {
        let port = complex_port();
        port.push_packet(vec![1, 2, 3], t(0.0), false, "iq");
        let mut stream = port.get_stream("iq").unwrap();
        assert_eq!(stream.try_read().unwrap().buffer, vec![1, 2]);
        assert!(stream.try_read().is_none());
        assert!(stream.has_buffered_data());

        port.push_packet(vec![4, 5], t(1.0), false, "iq");
        assert_eq!(stream.try_read().unwrap().buffer, vec![3, 4]);
        assert!(stream.try_read().is_none());
    }

    #[test]
    fn skip_completes_partial_sample() {
        let port = complex_port();
        port.push_packet(vec![1, 2, 3], t(0.0), false, "iq");
        let mut stream = port.get_stream("iq").unwrap();
        let skipper = thread::spawn(move || stream.skip(2));

        thread::sleep(Duration::from_millis(20));
        port.push_packet(vec![4, 5, 6], t(1.0), false, "iq");
        assert_eq!(skipper.join().unwrap(), 2);

        let mut stream = port.get_stream("iq").unwrap();
        assert_eq!(stream.try_read().unwrap().buffer, vec![5, 6]);
    }

    #[test]
    fn partial_sample_before_eos_is_dropped() {
        let port = complex_port();
        port.push_packet(vec![1, 2, 3], t(0.0), true, "iq");
        let mut stream = port.get_stream("iq").unwrap();
        assert_eq!(stream.read().unwrap().buffer, vec![1, 2]);
        assert!(stream.read().is_none());
        assert!(stream.eos());
        assert_eq!(stream.skip(1), 0);
    }

    #[test]
    fn read_count_timeout_expires_without_consuming() {
        let port = port();
        port.push_packet(vec![1], t(0.0), false, "s1");
        let mut stream = port.get_stream("s1").unwrap();

        let started = std::time::Instant::now();
        assert!(stream.read_count_timeout(4, Duration::from_millis(20)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(stream.samples_available(), 1);
        assert!(!stream.eos());
    }

    #[test]
    fn read_timeout_wakes_on_push() {
        let port = port();
        port.push_sri(sri::create("s1", 1.0));
        let mut stream = port.get_stream("s1").unwrap();
        let producer = port.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push_packet(vec![5, 6], t(0.0), false, "s1");
        });

        let started = std::time::Instant::now();
        let block = stream.read_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert_eq!(block.buffer, vec![5, 6]);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn disable_wakes_blocked_reader() {
        let port = port();
        port.push_sri(sri::create("s1", 1.0));
        port.push_packet(vec![1, 2], t(0.0), false, "s1");
        let mut reader = port.get_stream("s1").unwrap();
        let handle = thread::spawn(move || {
            let result = reader.read_count(10);
            (reader, result)
        });

        thread::sleep(Duration::from_millis(20));
        let control = port.get_stream("s1").unwrap();
        control.disable();
        let (mut reader, result) = handle.join().unwrap();
        assert!(result.is_none());
        assert!(!reader.has_buffered_data());
        assert!(!reader.eos());

        control.enable();
        port.push_packet(vec![9], t(1.0), false, "s1");
        assert_eq!(reader.try_read().unwrap().buffer, vec![9]);
    }

    #[test]
    fn disable_discards_partially_read_packet() {
        let port = port();
        port.push_packet(vec![1, 2, 3, 4], t(0.0), false, "s1");
        port.push_packet(vec![5, 6], t(1.0), false, "s1");
        let mut stream = port.get_stream("s1").unwrap();
        assert_eq!(stream.read_count(2).unwrap().buffer, vec![1, 2]);
        assert!(stream.has_buffered_data());

        stream.disable();
        assert!(!stream.has_buffered_data());
        assert_eq!(stream.samples_available(), 0);
        stream.enable();
        assert!(stream.try_read().is_none());
    }

    #[test]
    fn pushes_racing_disable_stay_dropped() {
        let config = PortConfig { max_queue_depth: QueueDepth::Unlimited, ..Default::default() };
        let port = InputPort::<Vec<i16>>::with_config("in", &config);
        port.push_sri(sri::create("s1", 1.0));
        let stream = port.get_stream("s1").unwrap();
        let producer = port.clone();
        let handle = thread::spawn(move || {
            for value in 0..500 {
                producer.push_packet(vec![value], t(0.0), false, "s1");
            }
        });

        thread::sleep(Duration::from_millis(1));
        stream.disable();
        handle.join().unwrap();
        assert_eq!(port.queue_depth(), 0);
        assert!(!stream.has_buffered_data());
    }

    #[tokio::test]
    async fn read_async_wakes_on_push() {
        let port = port();
        port.push_sri(sri::create("s1", 1.0));
        let mut stream = port.get_stream("s1").unwrap();
        let producer = port.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            producer.push_packet(vec![7], t(0.0), false, "s1");
        });
        let block = stream.read_async().await.unwrap();
        assert_eq!(block.buffer, vec![7]);
    }
}
