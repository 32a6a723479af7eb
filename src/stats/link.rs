//! Per-connection throughput accounting.

use std::collections::BTreeSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::HistoryRing;
use crate::types::Keyword;

/// Default number of samples kept for rate computation.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Consecutive connection errors after which failures stop being logged.
pub const ERROR_LOG_THRESHOLD: u64 = 10;

/// Keyword attached to a snapshot once the queue has flushed.
pub const TIME_SINCE_LAST_FLUSH: &str = "timeSinceLastFlush";

/// Snapshot of one connection's throughput.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortStatistics {
    pub port_name: String,
    pub elements_per_second: f64,
    pub bits_per_second: f64,
    pub calls_per_second: f64,
    pub stream_ids: Vec<String>,
    pub average_queue_depth: f64,
    pub time_since_last_call: f64,
    pub keywords: Vec<Keyword>,
}

/// Statistics of one connection of an output port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatistics {
    pub connection_id: String,
    pub statistics: PortStatistics,
}

#[derive(Debug, Clone, Copy)]
struct HistorySample {
    elements: f64,
    queue_depth: f64,
    at: Instant,
}

/// Sliding-window accumulator for a single connection.
///
/// ```rust
/// use bulkio::LinkStatistics;
///
/// let mut stats = LinkStatistics::new("dataFloat_out", 32.0);
/// stats.update(1024, 0.0, false, "s1", false);
/// stats.update(1024, 0.0, true, "s1", false);
/// assert!(stats.retrieve().stream_ids.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct LinkStatistics {
    port_name: String,
    enabled: bool,
    bit_size: f64,
    history: HistoryRing<HistorySample>,
    last_flush: Option<Instant>,
    active_streams: BTreeSet<String>,
    connection_errors: u64,
    snapshot: PortStatistics,
}

impl LinkStatistics {
    pub fn new(port_name: impl Into<String>, bit_size: f64) -> Self {
        Self::with_history_window(port_name, bit_size, DEFAULT_HISTORY_WINDOW)
    }

    pub fn with_history_window(port_name: impl Into<String>, bit_size: f64, window: usize) -> Self {
        let port_name = port_name.into();
        Self {
            snapshot: PortStatistics { port_name: port_name.clone(), ..Default::default() },
            port_name,
            enabled: true,
            bit_size,
            history: HistoryRing::with_capacity(window),
            last_flush: None,
            active_streams: BTreeSet::new(),
            connection_errors: 0,
        }
    }

    pub fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Sets bits per element used for `bits_per_second`.
    pub fn set_bit_size(&mut self, bit_size: f64) {
        self.bit_size = bit_size;
    }

    /// Records one push. A successful update always clears the error tally.
    pub fn update(&mut self, elements: usize, queue_depth: f64, eos: bool, stream_id: &str, flush: bool) {
        self.update_at(elements, queue_depth, eos, stream_id, flush, Instant::now());
    }

    pub(crate) fn update_at(
        &mut self,
        elements: usize,
        queue_depth: f64,
        eos: bool,
        stream_id: &str,
        flush: bool,
        at: Instant,
    ) {
        self.connection_errors = 0;
        if !self.enabled {
            return;
        }
        self.history.push(HistorySample { elements: elements as f64, queue_depth, at });
        if flush {
            self.last_flush = Some(at);
        }
        if eos {
            self.active_streams.remove(stream_id);
        } else {
            self.active_streams.insert(stream_id.to_string());
        }
    }

    /// Computes rates over the window. When disabled, returns the last snapshot.
    pub fn retrieve(&mut self) -> PortStatistics {
        self.retrieve_at(Instant::now())
    }

    pub(crate) fn retrieve_at(&mut self, now: Instant) -> PortStatistics {
        if !self.enabled {
            return self.snapshot.clone();
        }

        let mut stats = PortStatistics {
            port_name: self.port_name.clone(),
            stream_ids: self.active_streams.iter().cloned().collect(),
            ..Default::default()
        };

        if let Some(newest) = self.history.newest() {
            stats.time_since_last_call = now.duration_since(newest.at).as_secs_f64();
            stats.average_queue_depth = newest.queue_depth;
        }

        if let Some(oldest) = self.history.oldest().filter(|_| self.history.len() >= 2) {
            let total_time = now.duration_since(oldest.at).as_secs_f64();
            let calls = (self.history.len() - 1) as f64;
            let (elements, queue) = self
                .history
                .iter()
                .skip(1)
                .fold((0.0, 0.0), |(e, q), sample| (e + sample.elements, q + sample.queue_depth));
            stats.average_queue_depth = queue / calls;
            if total_time > 0.0 {
                stats.elements_per_second = elements / total_time;
                stats.bits_per_second = elements * self.bit_size / total_time;
                stats.calls_per_second = calls / total_time;
            }
        }

        if let Some(flush) = self.last_flush {
            stats.keywords.push(Keyword::new(
                TIME_SINCE_LAST_FLUSH,
                now.duration_since(flush).as_secs_f64(),
            ));
        }

        self.snapshot = stats.clone();
        stats
    }

    /// Adds `count` failures and returns the running tally.
    pub fn connection_errors(&mut self, count: u64) -> u64 {
        self.connection_errors += count;
        self.connection_errors
    }

    pub fn reset_connection_errors(&mut self) {
        self.connection_errors = 0;
    }

    /// Streams seen without a terminating EOS.
    pub fn active_streams(&self) -> impl Iterator<Item = &str> {
        self.active_streams.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rates_exclude_oldest_sample() {
        let start = Instant::now();
        let mut stats = LinkStatistics::with_history_window("port", 32.0, 4);
        for step in 0..4u64 {
            stats.update_at(100, 0.5, false, "s1", false, start + Duration::from_secs(step));
        }
        let snapshot = stats.retrieve_at(start + Duration::from_secs(4));
        // three samples of 100 elements over four seconds
        assert!((snapshot.elements_per_second - 75.0).abs() < 1e-9);
        assert!((snapshot.bits_per_second - 2400.0).abs() < 1e-9);
        assert!((snapshot.calls_per_second - 0.75).abs() < 1e-9);
        assert!((snapshot.average_queue_depth - 0.5).abs() < 1e-9);
        assert!((snapshot.time_since_last_call - 1.0).abs() < 1e-9);
        assert_eq!(snapshot.stream_ids, vec!["s1".to_string()]);
        assert!(snapshot.keywords.is_empty());
    }

    #[test]
    fn single_sample_has_zero_rates() {
        let start = Instant::now();
        let mut stats = LinkStatistics::new("port", 8.0);
        stats.update_at(10, 0.0, false, "s1", false, start);
        let snapshot = stats.retrieve_at(start + Duration::from_secs(1));
        assert_eq!(snapshot.elements_per_second, 0.0);
        assert_eq!(snapshot.calls_per_second, 0.0);
    }

    #[test]
    fn flush_adds_keyword() {
        let start = Instant::now();
        let mut stats = LinkStatistics::new("port", 8.0);
        stats.update_at(10, 1.0, false, "s1", true, start);
        let snapshot = stats.retrieve_at(start + Duration::from_millis(500));
        let keyword = snapshot.keywords.iter().find(|k| k.id == TIME_SINCE_LAST_FLUSH).unwrap();
        assert_eq!(f64::try_from(&keyword.value).unwrap(), 0.5);
    }

    #[test]
    fn eos_removes_stream() {
        let mut stats = LinkStatistics::new("port", 8.0);
        stats.update(1, 0.0, false, "a", false);
        stats.update(1, 0.0, false, "b", false);
        stats.update(0, 0.0, true, "a", false);
        assert_eq!(stats.active_streams().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn disabled_returns_previous_snapshot() {
        let start = Instant::now();
        let mut stats = LinkStatistics::new("port", 8.0);
        stats.update_at(10, 0.0, false, "s1", false, start);
        stats.update_at(10, 0.0, false, "s1", false, start + Duration::from_secs(1));
        let before = stats.retrieve_at(start + Duration::from_secs(2));

        stats.enable(false);
        stats.update_at(1000, 0.0, false, "s2", false, start + Duration::from_secs(3));
        assert_eq!(stats.retrieve_at(start + Duration::from_secs(10)), before);
    }

    #[test]
    fn update_resets_connection_errors() {
        let mut stats = LinkStatistics::new("port", 8.0);
        assert_eq!(stats.connection_errors(1), 1);
        assert_eq!(stats.connection_errors(2), 3);
        stats.enable(false);
        stats.update(0, 0.0, false, "s1", false);
        assert_eq!(stats.connection_errors(1), 1);
    }
}
