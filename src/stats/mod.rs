//! Throughput statistics.

mod link;
mod ring;

pub use link::{
    ConnectionStatistics, DEFAULT_HISTORY_WINDOW, ERROR_LOG_THRESHOLD, LinkStatistics,
    PortStatistics, TIME_SINCE_LAST_FLUSH,
};
pub use ring::HistoryRing;
