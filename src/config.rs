//! YAML port configuration.
//!
//! ```yaml
//! ports:
//!   dataFloat_in:
//!     max_queue_depth: 100
//!     history_window: 10
//!     enable_stats: true
//!   dataFloat_out:
//!     max_payload_bytes: 2097152
//! connection_filter:
//!   - { port_name: dataFloat_out, connection_id: c1, stream_id: s1 }
//! ```
//!
//! `max_queue_depth` takes a non-negative integer, or `unlimited` (a negative
//! integer means the same).

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filter::FilterTable;
use crate::stats::DEFAULT_HISTORY_WINDOW;
use crate::{PortError, Result};

/// Default input queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 100;

/// Default largest payload pushed in one call, in bytes.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 2 * 1024 * 1024;

/// Input queue bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DepthRepr", into = "DepthRepr")]
pub enum QueueDepth {
    Limited(usize),
    Unlimited,
}

impl Default for QueueDepth {
    fn default() -> Self {
        QueueDepth::Limited(DEFAULT_QUEUE_DEPTH)
    }
}

impl QueueDepth {
    /// Returns true if a queue holding `len` packets must flush before the next push.
    pub fn is_full(&self, len: usize) -> bool {
        match self {
            QueueDepth::Limited(max) => len >= *max,
            QueueDepth::Unlimited => false,
        }
    }

    /// Fraction of the bound in use; zero when unlimited.
    pub fn fill(&self, len: usize) -> f64 {
        match self {
            QueueDepth::Limited(0) => 1.0,
            QueueDepth::Limited(max) => len as f64 / *max as f64,
            QueueDepth::Unlimited => 0.0,
        }
    }
}

impl fmt::Display for QueueDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueDepth::Limited(max) => write!(f, "{max}"),
            QueueDepth::Unlimited => f.write_str("unlimited"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum DepthRepr {
    Depth(i64),
    Text(String),
}

impl TryFrom<DepthRepr> for QueueDepth {
    type Error = PortError;

    fn try_from(repr: DepthRepr) -> Result<Self> {
        match repr {
            DepthRepr::Depth(depth) if depth < 0 => Ok(QueueDepth::Unlimited),
            DepthRepr::Depth(depth) => usize::try_from(depth)
                .map(QueueDepth::Limited)
                .map_err(|_| PortError::out_of_range(depth, "queue depth")),
            DepthRepr::Text(text) if text.eq_ignore_ascii_case("unlimited") => {
                Ok(QueueDepth::Unlimited)
            }
            DepthRepr::Text(text) => Err(PortError::Parse {
                context: "max_queue_depth".to_string(),
                details: format!("expected an integer or 'unlimited', got '{text}'"),
            }),
        }
    }
}

impl From<QueueDepth> for DepthRepr {
    fn from(depth: QueueDepth) -> Self {
        match depth {
            QueueDepth::Limited(max) => DepthRepr::Depth(i64::try_from(max).unwrap_or(i64::MAX)),
            QueueDepth::Unlimited => DepthRepr::Text("unlimited".to_string()),
        }
    }
}

fn default_history_window() -> usize {
    DEFAULT_HISTORY_WINDOW
}

fn default_enable_stats() -> bool {
    true
}

fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

/// Settings for one port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default)]
    pub max_queue_depth: QueueDepth,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_enable_stats")]
    pub enable_stats: bool,
    /// Bits per element for throughput; the payload type's size when absent.
    #[serde(default)]
    pub bit_size: Option<f64>,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: QueueDepth::default(),
            history_window: DEFAULT_HISTORY_WINDOW,
            enable_stats: true,
            bit_size: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

/// Configuration document for a set of ports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ports: BTreeMap<String, PortConfig>,
    #[serde(default)]
    pub connection_filter: FilterTable,
}

impl Config {
    /// Parses a YAML document.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml_ng::from_str(yaml)?;
        debug!(
            ports = config.ports.len(),
            filters = config.connection_filter.entries().len(),
            "Parsed port configuration"
        );
        Ok(config)
    }

    /// Reads and parses a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading port configuration {}", path.display()))?;
        Self::parse(&yaml).with_context(|| format!("parsing port configuration {}", path.display()))
    }

    /// Settings for `port_name`, or defaults when the port is not listed.
    pub fn port(&self, port_name: &str) -> PortConfig {
        self.ports.get(port_name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ConnectionFilter;

    #[test]
    fn parses_full_document() {
        let yaml = r#"
ports:
  dataFloat_in:
    max_queue_depth: 8
    history_window: 4
    enable_stats: false
  dataShort_in:
    max_queue_depth: unlimited
  dataOctet_in:
    max_queue_depth: -1
  dataFloat_out:
    max_payload_bytes: 1024
    bit_size: 16
connection_filter:
  - { port_name: dataFloat_out, connection_id: c1, stream_id: s1 }
"#;
        let config = Config::parse(yaml).unwrap();
        let input = config.port("dataFloat_in");
        assert_eq!(input.max_queue_depth, QueueDepth::Limited(8));
        assert_eq!(input.history_window, 4);
        assert!(!input.enable_stats);
        assert_eq!(config.port("dataShort_in").max_queue_depth, QueueDepth::Unlimited);
        assert_eq!(config.port("dataOctet_in").max_queue_depth, QueueDepth::Unlimited);

        let output = config.port("dataFloat_out");
        assert_eq!(output.max_payload_bytes, 1024);
        assert_eq!(output.bit_size, Some(16.0));
        assert_eq!(output.max_queue_depth, QueueDepth::default());

        assert_eq!(
            config.connection_filter.entries(),
            &[ConnectionFilter::new("dataFloat_out", "c1", "s1")]
        );
    }

    #[test]
    fn missing_port_uses_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config.port("anything"), PortConfig::default());
        assert!(config.connection_filter.is_empty());
    }

    #[test]
    fn rejects_bad_depth() {
        let err = Config::parse("ports: { p: { max_queue_depth: lots } }").unwrap_err();
        assert!(matches!(err, PortError::Config { .. }));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/nonexistent/ports.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("reading port configuration"));
    }

    #[test]
    fn queue_depth_helpers() {
        let depth = QueueDepth::Limited(4);
        assert!(!depth.is_full(3));
        assert!(depth.is_full(4));
        assert_eq!(depth.fill(2), 0.5);
        assert!(!QueueDepth::Unlimited.is_full(usize::MAX));
        assert_eq!(QueueDepth::Unlimited.to_string(), "unlimited");
    }

    #[test]
    fn depth_roundtrips_through_yaml() {
        let config = PortConfig { max_queue_depth: QueueDepth::Unlimited, ..Default::default() };
        let yaml = serde_yaml_ng::to_string(&config).unwrap();
        let parsed: PortConfig = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
