//! Connection filter table.
//!
//! A table is an ordered list of `(port_name, connection_id, stream_id)`
//! entries. A port named by no entry is in open mode and routes every stream
//! to every connection; a port named by at least one entry routes a stream
//! to a connection only when an entry lists that exact pair.

use serde::{Deserialize, Serialize};

/// One allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionFilter {
    pub port_name: String,
    pub connection_id: String,
    pub stream_id: String,
}

impl ConnectionFilter {
    pub fn new(
        port_name: impl Into<String>,
        connection_id: impl Into<String>,
        stream_id: impl Into<String>,
    ) -> Self {
        Self {
            port_name: port_name.into(),
            connection_id: connection_id.into(),
            stream_id: stream_id.into(),
        }
    }
}

/// Ordered filter table.
///
/// ```rust
/// use bulkio::{ConnectionFilter, FilterTable};
///
/// let table = FilterTable::new(vec![ConnectionFilter::new("out", "c1", "s1")]);
/// assert!(table.allows("out", "c1", "s1"));
/// assert!(!table.allows("out", "c2", "s1"));
/// assert!(table.allows("other", "c2", "s1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterTable {
    entries: Vec<ConnectionFilter>,
}

impl FilterTable {
    pub fn new(entries: Vec<ConnectionFilter>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ConnectionFilter] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if any entry names `port_name`.
    pub fn is_filtered(&self, port_name: &str) -> bool {
        self.entries.iter().any(|entry| entry.port_name == port_name)
    }

    /// Returns true if `stream_id` may be routed to `connection_id`.
    pub fn allows(&self, port_name: &str, connection_id: &str, stream_id: &str) -> bool {
        let mut filtered = false;
        for entry in self.entries.iter().filter(|entry| entry.port_name == port_name) {
            filtered = true;
            if entry.connection_id == connection_id && entry.stream_id == stream_id {
                return true;
            }
        }
        !filtered
    }
}

impl From<Vec<ConnectionFilter>> for FilterTable {
    fn from(entries: Vec<ConnectionFilter>) -> Self {
        Self::new(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_mode_routes_everything() {
        let table = FilterTable::default();
        assert!(!table.is_filtered("out"));
        assert!(table.allows("out", "any", "stream"));
    }

    #[test]
    fn filtered_mode_requires_exact_pair() {
        let table = FilterTable::new(vec![
            ConnectionFilter::new("out", "c1", "s1"),
            ConnectionFilter::new("out", "c2", "s2"),
            ConnectionFilter::new("elsewhere", "c3", "s1"),
        ]);
        assert!(table.is_filtered("out"));
        assert!(table.allows("out", "c1", "s1"));
        assert!(table.allows("out", "c2", "s2"));
        assert!(!table.allows("out", "c1", "s2"));
        assert!(!table.allows("out", "c3", "s1"));
        assert!(table.allows("unnamed", "c9", "s9"));
    }

    #[test]
    fn table_deserializes_from_yaml_list() {
        let yaml = "- { port_name: out, connection_id: c1, stream_id: s1 }\n";
        let table: FilterTable = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(table.entries(), &[ConnectionFilter::new("out", "c1", "s1")]);
    }
}
