//! Error types for port operations.
//!
//! This module provides the error handling for the bulkio port library.
//! All errors implement the `std::error::Error` trait and carry enough
//! context to tell which port, connection or stream was involved.
//!
//! ## Error Categories
//!
//! - **Configuration Errors**: connecting an incompatible peer, reusing a
//!   connection ID, detaching an unknown attachment
//! - **Transport Errors**: a push to a connected peer failed; these are
//!   normally logged by the router rather than returned
//! - **Bit-range Errors**: integer access wider than 64 bits
//! - **Range Errors**: narrowing a [`Value`](crate::Value) into a type it
//!   does not fit
//!
//! Queue overflow is never an error; it is reported through the
//! `input_queue_flushed` flag on the next packet.
//!
//! ```rust
//! use bulkio::PortError;
//!
//! let error = PortError::occupied_port("connection_1");
//! assert!(!error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use thiserror::Error;

/// Result type alias for port operations.
pub type Result<T, E = PortError> = std::result::Result<T, E>;

/// Failure categories reported by the remote-call boundary.
///
/// The router never retries on its own; the category only feeds logging and
/// [`TransportError::is_retryable`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("communication failure: {0}")]
    CommFailure(String),

    #[error("system error: {0}")]
    SystemError(String),

    #[error("unknown failure: {0}")]
    Unknown(String),
}

impl TransportError {
    /// Returns whether a later call might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Transient(_) | TransportError::CommFailure(_))
    }
}

/// Main error type for port operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PortError {
    #[error("invalid port for connection '{connection_id}': {reason}")]
    InvalidPort { connection_id: String, reason: String },

    #[error("connection '{connection_id}' is already in use")]
    OccupiedPort { connection_id: String },

    #[error("attach failed: {reason}")]
    Attach { reason: String },

    #[error("detach of '{attach_id}' failed: {reason}")]
    Detach { attach_id: String, reason: String },

    #[error("stream input error: {reason}")]
    StreamInput { reason: String },

    #[error("bit width {requested} exceeds maximum of {max}")]
    Length { requested: usize, max: usize },

    #[error("value {value} out of range for {target}")]
    Range { value: String, target: &'static str },

    #[error("parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("configuration error: {reason}")]
    Config {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("push to connection '{connection_id}' failed")]
    Transport {
        connection_id: String,
        #[source]
        source: TransportError,
    },
}

impl PortError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            PortError::Transport { source, .. } => source.is_retryable(),
            PortError::InvalidPort { .. } => false,
            PortError::OccupiedPort { .. } => false,
            PortError::Attach { .. } => false,
            PortError::Detach { .. } => false,
            PortError::StreamInput { .. } => false,
            PortError::Length { .. } => false,
            PortError::Range { .. } => false,
            PortError::Parse { .. } => false,
            PortError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            PortError::InvalidPort { .. } => vec![
                "Check that the peer implements the port's data interface",
                "Use a non-empty connection ID",
            ],
            PortError::OccupiedPort { .. } => vec![
                "Disconnect the existing connection first",
                "Choose a unique connection ID",
            ],
            PortError::Attach { .. } => vec![
                "Check the stream definition accepted by the attach listener",
                "Verify the attach ID is not already in use",
            ],
            PortError::Detach { .. } => vec![
                "List current attachment IDs before detaching",
                "Check the detach listener for failures",
            ],
            PortError::StreamInput { .. } => vec![
                "Verify the stream ID is active on the port",
                "Check that the stream has not reached end-of-stream",
            ],
            PortError::Length { .. } => vec![
                "Split the access into chunks of at most 64 bits",
            ],
            PortError::Range { .. } => vec![
                "Convert to a wider numeric type",
                "Validate the keyword value before narrowing",
            ],
            PortError::Parse { .. } => vec![
                "Check the input format",
                "Verify source data integrity",
            ],
            PortError::Config { .. } => vec![
                "Check the YAML configuration syntax",
                "Verify field names and value types",
            ],
            PortError::Transport { .. } => vec![
                "Check that the remote peer is still running",
                "Inspect link statistics for the connection",
            ],
        }
    }

    /// Helper constructor for incompatible or malformed connections.
    pub fn invalid_port(connection_id: impl Into<String>, reason: impl Into<String>) -> Self {
        PortError::InvalidPort { connection_id: connection_id.into(), reason: reason.into() }
    }

    /// Helper constructor for duplicate connection IDs.
    pub fn occupied_port(connection_id: impl Into<String>) -> Self {
        PortError::OccupiedPort { connection_id: connection_id.into() }
    }

    /// Helper constructor for rejected attach requests.
    pub fn attach_failed(reason: impl Into<String>) -> Self {
        PortError::Attach { reason: reason.into() }
    }

    /// Helper constructor for failed detach requests.
    pub fn detach_failed(attach_id: impl Into<String>, reason: impl Into<String>) -> Self {
        PortError::Detach { attach_id: attach_id.into(), reason: reason.into() }
    }

    /// Helper constructor for range errors from narrowing conversions.
    pub fn out_of_range(value: impl ToString, target: &'static str) -> Self {
        PortError::Range { value: value.to_string(), target }
    }

    /// Helper constructor for bit widths above the 64-bit limit.
    pub fn bit_width(requested: usize) -> Self {
        PortError::Length { requested, max: 64 }
    }
}

impl From<serde_yaml_ng::Error> for PortError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        PortError::Config { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}
