//! Bulk data ports for streaming signal data between components.
//!
//! Producers push stream metadata (SRI) and sample packets into an
//! [`OutputPort`], which routes them through a connection filter to every
//! entitled peer. An [`InputPort`] queues what arrives in one bounded FIFO
//! shared by all of its streams and hands it out as whole packets or as
//! per-stream sample blocks.
//!
//! # Features
//!
//! - **Bounded queues**: overflow drops data but never an EOS, and flags
//!   the next packet with `input_queue_flushed`
//! - **SRI tracking**: every packet says whether, and which, SRI fields changed
//! - **Filtered fan-out**: per-connection stream routing with lazy SRI catch-up
//! - **Bit buffers**: bit-addressed payloads with shared, copy-on-write storage
//! - **Attachable ports**: SDDS and VITA 49 stream definitions instead of samples
//!
//! # Quick Start
//!
//! ```rust
//! use bulkio::{InputPort, OutputPort, PrecisionUtcTime, Wait, sri};
//!
//! let output = OutputPort::<Vec<f32>>::new("dataFloat_out");
//! let input = InputPort::<Vec<f32>>::new("dataFloat_in");
//! output.connect_local(&input, "connection_1")?;
//!
//! let mut stream = output.create_stream("tone");
//! stream.set_sample_rate(1e3);
//! stream.write(vec![0.0; 256], PrecisionUtcTime::now());
//!
//! let mut reader = input.get_current_stream(Wait::NonBlocking).unwrap();
//! let block = reader.read_count(128).unwrap();
//! assert!(block.sri_changed);
//! assert_eq!(block.size(), 128);
//! # Ok::<(), bulkio::PortError>(())
//! ```

// Core types and error handling
pub mod bits;
mod error;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod types;

// Shared infrastructure
pub mod config;
pub mod filter;
pub mod pool;
pub mod stats;
mod listener;

// Ports
pub mod attachable;
pub mod input;
pub mod output;

// Service loop
pub mod driver;
pub mod processor;

// Core exports
pub use error::*;
pub use types::*;

pub use bits::BitBuffer;
pub use config::{Config, PortConfig, QueueDepth};
pub use driver::{Driver, DriverHandle, DriverState};
pub use filter::{ConnectionFilter, FilterTable};
pub use input::{DataBlock, InputPort, InputStream, SampleTimestamp, Wait};
pub use output::{LocalPeer, OutputPort, OutputStream, PortPeer};
pub use pool::BufferPool;
pub use processor::{Passthrough, ProcessResult, Processor};
pub use stats::{ConnectionStatistics, LinkStatistics, PortStatistics};
