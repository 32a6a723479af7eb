//! Input side of a data connection.
//!
//! An [`InputPort`] receives SRI and packets from any number of producers
//! and queues them for the consumer. Consumers either take whole packets
//! with [`InputPort::get_packet`] or read per-stream sample blocks through
//! an [`InputStream`] cursor.

mod block;
mod port;
mod queue;
mod stream;

pub use block::{DataBlock, SampleTimestamp};
pub use port::{InputPort, SriListener, Wait};
pub use stream::InputStream;

use crate::bits::BitBuffer;
use crate::types::{FilePayload, XmlPayload};

pub type InCharPort = InputPort<Vec<i8>>;
pub type InOctetPort = InputPort<Vec<u8>>;
pub type InShortPort = InputPort<Vec<i16>>;
pub type InUShortPort = InputPort<Vec<u16>>;
pub type InLongPort = InputPort<Vec<i32>>;
pub type InULongPort = InputPort<Vec<u32>>;
pub type InLongLongPort = InputPort<Vec<i64>>;
pub type InULongLongPort = InputPort<Vec<u64>>;
pub type InFloatPort = InputPort<Vec<f32>>;
pub type InDoublePort = InputPort<Vec<f64>>;
pub type InBitPort = InputPort<BitBuffer>;
pub type InXmlPort = InputPort<XmlPayload>;
pub type InFilePort = InputPort<FilePayload>;
