//! Output side of a data connection.

mod local;
mod peer;
mod port;
mod stream;

pub use local::LocalPeer;
pub use peer::PortPeer;
pub use port::{ConnectionListener, OutputPort};
pub use stream::OutputStream;

use crate::bits::BitBuffer;
use crate::types::{FilePayload, XmlPayload};

pub type OutCharPort = OutputPort<Vec<i8>>;
pub type OutOctetPort = OutputPort<Vec<u8>>;
pub type OutShortPort = OutputPort<Vec<i16>>;
pub type OutUShortPort = OutputPort<Vec<u16>>;
pub type OutLongPort = OutputPort<Vec<i32>>;
pub type OutULongPort = OutputPort<Vec<u32>>;
pub type OutLongLongPort = OutputPort<Vec<i64>>;
pub type OutULongLongPort = OutputPort<Vec<u64>>;
pub type OutFloatPort = OutputPort<Vec<f32>>;
pub type OutDoublePort = OutputPort<Vec<f64>>;
pub type OutBitPort = OutputPort<BitBuffer>;
pub type OutXmlPort = OutputPort<XmlPayload>;
pub type OutFilePort = OutputPort<FilePayload>;
