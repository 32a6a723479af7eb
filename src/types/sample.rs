//! Payload types a port can carry.

use std::fmt;
use std::ops::Range;

use crate::bits::BitBuffer;

/// A contiguous run of samples moved through a port in one push.
///
/// Ports are generic over this trait instead of one type per element kind.
/// `len` counts scalar elements; complex data uses two per sample.
pub trait SampleBuffer: Clone + Default + fmt::Debug + Send + Sync + 'static {
    /// Interface identifier of ports carrying this payload. Peers must match it.
    const REPO_ID: &'static str;
    /// Size of one element, used for throughput statistics.
    const BITS_PER_ELEMENT: usize;
    /// Whether an oversized payload may be split into several packets.
    const SPLITTABLE: bool = true;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements in `range`, as a new buffer.
    fn slice(&self, range: Range<usize>) -> Self;

    fn append(&mut self, other: &Self);

    /// Empties the buffer, keeping any allocation for reuse.
    fn clear(&mut self);
}

/// Numeric element with a fixed interface identifier.
pub trait Sample: Copy + Default + fmt::Debug + PartialEq + Send + Sync + 'static {
    const REPO_ID: &'static str;
}

macro_rules! numeric_samples {
    ($($ty:ty => $repo:literal),* $(,)?) => {$(
        impl Sample for $ty {
            const REPO_ID: &'static str = $repo;
        }
    )*};
}

numeric_samples! {
    i8 => "IDL:BULKIO/dataChar:1.0",
    u8 => "IDL:BULKIO/dataOctet:1.0",
    i16 => "IDL:BULKIO/dataShort:1.0",
    u16 => "IDL:BULKIO/dataUshort:1.0",
    i32 => "IDL:BULKIO/dataLong:1.0",
    u32 => "IDL:BULKIO/dataUlong:1.0",
    i64 => "IDL:BULKIO/dataLongLong:1.0",
    u64 => "IDL:BULKIO/dataUlongLong:1.0",
    f32 => "IDL:BULKIO/dataFloat:1.0",
    f64 => "IDL:BULKIO/dataDouble:1.0",
}

impl<T: Sample> SampleBuffer for Vec<T> {
    const REPO_ID: &'static str = T::REPO_ID;
    const BITS_PER_ELEMENT: usize = std::mem::size_of::<T>() * 8;

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn slice(&self, range: Range<usize>) -> Self {
        self[range].to_vec()
    }

    fn append(&mut self, other: &Self) {
        self.extend_from_slice(other);
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }
}

impl SampleBuffer for BitBuffer {
    const REPO_ID: &'static str = "IDL:BULKIO/dataBit:1.0";
    const BITS_PER_ELEMENT: usize = 1;

    fn len(&self) -> usize {
        BitBuffer::len(self)
    }

    fn slice(&self, range: Range<usize>) -> Self {
        BitBuffer::slice(self, range)
    }

    fn append(&mut self, other: &Self) {
        BitBuffer::append(self, other);
    }

    fn clear(&mut self) {
        *self = BitBuffer::new();
    }
}

macro_rules! text_payload {
    ($(#[$meta:meta])* $name:ident => $repo:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name(pub String);

        impl SampleBuffer for $name {
            const REPO_ID: &'static str = $repo;
            const BITS_PER_ELEMENT: usize = 8;
            const SPLITTABLE: bool = false;

            fn len(&self) -> usize {
                self.0.len()
            }

            fn slice(&self, range: Range<usize>) -> Self {
                Self(String::from_utf8_lossy(&self.0.as_bytes()[range]).into_owned())
            }

            fn append(&mut self, other: &Self) {
                self.0.push_str(&other.0);
            }

            fn clear(&mut self) {
                self.0.clear();
            }
        }

        impl From<&str> for $name {
            fn from(text: &str) -> Self {
                Self(text.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

text_payload! {
    /// XML document payload; lengths count bytes.
    XmlPayload => "IDL:BULKIO/dataXML:1.0"
}

text_payload! {
    /// File URI payload; lengths count bytes.
    FilePayload => "IDL:BULKIO/dataFile:1.0"
}
