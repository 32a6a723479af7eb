//! Core value types shared by every port.
//!
//! ## Architecture
//!
//! - [`StreamSri`] describes one logical stream; [`sri::compare_fields`]
//!   reports which fields differ as [`SriChangeFlags`]
//! - [`PrecisionUtcTime`] is a normalized fixed-point UTC timestamp
//! - [`Value`] is the dynamically typed keyword value with checked narrowing
//! - [`SampleBuffer`] is the payload trait ports are generic over
//! - [`DataPacket`] is one queued unit on an input port
//!
//! ## Usage Example
//!
//! ```rust
//! use bulkio::types::{sri, SriChangeFlags, Value};
//!
//! let before = sri::create("s1", 1.0);
//! let mut after = before.clone();
//! after.xdelta = 0.5;
//! after.set_keyword("CHAN_RF", 100.0e6);
//!
//! let changed = sri::compare_fields(&before, &after);
//! assert_eq!(changed, SriChangeFlags::XDELTA | SriChangeFlags::KEYWORDS);
//!
//! let rf = after.get_keyword("CHAN_RF").unwrap();
//! assert!(i8::try_from(rf).is_err());
//! assert_eq!(f64::try_from(rf).unwrap(), 100.0e6);
//! # let _ = Value::Bool(true);
//! ```

mod change_flags;
mod packet;
mod sample;
pub mod sri;
mod time;
mod usage;
mod value;

pub use change_flags::SriChangeFlags;
pub use packet::DataPacket;
pub use sample::{FilePayload, Sample, SampleBuffer, XmlPayload};
pub use sri::{DefaultComparator, Keyword, SriComparator, StreamSri};
pub use time::{PrecisionUtcTime, TCM_CPU, TCS_INVALID, TCS_VALID};
pub use usage::UsageState;
pub use value::Value;
