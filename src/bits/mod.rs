//! Bit-packed payload support.
//!
//! [`ops`] holds stateless primitives over byte slices addressed by bit
//! position, most significant bit first. [`BitBuffer`] wraps them with
//! shared-storage slicing and copy-on-write mutation; it is the payload type
//! of bit ports.

mod buffer;
pub mod ops;

pub use buffer::BitBuffer;
