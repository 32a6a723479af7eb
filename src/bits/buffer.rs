//! Bit-addressable buffer with shared storage.

use std::fmt;
use std::ops::{Bound, Index, RangeBounds};
use std::str::FromStr;
use std::sync::Arc;

use super::ops;
use crate::{PortError, Result};

static BIT_VALUES: [u8; 2] = [0, 1];

/// A view over bit-addressable storage.
///
/// Cloning a `BitBuffer` shares the underlying bytes, as does [`slice`] and
/// [`trim`]; none of them copy. Writes through a shared view first detach it
/// onto a private copy of the storage, so other views never observe the
/// change. [`copy`] always produces an independent allocation.
///
/// Equality compares bit content only: two buffers holding the same bits at
/// different byte alignments are equal.
///
/// ```rust
/// use bulkio::bits::BitBuffer;
///
/// let buffer = BitBuffer::from_int(0xBADC0DE, 28).unwrap();
/// assert_eq!(buffer.data(), &[0xBA, 0xDC, 0x0D, 0xE0]);
///
/// let tail = buffer.slice(4..);
/// assert_eq!(tail.offset(), 4);
/// assert_eq!(tail.getint(0, 24).unwrap(), 0xADC0DE);
/// ```
///
/// [`slice`]: BitBuffer::slice
/// [`trim`]: BitBuffer::trim
/// [`copy`]: BitBuffer::copy
#[derive(Clone, Default)]
pub struct BitBuffer {
    storage: Arc<Vec<u8>>,
    /// Absolute bit position of the first bit within `storage`.
    start: usize,
    len: usize,
}

fn resolve(range: impl RangeBounds<usize>, len: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s + 1,
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e + 1,
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    assert!(start <= end, "range start {start} is after end {end}");
    assert!(end <= len, "range end {end} out of bounds for {len} bits");
    (start, end)
}

impl BitBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a zero-filled buffer of `bits` bits.
    pub fn with_len(bits: usize) -> Self {
        Self { storage: Arc::new(vec![0; ops::bytes_for(bits)]), start: 0, len: bits }
    }

    /// Stores the low `bits` bits of `value`, most significant bit first.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Length`] when `bits` exceeds 64.
    pub fn from_int(value: u64, bits: usize) -> Result<Self> {
        if bits > ops::MAX_INT_BITS {
            return Err(PortError::bit_width(bits));
        }
        let mut buffer = Self::with_len(bits);
        ops::setint(buffer.storage_mut(), 0, value, bits)?;
        Ok(buffer)
    }

    /// Copies the first `bits` bits of `bytes` into a new buffer.
    pub fn from_bytes(bytes: &[u8], bits: usize) -> Self {
        Self::from_bytes_at(bytes, 0, bits)
    }

    /// Copies `bits` bits of `bytes`, starting at bit `start`, into a new buffer.
    pub fn from_bytes_at(bytes: &[u8], start: usize, bits: usize) -> Self {
        assert!(start + bits <= bytes.len() * 8, "source holds fewer than {} bits", start + bits);
        let mut buffer = Self::with_len(bits);
        ops::copy(buffer.storage_mut(), 0, bytes, start, bits);
        buffer
    }

    /// Packs one-bit-per-byte values into a new buffer.
    pub fn from_unpacked(bits: &[u8]) -> Self {
        let mut buffer = Self::with_len(bits.len());
        ops::pack(buffer.storage_mut(), 0, bits, bits.len());
        buffer
    }

    /// Number of bits in the view.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the view holds no bits.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bit offset of the first bit within [`data`](Self::data)`[0]`; always below 8.
    pub fn offset(&self) -> usize {
        self.start % 8
    }

    /// Bytes spanned by the view, starting with the byte that holds the first bit.
    pub fn data(&self) -> &[u8] {
        let first = self.start / 8;
        let last = ops::bytes_for(self.start + self.len);
        &self.storage[first..last.max(first)]
    }

    /// Returns true if no other buffer shares this storage.
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.storage) == 1
    }

    fn storage_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.storage).as_mut_slice()
    }

    /// Returns the bit at `pos` as 0 or 1.
    pub fn get(&self, pos: usize) -> u8 {
        assert!(pos < self.len, "bit {pos} out of bounds for {} bits", self.len);
        ops::getbit(&self.storage, self.start + pos)
    }

    /// Sets the bit at `pos`; any non-zero `value` sets it to 1.
    pub fn set(&mut self, pos: usize, value: u8) {
        assert!(pos < self.len, "bit {pos} out of bounds for {} bits", self.len);
        let start = self.start;
        ops::setbit(self.storage_mut(), start + pos, value != 0);
    }

    /// Reads `bits` bits at `pos` as an unsigned integer.
    pub fn getint(&self, pos: usize, bits: usize) -> Result<u64> {
        if bits > ops::MAX_INT_BITS {
            return Err(PortError::bit_width(bits));
        }
        assert!(pos + bits <= self.len, "range {pos}+{bits} out of bounds for {} bits", self.len);
        ops::getint(&self.storage, self.start + pos, bits)
    }

    /// Writes the low `bits` bits of `value` at `pos`.
    pub fn setint(&mut self, pos: usize, value: u64, bits: usize) -> Result<()> {
        if bits > ops::MAX_INT_BITS {
            return Err(PortError::bit_width(bits));
        }
        assert!(pos + bits <= self.len, "range {pos}+{bits} out of bounds for {} bits", self.len);
        let start = self.start;
        ops::setint(self.storage_mut(), start + pos, value, bits)
    }

    /// Returns a view of `range` that shares this buffer's storage.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        let (start, end) = resolve(range, self.len);
        Self { storage: Arc::clone(&self.storage), start: self.start + start, len: end - start }
    }

    /// Narrows this view to `range` in place without copying.
    pub fn trim(&mut self, range: impl RangeBounds<usize>) {
        let (start, end) = resolve(range, self.len);
        self.start += start;
        self.len = end - start;
    }

    /// Reallocates storage for `bits` bits, keeping the common leading bits.
    pub fn resize(&mut self, bits: usize) {
        let mut resized = Self::with_len(bits);
        ops::copy(resized.storage_mut(), 0, &self.storage, self.start, self.len.min(bits));
        *self = resized;
    }

    /// Returns a buffer with identical bits in a new allocation.
    pub fn copy(&self) -> Self {
        let mut copied = Self::with_len(self.len);
        ops::copy(copied.storage_mut(), 0, &self.storage, self.start, self.len);
        copied
    }

    /// Overwrites bits starting at `pos` with all of `src`.
    pub fn replace(&mut self, pos: usize, src: &BitBuffer) {
        self.replace_from(pos, src.len(), src, 0);
    }

    /// Overwrites `count` bits starting at `pos` with bits of `src` starting at `src_pos`.
    pub fn replace_from(&mut self, pos: usize, count: usize, src: &BitBuffer, src_pos: usize) {
        assert!(pos + count <= self.len, "replace range out of bounds");
        assert!(src_pos + count <= src.len, "source range out of bounds");
        let start = self.start;
        if Arc::ptr_eq(&self.storage, &src.storage) {
            let src_abs = src.start + src_pos;
            ops::copy_within(self.storage_mut(), src_abs, start + pos, count);
        } else {
            ops::copy(self.storage_mut(), start + pos, &src.storage, src.start + src_pos, count);
        }
    }

    /// Sets every bit in `range` to `value`.
    pub fn fill(&mut self, range: impl RangeBounds<usize>, value: bool) {
        let (first, end) = resolve(range, self.len);
        let start = self.start;
        ops::fill(self.storage_mut(), start + first, end - first, value);
    }

    /// Number of 1 bits.
    pub fn popcount(&self) -> usize {
        ops::popcount(&self.storage, self.start, self.len)
    }

    /// Hamming distance over the shorter of the two buffers.
    pub fn distance(&self, other: &BitBuffer) -> usize {
        let bits = self.len.min(other.len);
        ops::hamming_distance(&self.storage, self.start, &other.storage, other.start, bits)
    }

    /// Position of the first occurrence of `pattern` within `max_distance` bit errors.
    pub fn find(&self, pattern: &BitBuffer, max_distance: usize) -> Option<usize> {
        self.find_from(0, pattern, max_distance)
    }

    /// Like [`find`](Self::find), searching from bit `from`.
    pub fn find_from(&self, from: usize, pattern: &BitBuffer, max_distance: usize) -> Option<usize> {
        if from > self.len {
            return None;
        }
        ops::find(
            &self.storage,
            self.start + from,
            self.len - from,
            &pattern.storage,
            pattern.start,
            pattern.len,
            max_distance,
        )
        .map(|pos| pos - self.start)
    }

    /// Builds a new buffer by alternately taking `take` bits and skipping `skip`.
    pub fn takeskip(&self, take: usize, skip: usize) -> Self {
        let mut result = Self::with_len(ops::takeskip_size(self.len, take, skip));
        ops::takeskip(result.storage_mut(), 0, &self.storage, self.start, self.len, take, skip);
        result
    }

    /// Appends the bits of `other` to the end of this buffer.
    pub fn append(&mut self, other: &BitBuffer) {
        let old_len = self.len;
        self.resize(old_len + other.len);
        ops::copy(self.storage_mut(), old_len, &other.storage, other.start, other.len);
    }

    /// Swaps the contents of two buffers.
    pub fn swap(&mut self, other: &mut BitBuffer) {
        std::mem::swap(self, other);
    }

    /// Expands into one-bit-per-byte values.
    pub fn to_unpacked(&self) -> Vec<u8> {
        let mut bits = vec![0u8; self.len];
        ops::unpack(&mut bits, &self.storage, self.start, self.len);
        bits
    }

    /// Iterates over the bits as 0 or 1.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.len).map(move |pos| ops::getbit(&self.storage, self.start + pos))
    }
}

impl PartialEq for BitBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
            && ops::compare(&self.storage, self.start, &other.storage, other.start, self.len)
                .is_eq()
    }
}

impl Eq for BitBuffer {}

impl Index<usize> for BitBuffer {
    type Output = u8;

    fn index(&self, pos: usize) -> &u8 {
        &BIT_VALUES[usize::from(self.get(pos))]
    }
}

impl fmt::Display for BitBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&ops::to_string(&self.storage, self.start, self.len))
    }
}

impl fmt::Debug for BitBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 64;
        let shown = self.len.min(PREVIEW);
        let mut bits = ops::to_string(&self.storage, self.start, shown);
        if shown < self.len {
            bits.push_str("...");
        }
        f.debug_struct("BitBuffer")
            .field("len", &self.len)
            .field("offset", &self.offset())
            .field("bits", &bits)
            .finish()
    }
}

impl FromStr for BitBuffer {
    type Err = PortError;

    fn from_str(text: &str) -> Result<Self> {
        let mut buffer = Self::with_len(text.len());
        let consumed = ops::parse_string(buffer.storage_mut(), 0, text);
        if consumed != text.len() {
            return Err(PortError::Parse {
                context: "bit string".to_string(),
                details: format!("invalid character at position {}", consumed),
            });
        }
        Ok(buffer)
    }
}
