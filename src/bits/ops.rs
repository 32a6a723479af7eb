//! Bit-level primitives over byte slices.
//!
//! Bits are numbered MSB-first: bit 0 is the most significant bit of
//! `data[0]`, bit 8 the most significant bit of `data[1]`. Every function
//! accepts arbitrary bit positions and widths; bits outside the addressed
//! range are never modified.
//!
//! ```rust
//! use bulkio::bits::ops;
//!
//! let mut data = [0u8; 2];
//! ops::setint(&mut data, 4, 0xAB, 8).unwrap();
//! assert_eq!(data, [0x0A, 0xB0]);
//! assert_eq!(ops::getint(&data, 4, 8).unwrap(), 0xAB);
//! ```

use std::cmp::Ordering;

use crate::{PortError, Result};

/// Widest integer that [`getint`] and [`setint`] can move in one call.
pub const MAX_INT_BITS: usize = 64;

/// Number of bytes needed to hold `bits` bits.
pub const fn bytes_for(bits: usize) -> usize {
    bits.div_ceil(8)
}

#[inline]
fn low_mask(bits: usize) -> u8 {
    if bits >= 8 { 0xFF } else { ((1u16 << bits) - 1) as u8 }
}

#[inline]
fn read_bits(data: &[u8], mut pos: usize, bits: usize) -> u64 {
    let mut value = 0u64;
    let mut remaining = bits;
    while remaining > 0 {
        let avail = 8 - pos % 8;
        let take = avail.min(remaining);
        let chunk = (data[pos / 8] >> (avail - take)) & low_mask(take);
        value = (value << take) | u64::from(chunk);
        pos += take;
        remaining -= take;
    }
    value
}

#[inline]
fn write_bits(data: &mut [u8], mut pos: usize, value: u64, bits: usize) {
    let mut remaining = bits;
    while remaining > 0 {
        let avail = 8 - pos % 8;
        let take = avail.min(remaining);
        let chunk = ((value >> (remaining - take)) as u8) & low_mask(take);
        let shift = avail - take;
        let mask = low_mask(take) << shift;
        let byte = &mut data[pos / 8];
        *byte = (*byte & !mask) | (chunk << shift);
        pos += take;
        remaining -= take;
    }
}

/// Returns the bit at `pos` as 0 or 1.
pub fn getbit(data: &[u8], pos: usize) -> u8 {
    (data[pos / 8] >> (7 - pos % 8)) & 1
}

/// Sets or clears the bit at `pos`.
pub fn setbit(data: &mut [u8], pos: usize, value: bool) {
    let mask = 0x80u8 >> (pos % 8);
    if value {
        data[pos / 8] |= mask;
    } else {
        data[pos / 8] &= !mask;
    }
}

/// Reads `bits` bits starting at `pos` as a big-endian unsigned integer.
///
/// # Errors
///
/// Returns [`PortError::Length`] when `bits` exceeds 64.
pub fn getint(data: &[u8], pos: usize, bits: usize) -> Result<u64> {
    if bits > MAX_INT_BITS {
        return Err(PortError::bit_width(bits));
    }
    Ok(read_bits(data, pos, bits))
}

/// Writes the low `bits` bits of `value` starting at `pos`.
///
/// # Errors
///
/// Returns [`PortError::Length`] when `bits` exceeds 64.
pub fn setint(data: &mut [u8], pos: usize, value: u64, bits: usize) -> Result<()> {
    if bits > MAX_INT_BITS {
        return Err(PortError::bit_width(bits));
    }
    write_bits(data, pos, value, bits);
    Ok(())
}

/// Sets `bits` bits starting at `pos` to `value`.
pub fn fill(data: &mut [u8], pos: usize, bits: usize, value: bool) {
    let pattern = if value { u64::MAX } else { 0 };
    let head = ((8 - pos % 8) % 8).min(bits);
    write_bits(data, pos, pattern, head);

    let pos = pos + head;
    let remaining = bits - head;
    let full = remaining / 8;
    let first = pos / 8;
    data[first..first + full].fill(if value { 0xFF } else { 0x00 });

    let tail = remaining % 8;
    write_bits(data, pos + full * 8, pattern, tail);
}

/// Packs `bits` one-bit-per-byte values from `src` into `dest` at `pos`.
///
/// Any non-zero source byte becomes a 1 bit.
pub fn pack(dest: &mut [u8], pos: usize, src: &[u8], bits: usize) {
    let mut index = 0;
    while index + 8 <= bits {
        let byte =
            src[index..index + 8].iter().fold(0u8, |acc, &bit| (acc << 1) | u8::from(bit != 0));
        write_bits(dest, pos + index, u64::from(byte), 8);
        index += 8;
    }
    for offset in index..bits {
        setbit(dest, pos + offset, src[offset] != 0);
    }
}

/// Unpacks `bits` bits from `src` at `pos` into one-bit-per-byte values.
pub fn unpack(dest: &mut [u8], src: &[u8], pos: usize, bits: usize) {
    for (offset, slot) in dest.iter_mut().take(bits).enumerate() {
        *slot = getbit(src, pos + offset);
    }
}

/// Counts the 1 bits in the range.
pub fn popcount(data: &[u8], pos: usize, bits: usize) -> usize {
    let head = ((8 - pos % 8) % 8).min(bits);
    let mut count = read_bits(data, pos, head).count_ones() as usize;

    let pos = pos + head;
    let remaining = bits - head;
    let full = remaining / 8;
    let first = pos / 8;
    count += data[first..first + full].iter().map(|b| b.count_ones() as usize).sum::<usize>();

    let tail = remaining % 8;
    count + read_bits(data, pos + full * 8, tail).count_ones() as usize
}

/// Compares two bit ranges lexicographically, independent of alignment.
pub fn compare(a: &[u8], a_pos: usize, b: &[u8], b_pos: usize, bits: usize) -> Ordering {
    let mut offset = 0;
    while offset < bits {
        let chunk = (bits - offset).min(MAX_INT_BITS);
        let lhs = read_bits(a, a_pos + offset, chunk);
        let rhs = read_bits(b, b_pos + offset, chunk);
        match lhs.cmp(&rhs) {
            Ordering::Equal => offset += chunk,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Counts the positions at which two bit ranges differ.
pub fn hamming_distance(a: &[u8], a_pos: usize, b: &[u8], b_pos: usize, bits: usize) -> usize {
    let mut distance = 0;
    let mut offset = 0;
    while offset < bits {
        let chunk = (bits - offset).min(MAX_INT_BITS);
        let diff = read_bits(a, a_pos + offset, chunk) ^ read_bits(b, b_pos + offset, chunk);
        distance += diff.count_ones() as usize;
        offset += chunk;
    }
    distance
}

fn distance_within(
    a: &[u8],
    a_pos: usize,
    b: &[u8],
    b_pos: usize,
    bits: usize,
    max_distance: usize,
) -> bool {
    let mut distance = 0;
    let mut offset = 0;
    while offset < bits {
        let chunk = (bits - offset).min(MAX_INT_BITS);
        let diff = read_bits(a, a_pos + offset, chunk) ^ read_bits(b, b_pos + offset, chunk);
        distance += diff.count_ones() as usize;
        if distance > max_distance {
            return false;
        }
        offset += chunk;
    }
    true
}

/// Copies `bits` bits from `src` at `src_pos` into `dest` at `dest_pos`.
///
/// When both positions share the same bit alignment the middle of the range
/// is moved with a byte copy.
pub fn copy(dest: &mut [u8], dest_pos: usize, src: &[u8], src_pos: usize, bits: usize) {
    if bits == 0 {
        return;
    }

    if dest_pos % 8 == src_pos % 8 {
        let head = ((8 - dest_pos % 8) % 8).min(bits);
        write_bits(dest, dest_pos, read_bits(src, src_pos, head), head);

        let dest_pos = dest_pos + head;
        let src_pos = src_pos + head;
        let remaining = bits - head;
        let full = remaining / 8;
        dest[dest_pos / 8..dest_pos / 8 + full]
            .copy_from_slice(&src[src_pos / 8..src_pos / 8 + full]);

        let tail = remaining % 8;
        let consumed = full * 8;
        write_bits(dest, dest_pos + consumed, read_bits(src, src_pos + consumed, tail), tail);
        return;
    }

    let mut offset = 0;
    while offset < bits {
        let chunk = (bits - offset).min(MAX_INT_BITS);
        write_bits(dest, dest_pos + offset, read_bits(src, src_pos + offset, chunk), chunk);
        offset += chunk;
    }
}

/// Copies a bit range within one buffer; the ranges may overlap.
pub fn copy_within(data: &mut [u8], src_pos: usize, dest_pos: usize, bits: usize) {
    if bits == 0 || src_pos == dest_pos {
        return;
    }

    if dest_pos < src_pos {
        let mut offset = 0;
        while offset < bits {
            let chunk = (bits - offset).min(MAX_INT_BITS);
            let value = read_bits(data, src_pos + offset, chunk);
            write_bits(data, dest_pos + offset, value, chunk);
            offset += chunk;
        }
    } else {
        let mut end = bits;
        while end > 0 {
            let chunk = end.min(MAX_INT_BITS);
            let start = end - chunk;
            let value = read_bits(data, src_pos + start, chunk);
            write_bits(data, dest_pos + start, value, chunk);
            end = start;
        }
    }
}

/// Searches `haystack[pos..pos + len]` for `needle`, allowing up to
/// `max_distance` mismatched bits.
///
/// Returns the absolute bit position of the first match.
pub fn find(
    haystack: &[u8],
    pos: usize,
    len: usize,
    needle: &[u8],
    needle_pos: usize,
    needle_len: usize,
    max_distance: usize,
) -> Option<usize> {
    if needle_len > len {
        return None;
    }
    (pos..=pos + len - needle_len).find(|&start| {
        distance_within(haystack, start, needle, needle_pos, needle_len, max_distance)
    })
}

/// Copies `take` bits, skips `skip` bits, and repeats until `src_len` source
/// bits have been visited. The final take is truncated at the end of the
/// source.
///
/// Returns the number of bits written to `dest`.
pub fn takeskip(
    dest: &mut [u8],
    dest_pos: usize,
    src: &[u8],
    src_pos: usize,
    src_len: usize,
    take: usize,
    skip: usize,
) -> usize {
    if take == 0 {
        return 0;
    }
    let stride = take.saturating_add(skip);
    let mut written = 0;
    let mut offset = 0;
    while offset < src_len {
        let count = take.min(src_len - offset);
        copy(dest, dest_pos + written, src, src_pos + offset, count);
        written += count;
        offset = offset.saturating_add(stride);
    }
    written
}

/// Number of bits [`takeskip`] writes for a source of `src_len` bits.
pub fn takeskip_size(src_len: usize, take: usize, skip: usize) -> usize {
    if take == 0 {
        return 0;
    }
    let stride = take.saturating_add(skip);
    let whole = src_len / stride;
    whole * take + (src_len % stride).min(take)
}

/// Formats a bit range as ASCII '0' and '1' characters.
pub fn to_string(data: &[u8], pos: usize, bits: usize) -> String {
    (0..bits).map(|offset| if getbit(data, pos + offset) == 1 { '1' } else { '0' }).collect()
}

/// Parses '0' and '1' characters into `dest` at `pos`.
///
/// Parsing stops at the first other character or when `dest` is full; the
/// bits parsed so far stay written. Returns the number of characters consumed.
pub fn parse_string(dest: &mut [u8], pos: usize, text: &str) -> usize {
    let capacity = (dest.len() * 8).saturating_sub(pos);
    let mut consumed = 0;
    for ch in text.bytes().take(capacity) {
        match ch {
            b'0' => setbit(dest, pos + consumed, false),
            b'1' => setbit(dest, pos + consumed, true),
            _ => break,
        }
        consumed += 1;
    }
    consumed
}
