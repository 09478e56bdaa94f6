//! Integer encodings shared by the header, the block framing and the lengths channel
//!
//! Two encodings are used throughout an archive:
//!
//! * **Variable-length integers**: base-128 groups, most significant group first,
//!   with the high bit set on every byte except the last one. These prefix the
//!   header counters and every compressed block.
//! * **Length words**: little-endian `u32` words. A word equal to `u32::MAX` means
//!   "add `u32::MAX` and keep reading", so lengths of any size fit in the stream.

use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{HeaderError, Result};

/// Size of a single length word in bytes
pub const SIZE_LENGTH_WORD: usize = 4;

/// Writes `n` as a variable-length integer
pub fn write_varint<W: Write>(writer: &mut W, mut n: u64) -> io::Result<()> {
    // at most 10 groups of 7 bits in a u64
    let mut groups = [0u8; 10];
    let mut i = groups.len();
    loop {
        i -= 1;
        groups[i] = (n & 0x7F) as u8;
        n >>= 7;
        if n == 0 {
            break;
        }
    }
    let last = groups.len() - 1;
    for g in &mut groups[i..last] {
        *g |= 0x80;
    }
    writer.write_all(&groups[i..])
}

/// Reads a variable-length integer
///
/// # Errors
///
/// * `HeaderError::VarintOverflow` if the value does not fit in a `u64`
/// * I/O errors (including `UnexpectedEof`) from the reader
pub fn read_varint<R: Read>(reader: &mut R) -> Result<u64> {
    let mut n = 0u64;
    let mut byte = [0u8; 1];
    loop {
        reader.read_exact(&mut byte)?;
        if n > (u64::MAX >> 7) {
            return Err(HeaderError::VarintOverflow.into());
        }
        n = (n << 7) | u64::from(byte[0] & 0x7F);
        if byte[0] & 0x80 == 0 {
            return Ok(n);
        }
    }
}

/// Appends a sequence length to the lengths channel buffer
pub fn write_length(buffer: &mut Vec<u8>, mut length: u64) {
    let max = u64::from(u32::MAX);
    while length >= max {
        buffer.extend_from_slice(&u32::MAX.to_le_bytes());
        length -= max;
    }
    buffer.extend_from_slice(&(length as u32).to_le_bytes());
}

/// Reads one sequence length from `buffer` starting at `*pos`
///
/// Returns `None` if the buffer ends before a terminating word is found.
/// On success `*pos` is advanced past the consumed words.
pub fn read_length(buffer: &[u8], pos: &mut usize) -> Option<u64> {
    let mut length = 0u64;
    let mut cursor = *pos;
    loop {
        let word = buffer.get(cursor..cursor + SIZE_LENGTH_WORD)?;
        let value = LittleEndian::read_u32(word);
        cursor += SIZE_LENGTH_WORD;
        length += u64::from(value);
        if value != u32::MAX {
            *pos = cursor;
            return Some(length);
        }
    }
}
