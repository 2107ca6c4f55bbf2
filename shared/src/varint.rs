//! Variable-length signed integers as used by the game protocol.
//!
//! Layout: `ESDDDDDD EDDDDDDD ...` where `E` is the extend bit, `S` the sign
//! bit of the first byte and `D` data bits. Negative values are inverted before
//! packing and re-inverted when unpacking, so `-1` packs into a single byte.

use crate::error::WireError;

/// Upper bound of bytes a 32-bit value can occupy.
pub const MAX_VARINT_LEN: usize = 5;

const EXTEND: u8 = 0b1000_0000;
const SIGN: u8 = 0b0100_0000;
const FIRST_DATA: u8 = 0b0011_1111;
const NEXT_DATA: u8 = 0b0111_1111;

/// Appends the packed form of `value` to `out` and returns the number of bytes written.
pub fn encode(value: i32, out: &mut Vec<u8>) -> usize {
    let start = out.len();

    // arithmetic shift smears the sign over bit 6
    let mut byte = ((value >> 25) as u8) & SIGN;
    let mut rest = value ^ (value >> 31);

    byte |= (rest as u8) & FIRST_DATA;
    rest >>= 6;

    while rest != 0 {
        out.push(byte | EXTEND);
        byte = (rest as u8) & NEXT_DATA;
        rest >>= 7;
    }
    out.push(byte);

    out.len() - start
}

/// Number of bytes `encode` would produce for `value`.
pub fn encoded_len(value: i32) -> usize {
    let mut rest = (value ^ (value >> 31)) >> 6;
    let mut len = 1;
    while rest != 0 {
        rest >>= 7;
        len += 1;
    }
    len
}

/// Unpacks one value from the front of `data`.
///
/// Returns the value together with the number of bytes consumed.
pub fn decode(data: &[u8]) -> Result<(i32, usize), WireError> {
    let first = *data.first().ok_or(WireError::UnexpectedEnd)?;

    let sign = ((first >> 6) & 1) as i32;
    let mut value = (first & FIRST_DATA) as u32;
    let mut current = first;
    let mut index = 0;
    let mut shift = 6;

    while current & EXTEND != 0 {
        index += 1;
        if index >= MAX_VARINT_LEN {
            return Err(WireError::Overflow);
        }
        current = *data.get(index).ok_or(WireError::UnexpectedEnd)?;
        value |= ((current & NEXT_DATA) as u32) << shift;
        shift += 7;
    }

    Ok(((value as i32) ^ -sign, index + 1))
}
