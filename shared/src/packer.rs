//! Append-only record packer and its cursor-based counterpart.

use crate::error::WireError;
use crate::varint;

/// Terminates every string field on the wire.
pub const STRING_TERMINATOR: u8 = 0x00;

/// Control characters that survive [`Unpacker::next_sanitized_string`] when
/// whitespace should be kept.
pub const WHITESPACE_CONTROLS: &[u8] = b"\t\n\r";

/// Builds a record by appending fields in wire order.
#[derive(Debug, Default, Clone)]
pub struct Packer {
    buffer: Vec<u8>,
}

impl Packer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn add_int(&mut self, value: i32) -> &mut Self {
        varint::encode(value, &mut self.buffer);
        self
    }

    /// Appends the string bytes followed by the terminator.
    pub fn add_string(&mut self, value: &str) -> &mut Self {
        self.buffer.extend_from_slice(value.as_bytes());
        self.buffer.push(STRING_TERMINATOR);
        self
    }

    pub fn add_byte(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    pub fn add_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(value);
        self
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Reads fields from the front of a borrowed record.
///
/// Every `next_*` call advances the cursor on success and leaves it untouched
/// on failure.
#[derive(Debug, Clone)]
pub struct Unpacker<'a> {
    data: &'a [u8],
}

impl<'a> Unpacker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn next_int(&mut self) -> Result<i32, WireError> {
        let (value, used) = varint::decode(self.data)?;
        self.data = &self.data[used..];
        Ok(value)
    }

    /// Next string exactly as sent, minus the terminator.
    pub fn next_string(&mut self) -> Result<String, WireError> {
        let raw = self.next_raw_string()?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    /// Next string with control bytes below 0x20 replaced by a space,
    /// except for the bytes listed in `keep`.
    pub fn next_sanitized_string(&mut self, keep: &[u8]) -> Result<String, WireError> {
        let raw = self.next_raw_string()?;
        let cleaned: Vec<u8> = raw
            .iter()
            .map(|&b| if b < 0x20 && !keep.contains(&b) { b' ' } else { b })
            .collect();
        Ok(String::from_utf8_lossy(&cleaned).into_owned())
    }

    pub fn next_byte(&mut self) -> Result<u8, WireError> {
        let (&first, rest) = self.data.split_first().ok_or(WireError::UnexpectedEnd)?;
        self.data = rest;
        Ok(first)
    }

    pub fn next_bytes(&mut self, size: usize) -> Result<&'a [u8], WireError> {
        if self.data.len() < size {
            return Err(WireError::UnexpectedEnd);
        }
        let (head, rest) = self.data.split_at(size);
        self.data = rest;
        Ok(head)
    }

    fn next_raw_string(&mut self) -> Result<&'a [u8], WireError> {
        if self.data.is_empty() {
            return Err(WireError::UnexpectedEnd);
        }
        let end = self
            .data
            .iter()
            .position(|&b| b == STRING_TERMINATOR)
            .ok_or(WireError::MalformedRecord("string terminator missing"))?;
        let raw = &self.data[..end];
        self.data = &self.data[end + 1..];
        Ok(raw)
    }
}
