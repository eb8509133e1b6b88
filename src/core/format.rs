//! Purpose: Define the on-stream layout of a string field and its length arithmetic.
//! Exports: layout constants, `payload_len`, `declared_len`, `encoded_len`, `encode_field`.
//! Role: Single source of truth shared by the decoder, the region walker, and `pack`.
//! Invariants: Length prefix is a little-endian `i16` counting payload plus terminator.
//! Invariants: A field occupies exactly `L + 2` bytes on the stream.

use crate::core::error::{Error, ErrorKind};

pub const LENGTH_PREFIX_LEN: usize = 2;
pub const TERMINATOR_LEN: usize = 1;
/// Written after every payload; readers skip it without checking the value.
pub const TERMINATOR: u8 = 0;
pub const MAX_PAYLOAD_LEN: usize = i16::MAX as usize - TERMINATOR_LEN;

/// Converts a declared length prefix into the number of payload bytes that follow it.
pub fn payload_len(declared: i16) -> Result<usize, Error> {
    if declared <= 0 {
        return Err(Error::new(ErrorKind::MalformedLength).with_message(format!(
            "declared length {declared} leaves no room for the terminator"
        )));
    }
    Ok(declared as usize - TERMINATOR_LEN)
}

pub fn declared_len(payload_len: usize) -> Result<i16, Error> {
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(Error::new(ErrorKind::Usage).with_message(format!(
            "string of {payload_len} bytes exceeds the {MAX_PAYLOAD_LEN} byte field limit"
        )));
    }
    Ok((payload_len + TERMINATOR_LEN) as i16)
}

pub fn encoded_len(payload_len: usize) -> usize {
    LENGTH_PREFIX_LEN + payload_len + TERMINATOR_LEN
}

pub fn encode_field(out: &mut Vec<u8>, payload: &[u8]) -> Result<(), Error> {
    let declared = declared_len(payload.len())?;
    out.reserve(encoded_len(payload.len()));
    out.extend_from_slice(&declared.to_le_bytes());
    out.extend_from_slice(payload);
    out.push(TERMINATOR);
    Ok(())
}
