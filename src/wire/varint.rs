//! QUIC-style variable-length integers (RFC 9000 §16).
//!
//! The top two bits of the first byte select a 1, 2, 4 or 8 byte
//! encoding covering 6, 14, 30 or 62 bit values. Baton frames only ever
//! put 1- or 2-byte varints on the wire for the padding-length prefix,
//! but stream-open headers may carry any stream id, so the full range is
//! implemented.

use super::frame::FrameError;

/// Largest value a varint can encode (62 bits).
pub const MAX: u64 = (1 << 62) - 1;

/// Number of bytes an encoding of `value` occupies.
pub fn len(value: u64) -> usize {
    if value < 1 << 6 {
        1
    } else if value < 1 << 14 {
        2
    } else if value < 1 << 30 {
        4
    } else {
        8
    }
}

/// Number of bytes occupied by the encoding that starts with `first`.
pub fn encoded_len(first: u8) -> usize {
    1 << (first >> 6)
}

/// Encode `value` into `buf`, returning the number of bytes written.
pub fn encode(value: u64, buf: &mut [u8]) -> Result<usize, FrameError> {
    if value > MAX {
        return Err(FrameError::VarintOverflow(value));
    }
    let n = len(value);
    if buf.len() < n {
        return Err(FrameError::BufferTooSmall {
            needed: n,
            available: buf.len(),
        });
    }
    match n {
        1 => buf[0] = value as u8,
        2 => buf[..2].copy_from_slice(&(value as u16 | 0x4000).to_be_bytes()),
        4 => buf[..4].copy_from_slice(&(value as u32 | 0x8000_0000).to_be_bytes()),
        _ => buf[..8].copy_from_slice(&(value | 0xC000_0000_0000_0000).to_be_bytes()),
    }
    Ok(n)
}

/// Decode a varint from the front of `buf`, returning the value and the
/// number of bytes consumed.
pub fn decode(buf: &[u8]) -> Result<(u64, usize), FrameError> {
    let first = *buf.first().ok_or(FrameError::UnexpectedEnd)?;
    let n = encoded_len(first);
    if buf.len() < n {
        return Err(FrameError::UnexpectedEnd);
    }
    let mut value = u64::from(first & 0x3F);
    for byte in &buf[1..n] {
        value = value << 8 | u64::from(*byte);
    }
    Ok((value, n))
}
