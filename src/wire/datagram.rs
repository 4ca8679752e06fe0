//! Datagram side-channel wire format.
//!
//! Datagrams mirror the stream frame layout (padding-length varint,
//! padding, one baton byte) but are purely observational: a malformed
//! datagram is dropped without touching session state, so decoding
//! reports failure as `None` rather than an error.

use super::varint;
use crate::core::constants::{MAX_DATAGRAM_SIZE, MIN_DATAGRAM_SIZE};

/// Encode one baton datagram into `buf`, filling the offered space up to
/// [`MAX_DATAGRAM_SIZE`] with a 2-byte length prefix and zero padding.
///
/// Returns the datagram length, or `None` when the space offered is too
/// small to carry prefix and baton.
pub fn encode(baton: u8, buf: &mut [u8]) -> Option<usize> {
    let space = buf.len().min(MAX_DATAGRAM_SIZE);
    if space < MIN_DATAGRAM_SIZE {
        return None;
    }
    let padding = space - MIN_DATAGRAM_SIZE;
    buf[0] = 0x40 | ((padding >> 8) & 0x3F) as u8;
    buf[1] = (padding & 0xFF) as u8;
    buf[2..2 + padding].fill(0);
    buf[2 + padding] = baton;
    Some(space)
}

/// Decode a baton datagram: padding-length varint, that much padding,
/// exactly one trailing baton byte.
///
/// Returns `None` for anything inconsistent with the declared layout.
pub fn decode(bytes: &[u8]) -> Option<u8> {
    let (padding, n) = varint::decode(bytes).ok()?;
    let baton_at = n.checked_add(usize::try_from(padding).ok()?)?;
    if baton_at + 1 != bytes.len() {
        return None;
    }
    Some(bytes[baton_at])
}
