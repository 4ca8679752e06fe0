//! Protocol constants for the BATON relay protocol.
//!
//! These values are fixed by the protocol and MUST NOT be changed.

// =============================================================================
// BATON FRAME (wire format: varint(padding_length) || padding || baton byte)
// =============================================================================

/// Largest padding length representable in a 1-byte length prefix.
pub const MAX_PADDING_VARINT1: u64 = 0x3F;

/// Largest padding length representable in a 2-byte length prefix.
pub const MAX_PADDING_VARINT2: u64 = 0x3FFF;

/// Decode scratch capacity: the padding-length prefix of a baton frame
/// never exceeds two bytes.
pub const PADDING_PREFIX_MAX_LEN: usize = 2;

// =============================================================================
// STREAM OPEN HEADERS (varint(type tag) || varint(control stream id))
// =============================================================================

/// Type tag opening a unidirectional relay stream.
pub const STREAM_TYPE_UNI_RELAY: u64 = 0x54;

/// Type tag opening a bidirectional relay stream.
pub const STREAM_TYPE_BIDI_RELAY: u64 = 0x41;

/// Upper bound on an encoded stream-open header (two 8-byte varints).
pub const STREAM_HEADER_MAX_LEN: usize = 16;

// =============================================================================
// DATAGRAM SIDE-CHANNEL
// =============================================================================

/// Maximum total size of a baton datagram.
pub const MAX_DATAGRAM_SIZE: usize = 1536;

/// Minimum useful datagram size: 2-byte length prefix plus the baton byte.
pub const MIN_DATAGRAM_SIZE: usize = 3;

/// A baton value arms the datagram channel when `baton % DATAGRAM_MODULUS`
/// equals the role's numeric identity.
pub const DATAGRAM_MODULUS: u8 = 7;

// =============================================================================
// SESSION
// =============================================================================

/// Default number of relay turns before the exchange terminates.
pub const DEFAULT_TURNS_REQUIRED: u64 = 127;

/// The `turns_required` value that activates the deterministic
/// corruption hook.
pub const CORRUPTION_TURNS_REQUIRED: u64 = 257;

/// Turn count at which the corruption hook starts perturbing the baton.
pub const CORRUPTION_FIRST_TURN: u64 = 4;

/// Offset added to the baton by the corruption hook (wrapping).
pub const CORRUPTION_OFFSET: u8 = 31;

/// Largest initial baton value seeded on accept (uniform in 1..=128).
pub const MAX_INITIAL_BATON: u8 = 128;
