//! Baton frame codec.
//!
//! Each relay stream carries exactly one frame:
//!
//! ```text
//! +-------------------------+------------------+------------+
//! | varint(padding_length)  | padding (zeros)  | baton byte |
//! | 1 or 2 bytes            | padding_length   | 1 byte     |
//! +-------------------------+------------------+------------+
//! ```
//!
//! The transport may deliver the frame split at any offset, including
//! inside the length prefix, and may offer send buffers of any size, so
//! both directions of the codec are resumable: [`FrameDecoder`] carries
//! an explicit state machine across `feed` calls, and [`FrameEncoder`]
//! remembers how much of its committed padding is still owed.

use thiserror::Error;

use super::varint;
use crate::core::StreamId;
use crate::core::constants::{
    MAX_PADDING_VARINT1, MAX_PADDING_VARINT2, PADDING_PREFIX_MAX_LEN, STREAM_TYPE_BIDI_RELAY,
    STREAM_TYPE_UNI_RELAY,
};

/// Framing violations detected by the codec.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Ran out of bytes in the middle of a varint.
    #[error("unexpected end of encoded data")]
    UnexpectedEnd,

    /// Value does not fit in a varint.
    #[error("value {0} exceeds varint range")]
    VarintOverflow(u64),

    /// Output buffer cannot hold the encoding.
    #[error("buffer too small: need {needed}, have {available}")]
    BufferTooSmall {
        /// Bytes the encoding requires.
        needed: usize,
        /// Bytes the buffer offers.
        available: usize,
    },

    /// The padding-length prefix announced an encoding longer than the
    /// 2-byte maximum the protocol allows.
    #[error("padding length prefix of {0} bytes exceeds the 2-byte maximum")]
    OversizedPaddingPrefix(usize),

    /// Bytes kept arriving after the baton byte.
    #[error("{extra} byte(s) after the baton byte")]
    TrailingData {
        /// How many surplus bytes were delivered.
        extra: usize,
    },

    /// End-of-stream arrived before the baton byte was decoded.
    #[error("fin before baton")]
    FinBeforeBaton,
}

/// Where the decoder stands inside the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Buffering the padding-length prefix one byte at a time until its
    /// announced length is present.
    LengthPrefix {
        buf: [u8; PADDING_PREFIX_MAX_LEN],
        filled: usize,
    },
    /// Skipping declared padding.
    Padding { remaining: u64 },
    /// The next byte is the baton.
    Baton,
    /// Frame fully decoded.
    Complete { baton: u8 },
}

/// Resumable decoder for one baton frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDecoder {
    state: DecodeState,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder awaiting the first byte of a frame.
    pub fn new() -> Self {
        Self {
            state: DecodeState::LengthPrefix {
                buf: [0; PADDING_PREFIX_MAX_LEN],
                filled: 0,
            },
        }
    }

    /// Consume one delivery chunk.
    ///
    /// Accepts splits at any offset. Bytes arriving after the baton byte
    /// are a framing violation.
    pub fn feed(&mut self, mut bytes: &[u8]) -> Result<(), FrameError> {
        while !bytes.is_empty() {
            match &mut self.state {
                DecodeState::LengthPrefix { buf, filled } => {
                    buf[*filled] = bytes[0];
                    *filled += 1;
                    bytes = &bytes[1..];

                    let prefix_len = varint::encoded_len(buf[0]);
                    if prefix_len > PADDING_PREFIX_MAX_LEN {
                        return Err(FrameError::OversizedPaddingPrefix(prefix_len));
                    }
                    if *filled == prefix_len {
                        let (padding, _) = varint::decode(&buf[..prefix_len])?;
                        self.state = if padding == 0 {
                            DecodeState::Baton
                        } else {
                            DecodeState::Padding { remaining: padding }
                        };
                    }
                }
                DecodeState::Padding { remaining } => {
                    let take = (*remaining).min(bytes.len() as u64) as usize;
                    *remaining -= take as u64;
                    bytes = &bytes[take..];
                    if *remaining == 0 {
                        self.state = DecodeState::Baton;
                    }
                }
                DecodeState::Baton => {
                    self.state = DecodeState::Complete { baton: bytes[0] };
                    bytes = &bytes[1..];
                }
                DecodeState::Complete { .. } => {
                    return Err(FrameError::TrailingData { extra: bytes.len() });
                }
            }
        }
        Ok(())
    }

    /// The decoded baton, once the frame is complete.
    pub fn baton(&self) -> Option<u8> {
        match self.state {
            DecodeState::Complete { baton } => Some(baton),
            _ => None,
        }
    }

    /// Whether the whole frame, baton byte included, has been consumed.
    pub fn is_complete(&self) -> bool {
        matches!(self.state, DecodeState::Complete { .. })
    }

    /// Apply the end-of-stream marker: a frame must be complete when its
    /// stream finishes.
    pub fn finish(&self) -> Result<u8, FrameError> {
        self.baton().ok_or(FrameError::FinBeforeBaton)
    }

    /// Re-arm for the next frame.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Progress made by one [`FrameEncoder::fill`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillProgress {
    /// Bytes written into the offered buffer.
    pub written: usize,
    /// Whether the baton byte went out, finishing the frame.
    pub complete: bool,
}

/// Resumable encoder for one baton frame.
///
/// The total padding length is committed on the first `fill` call for a
/// frame and never revisited, however much or little space later calls
/// offer: the terminal frame carries no padding, a 1-byte first window
/// commits to the 1-byte prefix maximum, anything larger commits to the
/// 2-byte prefix maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameEncoder {
    padding_required: Option<u64>,
    padding_sent: u64,
}

impl FrameEncoder {
    /// Create an encoder with no padding commitment yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write as much of the frame as fits into `buf`.
    pub fn fill(&mut self, baton: u8, terminal: bool, buf: &mut [u8]) -> FillProgress {
        if buf.is_empty() {
            return FillProgress {
                written: 0,
                complete: false,
            };
        }

        let (required, prefix_len) = match self.padding_required {
            Some(required) => (required, 0),
            None => {
                let required = if terminal {
                    0
                } else if buf.len() == 1 {
                    MAX_PADDING_VARINT1
                } else {
                    MAX_PADDING_VARINT2
                };
                self.padding_required = Some(required);
                (required, varint::len(required))
            }
        };

        let outstanding = (required - self.padding_sent) as usize;
        let complete = prefix_len + outstanding + 1 <= buf.len();
        let pad_now = if complete {
            outstanding
        } else {
            buf.len() - prefix_len
        };

        let mut written = 0;
        if prefix_len > 0 {
            // The prefix is 1 byte when the window is 1 byte, 2 bytes
            // otherwise, so it always fits in the first window whole.
            written += varint::encode(required, buf)
                .expect("padding prefix fits the first send window");
        }
        buf[written..written + pad_now].fill(0);
        self.padding_sent += pad_now as u64;
        written += pad_now;
        if complete {
            buf[written] = baton;
            written += 1;
        }

        FillProgress { written, complete }
    }

    /// Padding length committed for the current frame, if decided.
    pub fn padding_required(&self) -> Option<u64> {
        self.padding_required
    }

    /// Re-arm for the next frame.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Header written at the front of every newly opened relay stream,
/// binding it to its session's control stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Stream type tag.
    pub stream_type: u64,
    /// Control stream identifying the session.
    pub control_stream_id: StreamId,
}

impl StreamHeader {
    /// Header for a new unidirectional relay stream.
    pub fn uni(control_stream_id: StreamId) -> Self {
        Self {
            stream_type: STREAM_TYPE_UNI_RELAY,
            control_stream_id,
        }
    }

    /// Header for a new bidirectional relay stream.
    pub fn bidi(control_stream_id: StreamId) -> Self {
        Self {
            stream_type: STREAM_TYPE_BIDI_RELAY,
            control_stream_id,
        }
    }

    /// Encode into `buf`, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, FrameError> {
        let n = varint::encode(self.stream_type, buf)?;
        Ok(n + varint::encode(self.control_stream_id.0, &mut buf[n..])?)
    }

    /// Decode from the front of `buf`, returning the header and the
    /// number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), FrameError> {
        let (stream_type, n) = varint::decode(buf)?;
        let (control, m) = varint::decode(&buf[n..])?;
        Ok((
            Self {
                stream_type,
                control_stream_id: StreamId(control),
            },
            n + m,
        ))
    }
}
