//! Wire formats: varints, the baton frame codec and datagram framing.

pub mod datagram;
mod frame;
pub mod varint;

pub use frame::{FillProgress, FrameDecoder, FrameEncoder, FrameError, StreamHeader};
