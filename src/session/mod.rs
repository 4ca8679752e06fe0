//! Session layer: the baton state machine and its relay dispatcher.

mod relay;
mod state;

pub use state::{
    BatonSession, BatonState, DatagramChannel, Role, SendChunk, SessionCtx, SessionKey, StreamMap,
    StreamRecord,
};
