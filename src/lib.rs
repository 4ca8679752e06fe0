//! # BATON Protocol
//!
//! **B**ack-**A**nd-forth **T**urn-**O**rdered **N**once relay.
//!
//! BATON is a small application protocol for exercising multiplexed,
//! flow-controlled transports: two peers pass an incrementing one-byte
//! counter (the *baton*) back and forth, each turn on a freshly chosen
//! stream, with an unreliable datagram side-channel mirroring the value,
//! until a termination condition retires the session. It deliberately
//! stresses session lifecycle, stream fan-out, partial-delivery framing
//! and graceful/abrupt teardown.
//!
//! ## The relay game
//!
//! The responder seeds a random baton and sends it on a new
//! unidirectional stream. Whoever receives a baton adds one and relays
//! it: a baton from a unidirectional stream goes out on a new local
//! bidirectional stream; a baton from a remotely-opened bidirectional
//! stream is answered on that same stream; a baton from a locally-opened
//! bidirectional stream goes out on a new unidirectional stream. A zero
//! baton ends the exchange.
//!
//! ```text
//! C->S: connect
//! S->C: Uni(250)
//! C->S: BidiReq(251)
//! S->C: BidiResp(252)
//! C->S: Uni(253)
//! S->C: BidiReq(254)
//! C->S: BidiResp(255)
//! S->C: Uni(0)
//! C->S: FIN
//! ```
//!
//! ## Modules
//!
//! - [`core`]: constants, error types and the transport collaborator seam
//! - [`wire`]: varints, the resumable baton frame codec, datagram framing
//! - [`session`]: the per-exchange state machine and relay dispatcher
//! - [`endpoint`]: registries and the accept/connect/deregister surface
//!
//! The crate is sans-IO: stream creation, flow control and delivery are
//! owned by a transport implementing
//! [`RelayTransport`](core::RelayTransport), which drives sessions
//! through one entry point per event kind.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod endpoint;
pub mod session;
pub mod wire;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        CloseCode, RelayError, RelayTransport, StreamDirection, StreamId, TransportError,
    };
    pub use crate::endpoint::{RelayConfig, RelayEndpoint};
    pub use crate::session::{
        BatonSession, BatonState, Role, SendChunk, SessionKey, StreamRecord,
    };
    pub use crate::wire::{FrameDecoder, FrameEncoder, StreamHeader};
}

// Re-export commonly used items at crate root
pub use crate::core::{CloseCode, RelayError, RelayTransport, StreamDirection, StreamId};
pub use crate::endpoint::{RelayConfig, RelayEndpoint};
pub use crate::session::{BatonSession, BatonState, Role, SendChunk, SessionKey};
