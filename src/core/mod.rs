//! Core constants, error types and the transport collaborator seam.

pub mod constants;
mod error;
mod traits;

pub use error::{CloseCode, RelayError, TransportError};
pub use traits::{RelayTransport, StreamDirection, StreamId};
