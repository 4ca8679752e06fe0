//! Transport collaborator interface.
//!
//! The relay core never touches sockets. Stream creation, flow control,
//! reliable delivery and datagram delivery are owned by a multiplexed
//! transport that implements [`RelayTransport`]; the core consumes it
//! through this narrow seam and is driven by the transport's events
//! (stream data, end-of-stream, reset, send opportunity, datagram).

use std::fmt;

use super::error::{CloseCode, TransportError};

/// Identifier of a transport stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StreamId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Direction of a transport stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    /// Data flows from the opener only.
    Unidirectional,
    /// Data flows both ways.
    Bidirectional,
}

/// Multiplexed transport consumed by the relay core.
///
/// Implementations are expected to deliver events for one session
/// sequentially; the core performs no locking of its own.
pub trait RelayTransport {
    /// Open a new locally-initiated unidirectional stream.
    fn open_uni_stream(&mut self) -> Result<StreamId, TransportError>;

    /// Open a new locally-initiated bidirectional stream.
    fn open_bidi_stream(&mut self) -> Result<StreamId, TransportError>;

    /// Queue bytes on a stream (used for stream-open headers).
    fn write_stream(&mut self, stream: StreamId, bytes: &[u8]) -> Result<(), TransportError>;

    /// Mark a stream as wanting send opportunities. The transport will
    /// answer with calls into the core's send-buffer entry point.
    fn mark_active_for_send(
        &mut self,
        stream: StreamId,
        active: bool,
    ) -> Result<(), TransportError>;

    /// Assert end-of-stream without further data.
    fn finish_stream(&mut self, stream: StreamId) -> Result<(), TransportError>;

    /// Send the session close message on the control stream.
    fn send_close_message(
        &mut self,
        stream: StreamId,
        code: CloseCode,
        reason: &str,
    ) -> Result<(), TransportError>;

    /// Tear down the underlying connection.
    fn close_connection(&mut self, code: u64);

    /// Drop the transport's association with a stream the relay is done
    /// with. The transport owns the stream's memory, not the core.
    fn discard_stream(&mut self, stream: StreamId);
}
