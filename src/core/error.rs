//! Error types and close-signaling vocabulary for the BATON protocol.

use thiserror::Error;

use crate::wire::FrameError;

/// Application close codes carried by the session close message.
///
/// Every session teardown, graceful or not, sends exactly one close
/// message on the control stream carrying one of these codes plus a
/// human-readable reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CloseCode {
    /// The exchange ran to completion.
    Success = 0x00,
    /// Insufficient stream credit to keep relaying.
    InsufficientStreamCredit = 0x01,
    /// A malformed baton message was received.
    MalformedMessage = 0x02,
    /// All baton streams have been reset by the peer.
    AllStreamsReset = 0x03,
    /// An external watchdog gave up waiting for the next message.
    IdleTimeout = 0x04,
}

impl CloseCode {
    /// Numeric wire value of this close code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Default human-readable reason sent when the caller supplies none.
    pub fn default_reason(self) -> &'static str {
        match self {
            CloseCode::Success => "Have a nice day",
            CloseCode::InsufficientStreamCredit => {
                "There is insufficient stream credit to continue the protocol"
            }
            CloseCode::MalformedMessage => "Received a malformed Baton message",
            CloseCode::AllStreamsReset => "All baton streams have been reset",
            CloseCode::IdleTimeout => "Got tired of waiting for the next message",
        }
    }
}

/// Faults raised by the transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport cannot open further streams.
    #[error("stream credit exhausted")]
    StreamsExhausted,

    /// The underlying connection is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// I/O error surfaced by the transport.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level outcome of delivering an event to a session.
///
/// Any non-success outcome is fatal to the session: the close message has
/// already been emitted and the caller must stop delivering further events.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Framing violation on a relay stream.
    #[error("framing violation: {0}")]
    Framing(#[from] FrameError),

    /// The received baton did not match the expected sequence value.
    #[error("wrong baton: expected {expected:#04x}, got {actual:#04x}")]
    WrongBaton {
        /// Value the sequence check required.
        expected: u8,
        /// Value actually decoded from the wire.
        actual: u8,
    },

    /// Data arrived for a stream other than the active receive stream.
    #[error("data on unexpected stream {0}")]
    UnexpectedStream(u64),

    /// Data arrived while the session was in no state to receive it.
    #[error("data received while in state {0}")]
    NotReceiving(&'static str),

    /// The peer abruptly reset a relay stream.
    #[error("peer reset a baton stream")]
    PeerReset,

    /// The transport refused an operation the relay needed.
    #[error("transport fault: {0}")]
    Transport(#[from] TransportError),

    /// An event was delivered for an unknown stream or session.
    #[error("unknown stream or session")]
    Unknown,

    /// The session is already closed.
    #[error("session closed")]
    SessionClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_values() {
        assert_eq!(CloseCode::Success.code(), 0);
        assert_eq!(CloseCode::InsufficientStreamCredit.code(), 1);
        assert_eq!(CloseCode::MalformedMessage.code(), 2);
        assert_eq!(CloseCode::AllStreamsReset.code(), 3);
        assert_eq!(CloseCode::IdleTimeout.code(), 4);
    }

    #[test]
    fn test_close_code_reasons() {
        assert_eq!(CloseCode::Success.default_reason(), "Have a nice day");
        assert!(
            CloseCode::MalformedMessage
                .default_reason()
                .contains("malformed")
        );
    }
}
