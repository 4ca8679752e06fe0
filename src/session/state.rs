//! Baton session state machine.
//!
//! One [`BatonSession`] exists per relay exchange. The transport drives
//! it through one entry point per event kind (stream data, send
//! opportunity, datagram, reset); every protocol decision — turn
//! checking, termination, error signaling, datagram arming — happens
//! here or in the relay dispatcher it invokes.

use tracing::{debug, warn};

use super::relay;
use crate::core::constants::{
    CORRUPTION_FIRST_TURN, CORRUPTION_OFFSET, CORRUPTION_TURNS_REQUIRED, DATAGRAM_MODULUS,
};
use crate::core::{CloseCode, RelayError, RelayTransport, StreamDirection, StreamId};
use crate::wire::{FrameDecoder, FrameEncoder, FrameError, datagram};

/// Handle to a session held in an endpoint registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey(pub u64);

/// Which side of the exchange this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opened the session (client side of the original game).
    Initiator,
    /// Accepted the session.
    Responder,
}

impl Role {
    /// Numeric identity used by the datagram arming rule: a baton value
    /// arms the side-channel when `baton % 7` equals this residue.
    pub fn datagram_residue(self) -> u8 {
        match self {
            Role::Initiator => 1,
            Role::Responder => 0,
        }
    }

    /// Whether this side initiated the session.
    pub fn is_initiator(self) -> bool {
        matches!(self, Role::Initiator)
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatonState {
    /// Control stream established, no frame in flight from this side.
    Ready,
    /// This side has emitted a baton and awaits the echo.
    Sent,
    /// Terminal turn reached; the zero baton is (being) sent.
    Done,
    /// A validation failure was detected.
    Error,
    /// Session torn down.
    Closed,
}

impl BatonState {
    /// Short name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            BatonState::Ready => "ready",
            BatonState::Sent => "sent",
            BatonState::Done => "done",
            BatonState::Error => "error",
            BatonState::Closed => "closed",
        }
    }
}

/// Registry entry for a transport stream touched by a session.
///
/// Records live in a map owned by the endpoint (the transport-facing
/// layer) and point back at their session by key, never by reference:
/// session and stream lifetimes differ.
#[derive(Debug, Clone, Copy)]
pub struct StreamRecord {
    /// Transport stream id.
    pub stream_id: StreamId,
    /// Stream direction.
    pub direction: StreamDirection,
    /// Whether this side opened the stream.
    pub initiated_locally: bool,
    /// End-of-stream asserted by this side.
    pub fin_sent: bool,
    /// End-of-stream received from the peer.
    pub fin_received: bool,
    /// Session the stream belongs to.
    pub session: SessionKey,
}

impl StreamRecord {
    /// Whether every direction the stream has is finished and the
    /// record can go.
    pub fn is_spent(&self) -> bool {
        match self.direction {
            StreamDirection::Unidirectional => {
                if self.initiated_locally {
                    self.fin_sent
                } else {
                    self.fin_received
                }
            }
            StreamDirection::Bidirectional => self.fin_sent && self.fin_received,
        }
    }
}

/// Stream registry shared between the endpoint and session logic.
pub type StreamMap = std::collections::HashMap<StreamId, StreamRecord>;

/// Borrowed view handed to session entry points: the transport seam plus
/// the stream registry, so a decode can trigger a dispatch that opens
/// and arms new streams within the same event.
#[derive(Debug)]
pub struct SessionCtx<'a, T: RelayTransport> {
    /// The multiplexed transport collaborator.
    pub transport: &'a mut T,
    /// Stream records of the owning endpoint.
    pub streams: &'a mut StreamMap,
}

/// Outcome of a send-opportunity event: how much of the offered buffer
/// the session claimed, and whether end-of-stream goes with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendChunk {
    /// Bytes written into the offered buffer.
    pub written: usize,
    /// Assert end-of-stream after these bytes.
    pub fin: bool,
}

impl SendChunk {
    /// The explicit "nothing to send now" acknowledgment.
    pub const NOTHING: Self = Self {
        written: 0,
        fin: false,
    };
}

/// Observational datagram mirror of the baton exchange.
///
/// Armed by the turn check, drained by the transport's datagram poll.
/// Nothing here feeds back into stream-based protocol state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatagramChannel {
    armed: bool,
    next_baton: u8,
    last_received: Option<u8>,
    sent: u64,
    received: u64,
    bytes_sent: u64,
    bytes_received: u64,
}

impl DatagramChannel {
    /// Arm the channel to mirror `baton` on the next poll.
    pub fn arm(&mut self, baton: u8) {
        self.armed = true;
        self.next_baton = baton;
    }

    /// Whether a datagram is waiting to be produced.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Produce the armed datagram into `buf`, if armed and the space
    /// suffices. Clears the armed flag on success.
    pub fn fill(&mut self, buf: &mut [u8]) -> Option<usize> {
        if !self.armed {
            return None;
        }
        let written = datagram::encode(self.next_baton, buf)?;
        self.armed = false;
        self.next_baton = 0;
        self.sent += 1;
        self.bytes_sent += written as u64;
        Some(written)
    }

    /// Record a decoded inbound datagram.
    pub fn on_received(&mut self, baton: u8, wire_len: usize) {
        self.last_received = Some(baton);
        self.received += 1;
        self.bytes_received += wire_len as u64;
    }

    /// Last baton value observed on the side-channel.
    pub fn last_received(&self) -> Option<u8> {
        self.last_received
    }

    /// Datagrams produced so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Datagrams accepted so far.
    pub fn received(&self) -> u64 {
        self.received
    }
}

/// One relay exchange: baton values, turn accounting, codec scratch and
/// termination state.
#[derive(Debug)]
pub struct BatonSession {
    key: SessionKey,
    role: Role,
    state: BatonState,
    control_stream_id: StreamId,

    turns_required: u64,
    turn_count: u64,

    baton_out: u8,
    baton_in: u8,
    first_baton: u8,

    receiving: bool,
    sending: bool,
    active_recv: Option<StreamId>,
    active_send: Option<StreamId>,

    decoder: FrameDecoder,
    encoder: FrameEncoder,
    datagrams: DatagramChannel,

    bytes_received: u64,
    bytes_sent: u64,
}

impl BatonSession {
    /// Create a session anchored to its control stream.
    pub fn new(
        key: SessionKey,
        role: Role,
        control_stream_id: StreamId,
        turns_required: u64,
    ) -> Self {
        Self {
            key,
            role,
            state: BatonState::Ready,
            control_stream_id,
            turns_required,
            turn_count: 0,
            baton_out: 0,
            baton_in: 0,
            first_baton: 0,
            receiving: false,
            sending: false,
            active_recv: None,
            active_send: None,
            decoder: FrameDecoder::new(),
            encoder: FrameEncoder::new(),
            datagrams: DatagramChannel::default(),
            bytes_received: 0,
            bytes_sent: 0,
        }
    }

    /// Registry key of this session.
    pub fn key(&self) -> SessionKey {
        self.key
    }

    /// Which side of the exchange this session plays.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BatonState {
        self.state
    }

    /// Control stream anchoring the session.
    pub fn control_stream_id(&self) -> StreamId {
        self.control_stream_id
    }

    /// Relay hops counted so far (both sides' turns).
    pub fn turn_count(&self) -> u64 {
        self.turn_count
    }

    /// Baton value observed at this side's first turn, for diagnostics.
    pub fn first_baton(&self) -> u8 {
        self.first_baton
    }

    /// Last fully decoded baton value.
    pub fn baton_in(&self) -> u8 {
        self.baton_in
    }

    /// Next baton value to send.
    pub fn baton_out(&self) -> u8 {
        self.baton_out
    }

    /// Baton traffic received on streams, in bytes.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Baton traffic sent on streams, in bytes.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Datagram side-channel counters.
    pub fn datagrams(&self) -> &DatagramChannel {
        &self.datagrams
    }

    /// Seed the very first baton on the accepting side.
    pub(crate) fn seed_baton(&mut self, baton: u8) {
        self.baton_out = baton;
        self.first_baton = baton;
    }

    /// Re-arm for the next inbound frame.
    pub(crate) fn set_receive_ready(&mut self) {
        self.receiving = true;
        self.active_recv = None;
        self.decoder.reset();
    }

    /// First dispatch at session start, before any baton has arrived.
    pub(crate) fn begin_relay<T: RelayTransport>(
        &mut self,
        ctx: &mut SessionCtx<'_, T>,
    ) -> Result<(), RelayError> {
        relay::relay_next(self, ctx, None)
    }

    pub(crate) fn mark_closed(&mut self) {
        self.state = BatonState::Closed;
    }

    pub(crate) fn credit_own_turn(&mut self) {
        self.turn_count += 1;
    }

    pub(crate) fn arm_send(&mut self, stream_id: StreamId) {
        self.sending = true;
        self.active_send = Some(stream_id);
        self.encoder.reset();
    }

    /// Deliver a byte range (possibly empty) for a stream, with the
    /// end-of-stream marker.
    ///
    /// Any `Err` means the session has already signaled its close and
    /// must receive no further events.
    pub fn on_stream_data<T: RelayTransport>(
        &mut self,
        ctx: &mut SessionCtx<'_, T>,
        stream_id: StreamId,
        bytes: &[u8],
        fin: bool,
    ) -> Result<(), RelayError> {
        if stream_id == self.control_stream_id {
            return self.on_control_data(ctx, stream_id, bytes, fin);
        }

        if self.state != BatonState::Ready && self.state != BatonState::Sent {
            warn!(
                stream = %stream_id,
                state = self.state.name(),
                "received baton data when not ready"
            );
            self.close_session(ctx, CloseCode::MalformedMessage, Some("Too much data on stream!"))?;
            return Err(RelayError::NotReceiving(self.state.name()));
        }

        if !bytes.is_empty() {
            // Pin the receive stream on first byte arrival for this turn.
            if self.active_recv.is_none() {
                self.active_recv = Some(stream_id);
            }
            if self.active_recv != Some(stream_id) {
                warn!(
                    stream = %stream_id,
                    expected = %self.active_recv.map(|s| s.0).unwrap_or(u64::MAX),
                    "received baton data on wrong stream"
                );
                self.close_session(ctx, CloseCode::MalformedMessage, Some("Data on wrong stream!"))?;
                return Err(RelayError::UnexpectedStream(stream_id.0));
            }

            self.bytes_received += bytes.len() as u64;
            if let Err(err) = self.decoder.feed(bytes) {
                warn!(stream = %stream_id, %err, "framing violation");
                self.close_session(ctx, CloseCode::MalformedMessage, Some("Too much data on stream!"))?;
                return Err(err.into());
            }
            if self.receiving && self.decoder.is_complete() {
                self.receiving = false;
                self.check(ctx, stream_id)?;
            }
        }

        if fin {
            if let Some(record) = ctx.streams.get_mut(&stream_id) {
                record.fin_received = true;
            }
            if self.receiving && self.active_recv == Some(stream_id) && !self.decoder.is_complete()
            {
                warn!(stream = %stream_id, "fin before baton on data stream");
                self.close_session(ctx, CloseCode::MalformedMessage, Some("Fin stream before baton"))?;
                return Err(RelayError::Framing(FrameError::FinBeforeBaton));
            }
        }
        Ok(())
    }

    /// Control-stream traffic: the session body is carried by the
    /// establishment collaborator; the core only reacts to its FIN.
    fn on_control_data<T: RelayTransport>(
        &mut self,
        ctx: &mut SessionCtx<'_, T>,
        stream_id: StreamId,
        bytes: &[u8],
        fin: bool,
    ) -> Result<(), RelayError> {
        if !bytes.is_empty() {
            debug!(stream = %stream_id, len = bytes.len(), "ignoring control stream payload");
        }
        if fin {
            self.state = BatonState::Closed;
            let fin_sent = ctx
                .streams
                .get_mut(&stream_id)
                .map(|record| {
                    record.fin_received = true;
                    record.fin_sent
                })
                .unwrap_or(true);
            if self.role.is_initiator() {
                ctx.transport.close_connection(0);
            } else if !fin_sent {
                ctx.transport.finish_stream(stream_id)?;
                if let Some(record) = ctx.streams.get_mut(&stream_id) {
                    record.fin_sent = true;
                }
            }
        }
        Ok(())
    }

    /// The turn check, run once a frame is fully decoded.
    fn check<T: RelayTransport>(
        &mut self,
        ctx: &mut SessionCtx<'_, T>,
        stream_id: StreamId,
    ) -> Result<(), RelayError> {
        self.baton_in = self
            .decoder
            .baton()
            .ok_or(RelayError::Framing(FrameError::FinBeforeBaton))?;

        // An all-zero baton ends the exchange.
        if self.baton_in == 0 {
            debug!(
                stream = %stream_id,
                turns = self.turn_count,
                "all zero baton, exchange over"
            );
            self.state = BatonState::Done;
            // A remotely-opened bidirectional stream gets its reverse
            // direction closed before the session goes.
            if let Some(record) = ctx.streams.get_mut(&stream_id) {
                if record.direction == StreamDirection::Bidirectional
                    && !record.initiated_locally
                    && !record.fin_sent
                {
                    record.fin_sent = true;
                    ctx.transport.finish_stream(stream_id)?;
                }
            }
            return self.close_session(ctx, CloseCode::Success, None);
        }

        let expected = self.baton_out.wrapping_add(1);
        let is_wrong = self.state == BatonState::Sent && self.baton_in != expected;
        if self.state == BatonState::Ready && self.first_baton == 0 {
            self.first_baton = self.baton_in;
        }
        if is_wrong {
            self.state = BatonState::Error;
            warn!(
                stream = %stream_id,
                turns = self.turn_count,
                expected,
                actual = self.baton_in,
                "wrong baton"
            );
            self.close_session(ctx, CloseCode::MalformedMessage, None)?;
            return Err(RelayError::WrongBaton {
                expected,
                actual: self.baton_in,
            });
        }

        if self.baton_in % DATAGRAM_MODULUS == self.role.datagram_residue() && self.baton_in != 0 {
            self.datagrams.arm(self.baton_in);
        }

        self.turn_count += 1; // credit the peer's turn just observed
        if self.turn_count >= self.turns_required {
            debug!(
                turns = self.turn_count,
                required = self.turns_required,
                "final baton turn"
            );
            self.state = BatonState::Done;
            self.baton_out = 0;
        } else if self.turns_required == CORRUPTION_TURNS_REQUIRED
            && self.turn_count >= CORRUPTION_FIRST_TURN
        {
            debug!(turns = self.turn_count, "corrupting baton");
            self.baton_out = self.baton_in.wrapping_add(CORRUPTION_OFFSET);
            if self.baton_out == 0 {
                // Never let the corruption path fake a termination.
                self.baton_out = 1;
            }
        } else {
            self.state = BatonState::Sent;
            self.baton_out = self.baton_in.wrapping_add(1);
        }

        relay::relay_next(self, ctx, Some(stream_id))
    }

    /// Fill a send buffer the transport offered for `stream_id`.
    ///
    /// Claims zero bytes explicitly when no frame is queued.
    pub fn on_send_space<T: RelayTransport>(
        &mut self,
        ctx: &mut SessionCtx<'_, T>,
        stream_id: StreamId,
        buf: &mut [u8],
    ) -> Result<SendChunk, RelayError> {
        if self.active_send.is_none() {
            self.active_send = Some(stream_id);
        } else if self.active_send != Some(stream_id) {
            warn!(
                stream = %stream_id,
                expected = %self.active_send.map(|s| s.0).unwrap_or(u64::MAX),
                "asked to provide baton data on wrong stream"
            );
            self.close_session(ctx, CloseCode::MalformedMessage, Some("Sending on wrong stream!"))?;
            return Err(RelayError::UnexpectedStream(stream_id.0));
        }

        if !self.sending {
            return Ok(SendChunk::NOTHING);
        }

        let terminal = self.state == BatonState::Done;
        let progress = self.encoder.fill(self.baton_out, terminal, buf);
        self.bytes_sent += progress.written as u64;
        if progress.complete {
            self.sending = false;
            if let Some(record) = ctx.streams.get_mut(&stream_id) {
                record.fin_sent = true;
            }
            self.state = BatonState::Sent;
            self.set_receive_ready();
        }
        Ok(SendChunk {
            written: progress.written,
            fin: progress.complete,
        })
    }

    /// Observe an inbound datagram. Malformed datagrams are dropped
    /// silently; nothing here affects stream-based state.
    pub fn on_datagram(&mut self, bytes: &[u8]) {
        match datagram::decode(bytes) {
            Some(baton) => self.datagrams.on_received(baton, bytes.len()),
            None => debug!(len = bytes.len(), "dropping malformed baton datagram"),
        }
    }

    /// Fill a datagram buffer the transport offered, or decline.
    pub fn fill_datagram(&mut self, buf: &mut [u8]) -> Option<usize> {
        self.datagrams.fill(buf)
    }

    /// Abrupt stream abandonment: fatal, with a dedicated close code.
    pub fn on_stream_reset<T: RelayTransport>(
        &mut self,
        ctx: &mut SessionCtx<'_, T>,
        stream_id: StreamId,
    ) -> Result<(), RelayError> {
        warn!(stream = %stream_id, "received reset, closing the session");
        self.close_session(ctx, CloseCode::AllStreamsReset, None)?;
        self.state = BatonState::Closed;
        if self.role.is_initiator() {
            ctx.transport.close_connection(0);
        }
        Err(RelayError::PeerReset)
    }

    /// Send the single close message on the control stream and mark the
    /// session closed. Idempotent: once the control stream is finished,
    /// further calls are no-ops.
    pub fn close_session<T: RelayTransport>(
        &mut self,
        ctx: &mut SessionCtx<'_, T>,
        code: CloseCode,
        reason: Option<&str>,
    ) -> Result<(), RelayError> {
        debug!(
            control = %self.control_stream_id,
            code = code.code(),
            "closing session"
        );
        if let Some(record) = ctx.streams.get_mut(&self.control_stream_id) {
            if !record.fin_sent {
                record.fin_sent = true;
                let reason = reason.unwrap_or_else(|| code.default_reason());
                ctx.transport
                    .send_close_message(self.control_stream_id, code, reason)?;
                self.state = BatonState::Closed;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_datagram_residue() {
        assert_eq!(Role::Initiator.datagram_residue(), 1);
        assert_eq!(Role::Responder.datagram_residue(), 0);
        assert!(Role::Initiator.is_initiator());
        assert!(!Role::Responder.is_initiator());
    }

    #[test]
    fn test_datagram_channel_arm_and_fill() {
        let mut channel = DatagramChannel::default();
        assert!(!channel.is_armed());
        let mut buf = [0u8; 32];
        assert_eq!(channel.fill(&mut buf), None);

        channel.arm(0x2A);
        assert!(channel.is_armed());

        // Declined when space is too small; stays armed.
        assert_eq!(channel.fill(&mut buf[..2]), None);
        assert!(channel.is_armed());

        let written = channel.fill(&mut buf).unwrap();
        assert_eq!(written, 32);
        assert_eq!(buf[31], 0x2A);
        assert!(!channel.is_armed());
        assert_eq!(channel.sent(), 1);

        // Cleared after production.
        assert_eq!(channel.fill(&mut buf), None);
    }

    #[test]
    fn test_datagram_channel_receive_counters() {
        let mut channel = DatagramChannel::default();
        channel.on_received(0x63, 40);
        channel.on_received(0x64, 12);
        assert_eq!(channel.last_received(), Some(0x64));
        assert_eq!(channel.received(), 2);
    }

    #[test]
    fn test_stream_record_spent() {
        let mut record = StreamRecord {
            stream_id: StreamId(4),
            direction: StreamDirection::Unidirectional,
            initiated_locally: true,
            fin_sent: false,
            fin_received: false,
            session: SessionKey(0),
        };
        assert!(!record.is_spent());
        record.fin_sent = true;
        assert!(record.is_spent());

        record.direction = StreamDirection::Bidirectional;
        assert!(!record.is_spent());
        record.fin_received = true;
        assert!(record.is_spent());

        record.direction = StreamDirection::Unidirectional;
        record.initiated_locally = false;
        record.fin_sent = false;
        assert!(record.is_spent());
    }

    #[test]
    fn test_new_session_is_ready() {
        let session = BatonSession::new(SessionKey(7), Role::Responder, StreamId(0), 127);
        assert_eq!(session.state(), BatonState::Ready);
        assert_eq!(session.turn_count(), 0);
        assert_eq!(session.first_baton(), 0);
        assert_eq!(session.control_stream_id(), StreamId(0));
        assert_eq!(session.key(), SessionKey(7));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(BatonState::Ready.name(), "ready");
        assert_eq!(BatonState::Sent.name(), "sent");
        assert_eq!(BatonState::Done.name(), "done");
        assert_eq!(BatonState::Error.name(), "error");
        assert_eq!(BatonState::Closed.name(), "closed");
    }
}
