//! Relay dispatcher: decides which stream carries the next baton.
//!
//! The original game's rotation:
//! - the session start, or a baton that arrived on a bidirectional
//!   stream this side opened, relays on a fresh unidirectional stream;
//! - a baton that arrived on a unidirectional stream relays on a fresh
//!   locally-opened bidirectional stream;
//! - a baton that arrived on a remotely-opened bidirectional stream is
//!   answered on that same stream's reverse direction.

use tracing::{debug, warn};

use super::state::{BatonSession, SessionCtx, StreamRecord};
use crate::core::constants::STREAM_HEADER_MAX_LEN;
use crate::core::{CloseCode, RelayError, RelayTransport, StreamDirection, StreamId};
use crate::wire::StreamHeader;

/// Route the next outbound frame onto an appropriate stream and arm it
/// for sending. `arrival` is the stream the current turn came in on, or
/// `None` at session start.
pub(crate) fn relay_next<T: RelayTransport>(
    session: &mut BatonSession,
    ctx: &mut SessionCtx<'_, T>,
    arrival: Option<StreamId>,
) -> Result<(), RelayError> {
    let arrival_record = arrival.and_then(|id| ctx.streams.get(&id).copied());
    let target = match arrival_record {
        Some(record)
            if record.direction == StreamDirection::Bidirectional && !record.initiated_locally =>
        {
            // Reply flows back on the reverse direction of the same stream.
            record.stream_id
        }
        Some(record) if record.direction == StreamDirection::Unidirectional => {
            open_relay_stream(session, ctx, StreamDirection::Bidirectional)?
        }
        _ => open_relay_stream(session, ctx, StreamDirection::Unidirectional)?,
    };

    debug!(stream = %target, turns = session.turn_count() + 1, "relaying baton");
    session.credit_own_turn();
    session.arm_send(target);
    ctx.transport.mark_active_for_send(target, true)?;
    Ok(())
}

/// Open a fresh relay stream and write its session-binding header.
fn open_relay_stream<T: RelayTransport>(
    session: &mut BatonSession,
    ctx: &mut SessionCtx<'_, T>,
    direction: StreamDirection,
) -> Result<StreamId, RelayError> {
    let opened = match direction {
        StreamDirection::Unidirectional => ctx.transport.open_uni_stream(),
        StreamDirection::Bidirectional => ctx.transport.open_bidi_stream(),
    };
    let stream_id = match opened {
        Ok(id) => id,
        Err(err) => {
            warn!(%err, "cannot open relay stream");
            session.close_session(ctx, CloseCode::InsufficientStreamCredit, None)?;
            return Err(err.into());
        }
    };

    let control = session.control_stream_id();
    let header = match direction {
        StreamDirection::Unidirectional => StreamHeader::uni(control),
        StreamDirection::Bidirectional => StreamHeader::bidi(control),
    };
    let mut buf = [0u8; STREAM_HEADER_MAX_LEN];
    let n = header.encode(&mut buf)?;
    ctx.transport.write_stream(stream_id, &buf[..n])?;

    ctx.streams.insert(
        stream_id,
        StreamRecord {
            stream_id,
            direction,
            initiated_locally: true,
            fin_sent: false,
            fin_received: false,
            session: session.key(),
        },
    );
    Ok(stream_id)
}
