//! Transport-facing layer: session and stream registries plus the
//! operations exposed to the session-establishment collaborator
//! (accept, connect, deregister) and the event routing into sessions.
//!
//! Stream records point at sessions through [`SessionKey`] lookups, not
//! back-pointers: a responder session outlives the streams it relayed
//! on, and an initiator session may briefly outlive its control stream
//! during teardown.

use std::collections::HashMap;

use rand::Rng;
use tracing::debug;

use crate::core::constants::{DEFAULT_TURNS_REQUIRED, MAX_INITIAL_BATON};
use crate::core::{RelayError, RelayTransport, StreamDirection, StreamId};
use crate::session::{
    BatonSession, Role, SendChunk, SessionCtx, SessionKey, StreamMap, StreamRecord,
};

/// Endpoint configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Relay hops after which a session terminates. The value 257
    /// activates the deterministic corruption hook.
    pub turns_required: u64,
    /// Fixed initial baton instead of a random seed. Diagnostics and
    /// tests only; `None` seeds uniformly in 1..=128.
    pub initial_baton: Option<u8>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            turns_required: DEFAULT_TURNS_REQUIRED,
            initial_baton: None,
        }
    }
}

/// One relay endpoint: owns the transport seam, every session running
/// over it, and the stream registry binding the two.
#[derive(Debug)]
pub struct RelayEndpoint<T: RelayTransport> {
    transport: T,
    config: RelayConfig,
    sessions: HashMap<SessionKey, BatonSession>,
    streams: StreamMap,
    next_key: u64,
}

impl<T: RelayTransport> RelayEndpoint<T> {
    /// Create an endpoint over a transport.
    pub fn new(transport: T, config: RelayConfig) -> Self {
        Self {
            transport,
            config,
            sessions: HashMap::new(),
            streams: StreamMap::new(),
            next_key: 0,
        }
    }

    /// Borrow the transport collaborator.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport collaborator.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Look up a session for observation.
    pub fn session(&self, key: SessionKey) -> Option<&BatonSession> {
        self.sessions.get(&key)
    }

    /// Number of sessions currently registered.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn allocate_key(&mut self) -> SessionKey {
        let key = SessionKey(self.next_key);
        self.next_key += 1;
        key
    }

    /// Accept an incoming session anchored to `control_stream`: seed a
    /// random initial baton and start the first relay dispatch.
    pub fn accept(&mut self, control_stream: StreamId) -> Result<SessionKey, RelayError> {
        let key = self.allocate_key();
        let mut session = BatonSession::new(
            key,
            Role::Responder,
            control_stream,
            self.config.turns_required,
        );
        self.streams.insert(
            control_stream,
            StreamRecord {
                stream_id: control_stream,
                direction: StreamDirection::Bidirectional,
                initiated_locally: false,
                fin_sent: false,
                fin_received: false,
                session: key,
            },
        );

        let baton = self
            .config
            .initial_baton
            .unwrap_or_else(|| rand::thread_rng().gen_range(1..=MAX_INITIAL_BATON));
        session.seed_baton(baton);
        debug!(control = %control_stream, baton, "accepted baton session");

        let mut ctx = SessionCtx {
            transport: &mut self.transport,
            streams: &mut self.streams,
        };
        let started = session.begin_relay(&mut ctx);
        self.sessions.insert(key, session);
        started?;
        Ok(key)
    }

    /// Open a session towards a peer: creates the control stream and
    /// registers the session as initiator. The establishment
    /// collaborator performs the actual handshake against `path`.
    pub fn connect(&mut self, path: &str) -> Result<SessionKey, RelayError> {
        let control_stream = self.transport.open_bidi_stream()?;
        let key = self.allocate_key();
        let mut session = BatonSession::new(
            key,
            Role::Initiator,
            control_stream,
            self.config.turns_required,
        );
        session.set_receive_ready();
        self.streams.insert(
            control_stream,
            StreamRecord {
                stream_id: control_stream,
                direction: StreamDirection::Bidirectional,
                initiated_locally: true,
                fin_sent: false,
                fin_received: false,
                session: key,
            },
        );
        debug!(control = %control_stream, path, "outgoing baton connect");
        self.sessions.insert(key, session);
        Ok(key)
    }

    /// Register a remotely-opened relay stream whose open header named
    /// this session.
    pub fn attach_stream(
        &mut self,
        key: SessionKey,
        stream_id: StreamId,
        direction: StreamDirection,
    ) -> Result<(), RelayError> {
        if !self.sessions.contains_key(&key) {
            return Err(RelayError::Unknown);
        }
        self.streams.insert(
            stream_id,
            StreamRecord {
                stream_id,
                direction,
                initiated_locally: false,
                fin_sent: false,
                fin_received: false,
                session: key,
            },
        );
        Ok(())
    }

    fn session_for_stream(&self, stream_id: StreamId) -> Result<SessionKey, RelayError> {
        self.streams
            .get(&stream_id)
            .map(|record| record.session)
            .ok_or(RelayError::Unknown)
    }

    /// Drop a stream record once every direction it has is finished.
    /// Control streams stay until deregistration.
    fn sweep_stream(&mut self, stream_id: StreamId) {
        let spent = match self.streams.get(&stream_id) {
            Some(record) => {
                let control = self
                    .sessions
                    .get(&record.session)
                    .map(|s| s.control_stream_id() == stream_id)
                    .unwrap_or(false);
                record.is_spent() && !control
            }
            None => false,
        };
        if spent {
            self.streams.remove(&stream_id);
            self.transport.discard_stream(stream_id);
        }
    }

    /// Deliver a byte range (possibly empty) and end-of-stream marker
    /// for a stream.
    pub fn deliver_bytes(
        &mut self,
        stream_id: StreamId,
        bytes: &[u8],
        fin: bool,
    ) -> Result<(), RelayError> {
        let key = self.session_for_stream(stream_id)?;
        let session = self.sessions.get_mut(&key).ok_or(RelayError::Unknown)?;
        let mut ctx = SessionCtx {
            transport: &mut self.transport,
            streams: &mut self.streams,
        };
        let outcome = session.on_stream_data(&mut ctx, stream_id, bytes, fin);
        self.sweep_stream(stream_id);
        outcome
    }

    /// The transport offers `buf` bytes of send space on a stream; the
    /// session fills what it can and says whether FIN goes with it.
    pub fn fill_send_buffer(
        &mut self,
        stream_id: StreamId,
        buf: &mut [u8],
    ) -> Result<SendChunk, RelayError> {
        let key = self.session_for_stream(stream_id)?;
        let session = self.sessions.get_mut(&key).ok_or(RelayError::Unknown)?;
        let mut ctx = SessionCtx {
            transport: &mut self.transport,
            streams: &mut self.streams,
        };
        let chunk = session.on_send_space(&mut ctx, stream_id, buf)?;
        self.sweep_stream(stream_id);
        Ok(chunk)
    }

    /// Deliver a datagram observed for a session. Malformed datagrams
    /// are dropped silently.
    pub fn deliver_datagram(&mut self, key: SessionKey, bytes: &[u8]) {
        match self.sessions.get_mut(&key) {
            Some(session) => session.on_datagram(bytes),
            None => debug!(len = bytes.len(), "datagram for unknown session"),
        }
    }

    /// The transport offers datagram space; the session fills one armed
    /// datagram or declines.
    pub fn fill_datagram(&mut self, key: SessionKey, buf: &mut [u8]) -> Option<usize> {
        self.sessions.get_mut(&key)?.fill_datagram(buf)
    }

    /// A stream was abruptly reset: tear the session down.
    pub fn notify_reset(&mut self, stream_id: StreamId) -> Result<(), RelayError> {
        let key = self.session_for_stream(stream_id)?;
        let session = self.sessions.get_mut(&key).ok_or(RelayError::Unknown)?;
        let mut ctx = SessionCtx {
            transport: &mut self.transport,
            streams: &mut self.streams,
        };
        let outcome = session.on_stream_reset(&mut ctx, stream_id);
        self.deregister(key);
        outcome
    }

    /// Unlink every stream still pointing at the session. Responder
    /// sessions are destroyed synchronously; initiator sessions are
    /// kept, marked closed, until the connection handle goes through
    /// [`RelayEndpoint::on_connection_closed`].
    pub fn deregister(&mut self, key: SessionKey) {
        let attached: Vec<StreamId> = self
            .streams
            .values()
            .filter(|record| record.session == key)
            .map(|record| record.stream_id)
            .collect();
        for stream_id in attached {
            self.streams.remove(&stream_id);
            self.transport.discard_stream(stream_id);
        }
        debug!(key = key.0, "deregistered baton session");

        match self.sessions.get_mut(&key) {
            Some(session) if session.role().is_initiator() => session.mark_closed(),
            Some(_) => {
                self.sessions.remove(&key);
            }
            None => {}
        }
    }

    /// The top-level connection handle was torn down: release any
    /// initiator session still registered for collection.
    pub fn on_connection_closed(&mut self, key: SessionKey) {
        self.sessions.remove(&key);
    }
}
