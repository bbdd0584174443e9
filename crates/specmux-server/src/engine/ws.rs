//! Non-blocking WebSocket engine over `tungstenite`.
//!
//! Everything runs on the caller's thread: the listener and every accepted
//! socket are non-blocking and serviced in short ticks inside
//! [`Engine::poll`]. Connection ids come from a monotonic counter and are
//! never reused within one engine.
//!
//! Writability is level-triggered but reported at most once per `poll`:
//! alongside other events, after the first tick spent waiting, or when the
//! timeout expires. An armed idle connection therefore wakes the reactor
//! once per tick instead of spinning on an always-writable socket.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use specmux_core::ConnectionId;
use tracing::{debug, info, warn};
use tungstenite::handshake::MidHandshake;
use tungstenite::handshake::server::{NoCallback, ServerHandshake};
use tungstenite::protocol::WebSocketConfig;
use tungstenite::{HandshakeError, Message, WebSocket};

use super::{Engine, EngineEvent};
use crate::errors::{EngineError, MuxError};

type PendingHandshake = MidHandshake<ServerHandshake<TcpStream, NoCallback>>;

/// Tunables for [`WsEngine`].
#[derive(Clone, Copy, Debug)]
pub struct WsEngineOptions {
    /// Bytes a connection may hold unflushed before sends are refused.
    pub max_write_buffer_bytes: usize,
    /// Sleep between socket sweeps while waiting for events.
    pub tick: Duration,
}

impl Default for WsEngineOptions {
    fn default() -> Self {
        Self {
            max_write_buffer_bytes: 4 * 1024 * 1024,
            tick: Duration::from_millis(5),
        }
    }
}

struct Peer {
    socket: WebSocket<TcpStream>,
    writable_requested: bool,
}

/// WebSocket server engine.
pub struct WsEngine {
    listener: TcpListener,
    config: WebSocketConfig,
    tick: Duration,
    next_id: u64,
    handshaking: HashMap<ConnectionId, PendingHandshake>,
    peers: HashMap<ConnectionId, Peer>,
}

impl WsEngine {
    /// Bind a non-blocking listener on `addr`.
    ///
    /// Failure here is a startup failure: nothing else can proceed.
    pub fn bind(addr: &str, options: WsEngineOptions) -> Result<Self, MuxError> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| MuxError::Startup(format!("failed to bind {addr}: {e}")))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| MuxError::Startup(format!("failed to configure listener: {e}")))?;
        let config =
            WebSocketConfig::default().max_write_buffer_size(options.max_write_buffer_bytes);
        if let Ok(local) = listener.local_addr() {
            info!(addr = %local, "websocket engine listening");
        }
        Ok(Self {
            listener,
            config,
            tick: options.tick,
            next_id: 1,
            handshaking: HashMap::new(),
            peers: HashMap::new(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Upgraded connections currently held.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn allocate_id(&mut self) -> ConnectionId {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn accept_pending(&mut self, events: &mut Vec<EngineEvent>) -> Result<(), EngineError> {
        loop {
            let (stream, peer_addr) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::Interrupted
                            | ErrorKind::ConnectionAborted
                            | ErrorKind::ConnectionReset
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Err(e) = stream.set_nonblocking(true) {
                warn!(%peer_addr, error = %e, "dropping connection, cannot make non-blocking");
                continue;
            }
            let _ = stream.set_nodelay(true);
            let id = self.allocate_id();
            debug!(conn_id = %id, %peer_addr, "tcp connection accepted");
            self.start_handshake(id, stream, events);
        }
    }

    fn start_handshake(
        &mut self,
        id: ConnectionId,
        stream: TcpStream,
        events: &mut Vec<EngineEvent>,
    ) {
        match tungstenite::accept_with_config(stream, Some(self.config.clone())) {
            Ok(socket) => self.establish(id, socket, events),
            Err(HandshakeError::Interrupted(mid)) => {
                let _ = self.handshaking.insert(id, mid);
            }
            Err(HandshakeError::Failure(e)) => {
                debug!(conn_id = %id, error = %e, "websocket handshake failed");
            }
        }
    }

    fn progress_handshakes(&mut self, events: &mut Vec<EngineEvent>) {
        if self.handshaking.is_empty() {
            return;
        }
        for (id, mid) in std::mem::take(&mut self.handshaking) {
            match mid.handshake() {
                Ok(socket) => self.establish(id, socket, events),
                Err(HandshakeError::Interrupted(mid)) => {
                    let _ = self.handshaking.insert(id, mid);
                }
                Err(HandshakeError::Failure(e)) => {
                    debug!(conn_id = %id, error = %e, "websocket handshake failed");
                }
            }
        }
    }

    fn establish(
        &mut self,
        id: ConnectionId,
        socket: WebSocket<TcpStream>,
        events: &mut Vec<EngineEvent>,
    ) {
        let _ = self.peers.insert(
            id,
            Peer {
                socket,
                writable_requested: false,
            },
        );
        events.push(EngineEvent::Established(id));
    }

    fn read_peers(&mut self, events: &mut Vec<EngineEvent>) {
        let mut closed = Vec::new();
        for (&id, peer) in &mut self.peers {
            loop {
                match peer.socket.read() {
                    Ok(Message::Text(text)) => {
                        events.push(EngineEvent::Receive(id, text.as_bytes().to_vec()));
                    }
                    Ok(Message::Binary(data)) => {
                        events.push(EngineEvent::Receive(id, data.to_vec()));
                    }
                    // Pings are answered and close frames acknowledged by
                    // tungstenite on the next read or flush.
                    Ok(_) => {}
                    Err(tungstenite::Error::Io(e)) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(
                        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                    ) => {
                        closed.push(id);
                        break;
                    }
                    Err(e) => {
                        debug!(conn_id = %id, error = %e, "read failed, dropping connection");
                        closed.push(id);
                        break;
                    }
                }
            }
        }
        for id in closed {
            let _ = self.peers.remove(&id);
            events.push(EngineEvent::Closed(id));
        }
    }

    fn report_writable(&mut self, events: &mut Vec<EngineEvent>) {
        let mut closed = Vec::new();
        for (&id, peer) in &mut self.peers {
            if !peer.writable_requested {
                continue;
            }
            match peer.socket.flush() {
                Ok(()) => {
                    peer.writable_requested = false;
                    events.push(EngineEvent::Writable(id));
                }
                Err(tungstenite::Error::Io(e)) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => {
                    debug!(conn_id = %id, error = %e, "flush failed, dropping connection");
                    closed.push(id);
                }
            }
        }
        for id in closed {
            let _ = self.peers.remove(&id);
            events.push(EngineEvent::Closed(id));
        }
    }
}

impl Engine for WsEngine {
    fn poll(
        &mut self,
        timeout: Option<Duration>,
        events: &mut Vec<EngineEvent>,
    ) -> Result<(), EngineError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut waited = false;
        loop {
            self.accept_pending(events)?;
            self.progress_handshakes(events);
            self.read_peers(events);

            let now = Instant::now();
            let expired = deadline.is_some_and(|d| now >= d);
            if !events.is_empty() || expired {
                self.report_writable(events);
                return Ok(());
            }
            if waited {
                self.report_writable(events);
                if !events.is_empty() {
                    return Ok(());
                }
            }
            let nap = match deadline {
                Some(d) => self.tick.min(d.saturating_duration_since(now)),
                None => self.tick,
            };
            std::thread::sleep(nap);
            waited = true;
        }
    }

    fn try_send(&mut self, id: ConnectionId, bytes: &[u8]) -> Result<usize, EngineError> {
        let peer = self
            .peers
            .get_mut(&id)
            .ok_or(EngineError::UnknownConnection(id))?;
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| EngineError::Protocol(format!("payload is not utf-8: {e}")))?;
        match peer.socket.write(Message::text(text)) {
            Ok(()) => {}
            // Buffered inside tungstenite, flushed later.
            Err(tungstenite::Error::Io(e)) if e.kind() == ErrorKind::WouldBlock => {
                return Ok(bytes.len());
            }
            Err(tungstenite::Error::WriteBufferFull(_)) => return Ok(0),
            Err(tungstenite::Error::Io(e)) => return Err(EngineError::Io(e)),
            Err(e) => return Err(EngineError::Protocol(e.to_string())),
        }
        match peer.socket.flush() {
            Ok(()) => Ok(bytes.len()),
            Err(tungstenite::Error::Io(e)) if e.kind() == ErrorKind::WouldBlock => Ok(bytes.len()),
            Err(tungstenite::Error::Io(e)) => Err(EngineError::Io(e)),
            Err(e) => Err(EngineError::Protocol(e.to_string())),
        }
    }

    fn request_writable(&mut self, id: ConnectionId) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.writable_requested = true;
        }
    }

    fn close(&mut self, id: ConnectionId) {
        if let Some(mut peer) = self.peers.remove(&id) {
            let _ = peer.socket.close(None);
            let _ = peer.socket.flush();
            debug!(conn_id = %id, "connection closed by server");
        }
        let _ = self.handshaking.remove(&id);
    }
}
