//! Stream socket handles.
//!
//! A [`SocketHandle`] is what a session owns: a ready state, a queue of
//! inbound [`SocketEvent`]s and a non-blocking outbound sender. The other
//! end, a [`SocketPeer`], is driven either by the WebSocket driver in
//! [`ws_connector`] or directly by tests.
//!
//! ```text
//!   session ── SocketHandle ══ mpsc ══ SocketPeer ── ws driver task ── server
//! ```
//!
//! Opening is synchronous: [`Connector::open`] returns a handle in
//! [`ReadyState::Connecting`] immediately and the handshake completes in the
//! background. Sends are gated on [`ReadyState::Open`]; anything sent while
//! connecting or closed is dropped, never queued.

pub mod ws_connector;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

pub use ws_connector::WsConnector;

/// Stream endpoints exposed by the resolver's web API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Run log stream.
    RunLog,
    /// Audit log stream.
    AuditLog,
    /// Periodic metrics snapshots.
    Metrics,
    /// Interactive terminal.
    Terminal,
}

impl Endpoint {
    /// URL path of the endpoint.
    pub fn path(self) -> &'static str {
        match self {
            Self::RunLog => "/api/log/stream",
            Self::AuditLog => "/api/log/audit/stream",
            Self::Metrics => "/api/stats/metrics",
            Self::Terminal => "/api/tool/term",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Connection state, mirroring the browser WebSocket ready states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    /// Handshake in progress.
    Connecting = 0,
    /// Connected; sends are delivered.
    Open = 1,
    /// Close requested, not yet acknowledged.
    Closing = 2,
    /// Terminated.
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// `Open` or `Connecting`: the only states a parked socket may be in.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Open | Self::Connecting)
    }
}

/// Ready state shared between a handle and its peer.
#[derive(Debug, Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ReadyState::Connecting as u8)))
    }

    fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move to `next` unless already `Closed`.
    fn advance(&self, next: ReadyState) {
        let _ = self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
            (cur != ReadyState::Closed as u8).then_some(next as u8)
        });
    }
}

/// Binary large object that must be read before it can be decoded.
pub struct Blob {
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl Blob {
    /// Wrap an async reader.
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Box::new(reader),
        }
    }

    /// Read the whole object into memory.
    pub async fn materialize(mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob").finish_non_exhaustive()
    }
}

/// An inbound message as delivered by the transport.
#[derive(Debug)]
pub enum Inbound {
    /// Binary buffer, ready to decode.
    Binary(Vec<u8>),
    /// Text message.
    Text(String),
    /// Binary object requiring asynchronous materialization.
    Blob(Blob),
}

impl Inbound {
    /// Resolve binary and blob messages to bytes.
    ///
    /// Returns `None` for text messages or when a blob cannot be read, which
    /// binary-framed streams treat as invalid data.
    pub async fn into_binary(self) -> Option<Vec<u8>> {
        match self {
            Self::Binary(data) => Some(data),
            Self::Blob(blob) => match blob.materialize().await {
                Ok(data) => Some(data),
                Err(e) => {
                    log::warn!("[Socket] Failed to read blob message: {}", e);
                    None
                }
            },
            Self::Text(_) => None,
        }
    }
}

/// Event observed on a socket, in arrival order.
#[derive(Debug)]
pub enum SocketEvent {
    /// Handshake completed.
    Open,
    /// Message received.
    Message(Inbound),
    /// Transport error. Always followed by [`SocketEvent::Close`].
    Error(String),
    /// Connection terminated.
    Close {
        /// Close code (1006 when the connection dropped without a frame).
        code: u16,
        /// Close reason sent by the server.
        reason: String,
    },
}

/// Message queued for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Binary frame.
    Binary(Vec<u8>),
    /// Text frame.
    Text(String),
    /// Close the connection.
    Close,
}

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// Session-side end of a stream socket.
pub struct SocketHandle {
    id: u64,
    endpoint: Endpoint,
    state: SharedState,
    outbound: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedReceiver<SocketEvent>,
}

impl fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHandle")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.ready_state())
            .finish_non_exhaustive()
    }
}

impl SocketHandle {
    /// Create a connected handle/peer pair in `Connecting` state.
    pub fn pair(endpoint: Endpoint) -> (Self, SocketPeer) {
        let state = SharedState::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = Self {
            id: NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed),
            endpoint,
            state: state.clone(),
            outbound: outbound_tx,
            events: events_rx,
        };
        let peer = SocketPeer {
            state,
            outbound: outbound_rx,
            events: events_tx,
        };
        (handle, peer)
    }

    /// Process-unique socket identifier (for logs and tests).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Endpoint this socket is attached to.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Current ready state.
    pub fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    /// `Open` or `Connecting`.
    pub fn is_live(&self) -> bool {
        self.ready_state().is_live()
    }

    /// Send a binary frame if the socket is open. Returns whether it was sent.
    pub fn send_binary(&self, data: Vec<u8>) -> bool {
        self.send(Outbound::Binary(data))
    }

    /// Send a text frame if the socket is open. Returns whether it was sent.
    pub fn send_text(&self, text: &str) -> bool {
        self.send(Outbound::Text(text.to_string()))
    }

    fn send(&self, message: Outbound) -> bool {
        if self.ready_state() != ReadyState::Open {
            log::trace!("[Socket] Dropping send on {} socket {}", self.endpoint, self.id);
            return false;
        }
        self.outbound.send(message).is_ok()
    }

    /// Request close. Idempotent; a no-op once closed.
    pub fn close(&self) {
        if !self.is_live() {
            return;
        }
        self.state.advance(ReadyState::Closing);
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Wait for the next event. `None` once the peer is gone and the queue is drained.
    pub async fn next_event(&mut self) -> Option<SocketEvent> {
        self.events.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_next_event(&mut self) -> Option<SocketEvent> {
        self.events.try_recv().ok()
    }
}

/// Transport-side end of a stream socket.
#[derive(Debug)]
pub struct SocketPeer {
    state: SharedState,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl SocketPeer {
    /// Current ready state as seen by the handle.
    pub fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    /// Handshake completed.
    pub fn open(&self) {
        self.state.advance(ReadyState::Open);
        self.emit(SocketEvent::Open);
    }

    /// Deliver a binary message.
    pub fn deliver_binary(&self, data: impl Into<Vec<u8>>) {
        self.deliver(Inbound::Binary(data.into()));
    }

    /// Deliver any inbound message.
    pub fn deliver(&self, message: Inbound) {
        self.emit(SocketEvent::Message(message));
    }

    /// Report a transport error.
    pub fn fail(&self, error: impl Into<String>) {
        self.emit(SocketEvent::Error(error.into()));
    }

    /// Terminate the connection.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        self.state.set(ReadyState::Closed);
        self.emit(SocketEvent::Close {
            code,
            reason: reason.into(),
        });
    }

    /// Wait for the next outbound message. `None` once the handle is dropped.
    pub async fn next_outbound(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Take the next outbound message without waiting.
    pub fn try_next_outbound(&mut self) -> Option<Outbound> {
        self.outbound.try_recv().ok()
    }

    /// Drain every outbound message queued so far.
    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        std::iter::from_fn(|| self.try_next_outbound()).collect()
    }

    fn emit(&self, event: SocketEvent) {
        // The handle may already be gone; nothing left to notify.
        let _ = self.events.send(event);
    }
}

/// Opens stream sockets.
///
/// Implementations return immediately with a handle in `Connecting` state;
/// the handshake result arrives as an [`SocketEvent::Open`] or
/// [`SocketEvent::Error`]/[`SocketEvent::Close`] pair.
pub trait Connector: Send + Sync {
    /// Open a socket to `endpoint`.
    fn open(&self, endpoint: Endpoint) -> SocketHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pair_is_connecting_and_drops_sends() {
        let (handle, mut peer) = SocketHandle::pair(Endpoint::Terminal);
        assert_eq!(handle.ready_state(), ReadyState::Connecting);
        assert!(!handle.send_binary(vec![3]));
        assert!(peer.drain_outbound().is_empty());
    }

    #[test]
    fn open_socket_delivers_sends_in_order() {
        let (mut handle, mut peer) = SocketHandle::pair(Endpoint::RunLog);
        peer.open();
        assert!(matches!(handle.try_next_event(), Some(SocketEvent::Open)));
        assert!(handle.send_binary(vec![1, 1]));
        assert!(handle.send_text("ls\r"));
        assert_eq!(
            peer.drain_outbound(),
            vec![Outbound::Binary(vec![1, 1]), Outbound::Text("ls\r".into())]
        );
    }

    #[test]
    fn close_moves_to_closing_then_peer_closes() {
        let (mut handle, mut peer) = SocketHandle::pair(Endpoint::Metrics);
        peer.open();
        handle.close();
        assert_eq!(handle.ready_state(), ReadyState::Closing);
        assert_eq!(peer.drain_outbound(), vec![Outbound::Close]);
        peer.close(1000, "");
        assert_eq!(handle.ready_state(), ReadyState::Closed);
        // Drain Open, then Close.
        assert!(matches!(handle.try_next_event(), Some(SocketEvent::Open)));
        assert!(matches!(
            handle.try_next_event(),
            Some(SocketEvent::Close { code: 1000, .. })
        ));
        // Closing a closed socket does nothing.
        handle.close();
        assert!(peer.drain_outbound().is_empty());
    }

    #[test]
    fn late_open_does_not_revive_closed_socket() {
        let (handle, peer) = SocketHandle::pair(Endpoint::Terminal);
        peer.close(1006, "");
        peer.open();
        assert_eq!(handle.ready_state(), ReadyState::Closed);
    }

    #[tokio::test]
    async fn blob_materializes_to_same_bytes() {
        let inbound = Inbound::Blob(Blob::new(&b"\x00hello"[..]));
        assert_eq!(inbound.into_binary().await, Some(b"\x00hello".to_vec()));
        assert_eq!(Inbound::Text("x".into()).into_binary().await, None);
    }

    #[test]
    fn endpoint_paths() {
        assert_eq!(Endpoint::RunLog.path(), "/api/log/stream");
        assert_eq!(Endpoint::AuditLog.path(), "/api/log/audit/stream");
        assert_eq!(Endpoint::Metrics.path(), "/api/stats/metrics");
        assert_eq!(Endpoint::Terminal.path(), "/api/tool/term");
    }
}
