//! Run-log and audit-log view sessions.
//!
//! A [`LogStreamSession`] owns one socket at a time, decodes its frames into
//! a bounded [`LogBuffer`] and exposes the controls the log view offers:
//! switching stream, changing the server log level, pausing, clearing and
//! copying. Log sessions are never parked; switching away closes the socket.
//!
//! The owner drives the session by calling [`LogStreamSession::step`] in a
//! loop (or feeding events to [`LogStreamSession::handle_event`]).

use std::sync::Arc;

use crate::auth::{self, AuthProbe, UserSession};
use crate::clipboard::{self, Clipboard};
use crate::codec::{self, FrameError, LineColor, LogControl, LogKind, LogLevel};
use crate::constants::{
    ABNORMAL_CLOSE_CODES, FOLLOW_BOTTOM_TOLERANCE_PX, FOLLOW_DISABLE_AFTER, LOG_BUFFER_CAPACITY,
};
use crate::follow::{AutoFollow, ScrollPosition};
use crate::log_buffer::{LogBuffer, LogLine};
use crate::messages::Messages;
use crate::socket::{Connector, Endpoint, ReadyState, SocketEvent, SocketHandle};
use crate::stream_state::StreamState;

/// Services a log session talks to.
#[derive(Clone)]
pub struct LogStreamDeps {
    /// Opens stream sockets.
    pub connector: Arc<dyn Connector>,
    /// Checks the login after a transport error.
    pub auth: Arc<dyn AuthProbe>,
    /// Signed-in user, invalidated when the login has expired.
    pub user: UserSession,
    /// User-visible strings.
    pub messages: Arc<Messages>,
}

impl std::fmt::Debug for LogStreamDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStreamDeps")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Tunables for a log view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogStreamOptions {
    /// Maximum buffered lines.
    pub capacity: usize,
    /// Away-from-bottom scroll events tolerated before auto-follow stops.
    pub follow_disable_after: u32,
    /// Distance from the bottom that still counts as "at bottom".
    pub follow_tolerance_px: f64,
}

impl Default for LogStreamOptions {
    fn default() -> Self {
        Self {
            capacity: LOG_BUFFER_CAPACITY,
            follow_disable_after: FOLLOW_DISABLE_AFTER,
            follow_tolerance_px: FOLLOW_BOTTOM_TOLERANCE_PX,
        }
    }
}

fn endpoint_for(kind: LogKind) -> Endpoint {
    match kind {
        LogKind::RunLog => Endpoint::RunLog,
        LogKind::AuditLog => Endpoint::AuditLog,
    }
}

/// One log view attached to the run log or the audit log.
#[derive(Debug)]
pub struct LogStreamSession {
    kind: LogKind,
    level: Option<LogLevel>,
    state: StreamState,
    socket: Option<SocketHandle>,
    buffer: LogBuffer,
    follow: AutoFollow,
    deps: LogStreamDeps,
}

impl LogStreamSession {
    /// Start a session on `kind` with default options.
    pub fn open(kind: LogKind, deps: LogStreamDeps) -> Self {
        Self::open_with(kind, deps, LogStreamOptions::default())
    }

    /// Start a session on `kind`.
    pub fn open_with(kind: LogKind, deps: LogStreamDeps, options: LogStreamOptions) -> Self {
        let mut session = Self {
            kind,
            level: None,
            state: StreamState::Connecting,
            socket: None,
            buffer: LogBuffer::new(options.capacity),
            follow: AutoFollow::new(options.follow_disable_after, options.follow_tolerance_px),
            deps,
        };
        session.connect();
        session
    }

    fn connect(&mut self) {
        self.buffer.push_text(&self.deps.messages.log_connecting, None);
        let socket = self.deps.connector.open(endpoint_for(self.kind));
        log::info!("[LogStream] Opening {} (socket {})", self.kind, socket.id());
        self.socket = Some(socket);
        self.state = StreamState::Connecting;
    }

    /// Stream currently shown.
    pub fn kind(&self) -> LogKind {
        self.kind
    }

    /// Level last selected in this view, if any.
    pub fn level(&self) -> Option<LogLevel> {
        self.level
    }

    /// Lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether output is paused.
    pub fn is_paused(&self) -> bool {
        self.state == StreamState::Paused
    }

    /// Ready state of the current socket.
    pub fn ready_state(&self) -> ReadyState {
        self.socket
            .as_ref()
            .map_or(ReadyState::Closed, SocketHandle::ready_state)
    }

    /// Buffered lines.
    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    /// Whether new lines should scroll into view.
    pub fn is_following(&self) -> bool {
        self.follow.is_following()
    }

    /// Switch to another stream. The buffer is kept; the old socket is closed.
    pub fn select_kind(&mut self, kind: LogKind) {
        if kind == self.kind {
            return;
        }
        if let Some(old) = self.socket.take() {
            old.close();
        }
        log::debug!("[LogStream] Switching {} -> {}", self.kind, kind);
        self.kind = kind;
        self.connect();
    }

    /// Change the server log level (run log only).
    ///
    /// The visible level changes immediately. One control frame is sent if
    /// the socket is open; there is no acknowledgement. Returns whether the
    /// frame was sent.
    pub fn set_level(&mut self, level: LogLevel) -> bool {
        if !self.kind.has_level() {
            log::debug!("[LogStream] Ignoring level change on {}", self.kind);
            return false;
        }
        self.level = Some(level);
        self.send(LogControl::SetLevel(level))
    }

    /// Ask the server to stop sending lines.
    pub fn pause(&mut self) {
        self.send(LogControl::Pause);
        self.state = self.state.on_pause();
    }

    /// Ask the server to resume sending lines.
    pub fn resume(&mut self) {
        self.send(LogControl::Resume);
        self.state = self.state.on_resume();
    }

    /// Empty the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Copy the buffer as plain text. Failures are logged, not returned.
    pub fn copy_to_clipboard(&self, primary: &mut dyn Clipboard, fallback: &mut dyn Clipboard) -> bool {
        clipboard::copy_with_fallback(&self.buffer.plain_text(), primary, fallback)
    }

    /// Feed a scroll event; returns whether the view follows new lines.
    pub fn on_scroll(&mut self, position: ScrollPosition) -> bool {
        self.follow.on_scroll(position)
    }

    fn send(&self, control: LogControl) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|socket| socket.send_binary(control.encode()))
    }

    /// Wait for the next socket event and handle it.
    ///
    /// Returns `false` once the session has no socket left to wait on.
    pub async fn step(&mut self) -> bool {
        let event = self.next_event().await;
        self.dispatch(event).await
    }

    /// Wait for the next socket event without handling it.
    ///
    /// Cancel safe. Returns `None` when there is no socket or it went away;
    /// either way pass the result to [`Self::dispatch`].
    pub async fn next_event(&mut self) -> Option<SocketEvent> {
        self.socket.as_mut()?.next_event().await
    }

    /// Handle what [`Self::next_event`] returned. Returns `false` once the
    /// session has no socket left.
    pub async fn dispatch(&mut self, event: Option<SocketEvent>) -> bool {
        match event {
            Some(event) => {
                self.handle_event(event).await;
                self.socket.is_some()
            }
            None => {
                if self.socket.take().is_some() {
                    self.state = StreamState::Closed;
                }
                false
            }
        }
    }

    /// Apply one socket event.
    pub async fn handle_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Open => {
                self.state = self.state.on_open();
                self.buffer.push_text(&self.deps.messages.log_connected, None);
                if self.state == StreamState::Paused {
                    self.send(LogControl::Pause);
                }
            }
            SocketEvent::Message(inbound) => match inbound.into_binary().await {
                Some(bytes) => self.on_frame(&bytes),
                None => {
                    self.buffer.push_text(&self.deps.messages.invalid_data, Some(LineColor::Red));
                    self.close();
                }
            },
            SocketEvent::Error(e) => {
                log::warn!("[LogStream] {} socket error: {}", self.kind, e);
                self.state = self.state.on_error();
                self.buffer
                    .push_text(&self.deps.messages.log_unexpected_close, Some(LineColor::Red));
                auth::on_transport_error(self.deps.auth.as_ref(), &self.deps.user).await;
            }
            SocketEvent::Close { code, reason } => {
                log::info!("[LogStream] {} closed ({} {})", self.kind, code, reason);
                self.state = StreamState::Closed;
                self.socket = None;
                self.buffer.push_text(&self.deps.messages.log_disconnected, None);
                if ABNORMAL_CLOSE_CODES.contains(&code) {
                    let text = self.deps.messages.translate(&reason).to_string();
                    self.buffer.push(LogLine::colored(text, LineColor::Red));
                }
            }
        }
    }

    fn on_frame(&mut self, bytes: &[u8]) {
        match codec::decode_log(bytes, self.kind) {
            Ok(Some(chunk)) => {
                self.buffer.push_text(&chunk.text, chunk.color());
            }
            Ok(None) => {}
            Err(FrameError::Malformed { len } | FrameError::Truncated { len, .. }) => {
                log::debug!("[LogStream] Dropping malformed frame ({} bytes)", len);
            }
        }
    }

    /// Close the socket. The close event still arrives through [`Self::step`].
    pub fn close(&mut self) {
        if let Some(socket) = &self.socket {
            socket.close();
        }
        self.state = self.state.on_close_requested();
    }
}

impl Drop for LogStreamSession {
    fn drop(&mut self) {
        if let Some(socket) = &self.socket {
            socket.close();
        }
    }
}
