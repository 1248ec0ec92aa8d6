//! Interactive terminal session.
//!
//! A [`TerminalSession`] binds a [`TerminalSurface`] to the `/api/tool/term`
//! socket. Unlike the log views, the terminal survives its view going away:
//! on unmount the socket is paused and parked in the [`SessionStore`]
//! together with a serialized scrollback, and the next mount resumes it.
//!
//! ```text
//!            mount()
//!   store ───take()──> live?  ──yes──> resume [4], repaint, replay scrollback
//!                        │
//!                        └─no──> close, "Resume session failed..." ──> fresh socket
//!
//!            unmount() / drop
//!   socket ──dead?──> close + clear store
//!      │
//!      └──live──> pause [3] (if open), serialize, park(socket, scrollback)
//! ```
//!
//! The owner drives the session with [`TerminalSession::step`], which waits
//! on the socket, the UI listener and the signed-in user at once. Owners
//! that also wait on other sources select on [`TerminalSession::wait`] and
//! finish each wake with [`TerminalSession::dispatch`].

pub mod gesture;
pub mod input;
pub mod surface;

use std::sync::Arc;

use tokio::sync::watch;

pub use gesture::{TouchGesture, TouchOutcome, ViewportLayout};
pub use input::{ctrl_char, InputDecoder, Modifiers, OutgoingInput, ToolbarAction};
pub use surface::{TerminalSurface, Vt100Surface};

use crate::auth::{self, AuthProbe, User, UserSession};
use crate::codec::{self, LineColor, TerminalControl, TerminalFrame};
use crate::constants::{
    ABNORMAL_CLOSE_CODES, KEYBOARD_HEIGHT_THRESHOLD_PX, RESUME_REPAINT_EXTRA_ROWS,
    TOUCH_SCROLL_PX_PER_LINE,
};
use crate::listeners::{EventHub, Listener, ListenerKind, UiEvent};
use crate::messages::Messages;
use crate::session_store::{ParkedSession, SessionKind, SessionStore};
use crate::socket::{Connector, Endpoint, ReadyState, SocketEvent, SocketHandle};
use crate::stream_state::StreamState;

/// Listener kinds a mounted terminal registers for.
const TERMINAL_LISTENERS: [ListenerKind; 6] = [
    ListenerKind::WindowResize,
    ListenerKind::Viewport,
    ListenerKind::Touch,
    ListenerKind::Keyboard,
    ListenerKind::Toolbar,
    ListenerKind::Unload,
];

/// Why a terminal could not be mounted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MountError {
    /// Nobody is signed in; any parked socket has been closed.
    #[error("no user signed in")]
    SignedOut,
}

/// Services a terminal session talks to.
#[derive(Clone)]
pub struct TerminalDeps {
    /// Opens stream sockets.
    pub connector: Arc<dyn Connector>,
    /// Checks the login after a transport error.
    pub auth: Arc<dyn AuthProbe>,
    /// Signed-in user.
    pub user: UserSession,
    /// Where the socket is parked between mounts.
    pub store: SessionStore,
    /// UI events.
    pub hub: EventHub,
    /// User-visible strings.
    pub messages: Arc<Messages>,
}

impl std::fmt::Debug for TerminalDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalDeps")
            .field("user", &self.user)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Tunables for the terminal view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalOptions {
    /// Viewport shrink that counts as an on-screen keyboard.
    pub keyboard_threshold_px: f64,
    /// Drag distance per scrolled line.
    pub touch_px_per_line: f64,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            keyboard_threshold_px: KEYBOARD_HEIGHT_THRESHOLD_PX,
            touch_px_per_line: TOUCH_SCROLL_PX_PER_LINE,
        }
    }
}

/// What woke a waiting terminal. Hand it to [`TerminalSession::dispatch`].
#[derive(Debug)]
pub struct Wake(Source);

#[derive(Debug)]
enum Source {
    Detached,
    Socket(Option<SocketEvent>),
    Ui(Option<UiEvent>),
    User,
}

/// A mounted terminal view.
pub struct TerminalSession {
    surface: Box<dyn TerminalSurface>,
    socket: Option<SocketHandle>,
    state: StreamState,
    resumed: bool,
    modifiers: Modifiers,
    gesture: TouchGesture,
    options: TerminalOptions,
    selection: Option<String>,
    listener: Listener,
    user_rx: watch::Receiver<Option<User>>,
    deps: TerminalDeps,
}

impl std::fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSession")
            .field("socket", &self.socket)
            .field("state", &self.state)
            .field("resumed", &self.resumed)
            .field("modifiers", &self.modifiers)
            .finish_non_exhaustive()
    }
}

impl TerminalSession {
    /// Mount with default options.
    pub fn mount(surface: Box<dyn TerminalSurface>, deps: TerminalDeps) -> Result<Self, MountError> {
        Self::mount_with(surface, deps, TerminalOptions::default())
    }

    /// Mount the terminal, resuming a parked session when there is one.
    pub fn mount_with(
        surface: Box<dyn TerminalSurface>,
        deps: TerminalDeps,
        options: TerminalOptions,
    ) -> Result<Self, MountError> {
        if !deps.user.is_signed_in() {
            log::info!("[Terminal] Mount refused: no user signed in");
            deps.store.clear(SessionKind::Terminal);
            return Err(MountError::SignedOut);
        }

        let mut session = Self {
            surface,
            socket: None,
            state: StreamState::Connecting,
            resumed: false,
            modifiers: Modifiers::default(),
            gesture: TouchGesture::new(options.touch_px_per_line),
            options,
            selection: None,
            listener: deps.hub.subscribe(&TERMINAL_LISTENERS),
            user_rx: deps.user.subscribe(),
            deps,
        };

        match session.deps.store.take(SessionKind::Terminal) {
            Some(parked) if parked.socket.is_live() => session.resume(parked),
            Some(parked) => {
                log::info!("[Terminal] Parked socket {} is dead", parked.socket.id());
                parked.socket.close();
                let text = session.deps.messages.term_resume_failed.clone();
                session.surface.write(text.as_bytes());
            }
            None => {}
        }

        if session.socket.is_none() {
            session.connect();
        }
        Ok(session)
    }

    fn connect(&mut self) {
        let text = self.deps.messages.term_connecting.clone();
        self.surface.write(text.as_bytes());
        let socket = self.deps.connector.open(Endpoint::Terminal);
        log::info!("[Terminal] Opening socket {}", socket.id());
        self.socket = Some(socket);
        self.state = StreamState::Connecting;
    }

    fn resume(&mut self, parked: ParkedSession) {
        let ParkedSession { socket, scrollback } = parked;
        log::info!("[Terminal] Resuming socket {}", socket.id());
        self.state = match socket.ready_state() {
            ReadyState::Open => StreamState::Open,
            _ => StreamState::Connecting,
        };
        self.socket = Some(socket);
        self.resumed = true;

        self.send_control(TerminalControl::Resume);

        // An oversized resize followed by the real one makes the remote shell repaint.
        let (cols, rows) = self.surface.size();
        self.send_control(TerminalControl::Resize {
            cols,
            rows: rows.saturating_add(RESUME_REPAINT_EXTRA_ROWS),
        });
        self.refresh_size();

        if let Some(scrollback) = scrollback {
            self.surface.write(scrollback.as_bytes());
        }
    }

    /// Lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Ready state of the socket, `Closed` once it is gone.
    pub fn ready_state(&self) -> ReadyState {
        self.socket
            .as_ref()
            .map_or(ReadyState::Closed, SocketHandle::ready_state)
    }

    /// Whether this mount resumed a parked socket.
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Armed one-shot modifiers.
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Text captured by the last select-all.
    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    /// The surface.
    pub fn surface(&self) -> &dyn TerminalSurface {
        self.surface.as_ref()
    }

    fn send_control(&self, control: TerminalControl) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|socket| socket.send_binary(control.encode()))
    }

    fn send_text(&self, text: &str) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|socket| socket.send_text(text))
    }

    /// Forward typed input, applying any armed modifiers.
    ///
    /// Input is dropped (and modifiers stay armed) while the socket is not open.
    pub fn send_input(&mut self, data: &str) -> bool {
        if self.ready_state() != ReadyState::Open {
            return false;
        }
        let out = self.modifiers.apply(data);
        if let Some(prefix) = out.prefix {
            self.send_text(prefix);
        }
        self.send_text(&out.data)
    }

    /// Tell the server the window size.
    pub fn resize(&mut self, cols: u16, rows: u16) -> bool {
        self.send_control(TerminalControl::Resize { cols, rows })
    }

    /// Fit the surface and send the resulting size.
    pub fn refresh_size(&mut self) -> bool {
        let (cols, rows) = self.surface.fit();
        self.resize(cols, rows)
    }

    /// Handle a toolbar button.
    pub fn toolbar(&mut self, action: ToolbarAction) {
        match action {
            ToolbarAction::SelectAll => {
                self.selection = Some(self.surface.select_all());
            }
            ToolbarAction::Ctrl => {
                self.modifiers.toggle_ctrl();
            }
            ToolbarAction::Alt => {
                self.modifiers.toggle_alt();
            }
            ToolbarAction::Tab => {
                self.send_text(input::TAB);
            }
            ToolbarAction::Esc => {
                self.send_text(input::ESC);
            }
        }
        self.surface.focus();
    }

    /// Re-layout for the given viewport heights and resend the size.
    pub fn on_viewport_change(&mut self, window_height: f64, visual_height: f64) {
        let layout =
            ViewportLayout::from_heights(window_height, visual_height, self.options.keyboard_threshold_px);
        self.surface.apply_layout(layout);
        self.refresh_size();
    }

    /// Apply one UI event.
    pub fn handle_ui(&mut self, event: UiEvent) {
        match event {
            UiEvent::WindowResize => {
                self.refresh_size();
            }
            UiEvent::ViewportResize {
                window_height,
                visual_height,
            } => self.on_viewport_change(window_height, visual_height),
            UiEvent::TouchStart { y } => self.gesture.start(y),
            UiEvent::TouchMove { y } => {
                if let TouchOutcome::Scroll(lines) = self.gesture.moved(y) {
                    self.surface.scroll_lines(lines);
                }
            }
            UiEvent::TouchEnd => {
                if self.gesture.end() == TouchOutcome::Tap {
                    self.surface.focus();
                }
            }
            UiEvent::Input(data) => {
                self.send_input(&data);
            }
            UiEvent::Toolbar(action) => self.toolbar(action),
            UiEvent::BeforeUnload => self.close(),
        }
    }

    /// Apply UI events that have been published but not yet handled.
    pub fn handle_pending_ui(&mut self) {
        while let Some(event) = self.listener.try_recv() {
            self.handle_ui(event);
        }
    }

    /// Apply one socket event.
    pub async fn handle_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Open => {
                self.state = self.state.on_open();
                self.surface.clear();
                self.surface.reset();
                self.surface.focus();
                self.refresh_size();
            }
            SocketEvent::Message(inbound) => match inbound.into_binary().await {
                Some(bytes) => self.on_frame(&bytes),
                None => {
                    let text = self.deps.messages.invalid_data.clone();
                    self.surface.write(text.as_bytes());
                    self.close();
                }
            },
            SocketEvent::Error(e) => {
                log::warn!("[Terminal] Socket error: {}", e);
                self.state = self.state.on_error();
                auth::on_transport_error(self.deps.auth.as_ref(), &self.deps.user).await;
            }
            SocketEvent::Close { code, reason } => {
                log::info!("[Terminal] Socket closed ({} {})", code, reason);
                self.state = StreamState::Closed;
                self.socket = None;
                let text = self.deps.messages.term_closed.clone();
                self.surface.write(text.as_bytes());
                if ABNORMAL_CLOSE_CODES.contains(&code) {
                    let reason = self.deps.messages.translate(&reason).to_string();
                    let line = format!("\x1b[{}m{}\x1b[0m\r\n", LineColor::Red.ansi_code(), reason);
                    self.surface.write(line.as_bytes());
                }
            }
        }
    }

    fn on_frame(&mut self, bytes: &[u8]) {
        match codec::decode_terminal(bytes) {
            Ok(TerminalFrame::Stdout(data) | TerminalFrame::Stderr(data)) => self.surface.write(&data),
            Ok(TerminalFrame::Resize { cols, rows }) => self.surface.resize(cols, rows),
            Ok(TerminalFrame::Unknown(kind)) => {
                log::trace!("[Terminal] Ignoring frame type {}", kind);
            }
            Err(e) => log::debug!("[Terminal] Dropping frame: {}", e),
        }
    }

    /// Wait for the next socket, UI or user event and handle it.
    ///
    /// Returns `false` once the socket is gone. Handling a socket error runs
    /// a login check, so callers racing other futures use [`Self::wait`] and
    /// [`Self::dispatch`] instead.
    pub async fn step(&mut self) -> bool {
        let wake = self.wait().await;
        self.dispatch(wake).await
    }

    /// Wait for the next socket, UI or user event without handling it.
    ///
    /// Cancel safe: dropping the future loses no event.
    pub async fn wait(&mut self) -> Wake {
        let Some(socket) = self.socket.as_mut() else {
            return Wake(Source::Detached);
        };
        let source = tokio::select! {
            event = socket.next_event() => Source::Socket(event),
            event = self.listener.recv() => Source::Ui(event),
            changed = self.user_rx.changed() => {
                if changed.is_err() {
                    log::debug!("[Terminal] User session dropped");
                }
                Source::User
            }
        };
        Wake(source)
    }

    /// Handle what [`Self::wait`] returned. Returns `false` once the socket is gone.
    pub async fn dispatch(&mut self, wake: Wake) -> bool {
        match wake.0 {
            Source::Detached => {}
            Source::Socket(Some(event)) => self.handle_event(event).await,
            Source::Socket(None) => {
                self.socket = None;
                self.state = StreamState::Closed;
            }
            Source::Ui(Some(event)) => self.handle_ui(event),
            Source::Ui(None) => {}
            Source::User => {
                if self.user_rx.borrow_and_update().is_none() {
                    self.on_signed_out();
                }
            }
        }
        self.socket.is_some()
    }

    fn on_signed_out(&mut self) {
        log::info!("[Terminal] User signed out, closing session");
        self.close();
        self.deps.store.clear(SessionKind::Terminal);
        let text = format!("{}\r\n", self.deps.messages.refresh_page);
        self.surface.write(text.as_bytes());
    }

    /// Close the socket. The close event still arrives through [`Self::step`].
    pub fn close(&mut self) {
        if let Some(socket) = &self.socket {
            socket.close();
        }
        self.state = self.state.on_close_requested();
    }

    /// Unmount the view, parking a live socket for the next mount.
    pub fn unmount(self) {
        drop(self);
    }

    fn park(&mut self) {
        let Some(socket) = self.socket.take() else {
            return;
        };
        if !socket.is_live() || !self.deps.user.is_signed_in() {
            log::debug!("[Terminal] Discarding socket {} on unmount", socket.id());
            socket.close();
            self.deps.store.clear(SessionKind::Terminal);
            return;
        }
        if socket.ready_state() == ReadyState::Open {
            socket.send_binary(TerminalControl::Pause.encode());
        }
        let scrollback = self.surface.serialize();
        self.deps.store.park(SessionKind::Terminal, socket, scrollback);
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        self.park();
    }
}
