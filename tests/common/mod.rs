//! Shared fakes for the integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use smartdns_console::auth::{AuthProbe, LoginStatus, UserSession};
use smartdns_console::listeners::EventHub;
use smartdns_console::log_stream::LogStreamDeps;
use smartdns_console::messages::Messages;
use smartdns_console::session_store::SessionStore;
use smartdns_console::socket::{Connector, Endpoint, Outbound, SocketHandle, SocketPeer};
use smartdns_console::terminal::{TerminalDeps, TerminalSurface, ViewportLayout};
use tokio::sync::mpsc;

/// Connector that hands every opened socket's peer to the test.
pub struct MockConnector {
    peers: mpsc::UnboundedSender<SocketPeer>,
    opened: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SocketPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers: tx,
            opened: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn open(&self, endpoint: Endpoint) -> SocketHandle {
        let (handle, peer) = SocketHandle::pair(endpoint);
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.peers.send(peer).unwrap();
        handle
    }
}

/// Auth probe with a fixed answer that counts calls.
pub struct MockAuth {
    status: LoginStatus,
    delay: Option<Duration>,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl MockAuth {
    pub fn new(status: LoginStatus) -> Arc<Self> {
        Self::with_delay(status, None)
    }

    /// Probe that takes `delay` to answer, like a slow server.
    pub fn with_delay(status: LoginStatus, delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            status,
            delay,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Checks that ran to the end.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProbe for MockAuth {
    async fn check_login(&self) -> LoginStatus {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.status.clone()
    }
}

/// Calls recorded by [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Write(String),
    Clear,
    Reset,
    Focus,
    Resize(u16, u16),
    Scroll(i32),
    Layout(ViewportLayout),
    SelectAll,
}

/// Surface that records every call; inspect it through the shared log.
pub struct RecordingSurface {
    log: Arc<Mutex<Vec<SurfaceCall>>>,
    size: (u16, u16),
    layout: ViewportLayout,
}

impl RecordingSurface {
    pub fn new(cols: u16, rows: u16) -> (Box<Self>, Arc<Mutex<Vec<SurfaceCall>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let surface = Box::new(Self {
            log: Arc::clone(&log),
            size: (cols, rows),
            layout: ViewportLayout::Full,
        });
        (surface, log)
    }

    fn record(&self, call: SurfaceCall) {
        self.log.lock().unwrap().push(call);
    }
}

impl TerminalSurface for RecordingSurface {
    fn write(&mut self, data: &[u8]) {
        self.record(SurfaceCall::Write(String::from_utf8_lossy(data).into_owned()));
    }

    fn clear(&mut self) {
        self.record(SurfaceCall::Clear);
    }

    fn reset(&mut self) {
        self.record(SurfaceCall::Reset);
    }

    fn focus(&mut self) {
        self.record(SurfaceCall::Focus);
    }

    fn fit(&mut self) -> (u16, u16) {
        match self.layout {
            ViewportLayout::Full => self.size,
            ViewportLayout::KeyboardInset { .. } => (self.size.0, self.size.1 / 2),
        }
    }

    fn size(&self) -> (u16, u16) {
        self.size
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.size = (cols, rows);
        self.record(SurfaceCall::Resize(cols, rows));
    }

    fn scroll_lines(&mut self, lines: i32) {
        self.record(SurfaceCall::Scroll(lines));
    }

    fn serialize(&mut self) -> Option<String> {
        let text: String = self
            .log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                SurfaceCall::Write(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        (!text.is_empty()).then_some(text)
    }

    fn select_all(&mut self) -> String {
        self.record(SurfaceCall::SelectAll);
        "selected".to_string()
    }

    fn apply_layout(&mut self, layout: ViewportLayout) {
        self.layout = layout;
        self.record(SurfaceCall::Layout(layout));
    }
}

/// Text written to a recording surface, concatenated.
pub fn written(log: &Arc<Mutex<Vec<SurfaceCall>>>) -> String {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|call| match call {
            SurfaceCall::Write(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Everything the session has sent so far.
pub fn sent(peer: &mut SocketPeer) -> Vec<Outbound> {
    peer.drain_outbound()
}

/// Services wired to fakes.
pub struct Harness {
    pub connector: Arc<MockConnector>,
    pub peers: mpsc::UnboundedReceiver<SocketPeer>,
    pub auth: Arc<MockAuth>,
    pub user: UserSession,
    pub store: SessionStore,
    pub hub: EventHub,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_auth(LoginStatus::Valid)
    }

    pub fn with_auth(status: LoginStatus) -> Self {
        Self::with_probe(MockAuth::new(status))
    }

    /// Harness whose login check takes `delay`.
    pub fn with_slow_auth(status: LoginStatus, delay: Duration) -> Self {
        Self::with_probe(MockAuth::with_delay(status, Some(delay)))
    }

    fn with_probe(auth: Arc<MockAuth>) -> Self {
        let (connector, peers) = MockConnector::new();
        Self {
            connector,
            peers,
            auth,
            user: UserSession::signed_in("admin"),
            store: SessionStore::new(),
            hub: EventHub::new(),
        }
    }

    pub fn terminal_deps(&self) -> TerminalDeps {
        TerminalDeps {
            connector: Arc::clone(&self.connector) as Arc<dyn Connector>,
            auth: Arc::clone(&self.auth) as Arc<dyn AuthProbe>,
            user: self.user.clone(),
            store: self.store.clone(),
            hub: self.hub.clone(),
            messages: Arc::new(Messages::default()),
        }
    }

    pub fn log_deps(&self) -> LogStreamDeps {
        LogStreamDeps {
            connector: Arc::clone(&self.connector) as Arc<dyn Connector>,
            auth: Arc::clone(&self.auth) as Arc<dyn AuthProbe>,
            user: self.user.clone(),
            messages: Arc::new(Messages::default()),
        }
    }

    /// The peer of the next socket the session opened.
    pub fn next_peer(&mut self) -> SocketPeer {
        self.peers.try_recv().expect("a socket was opened")
    }
}
